//! CLI configuration from environment variables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tapline_service::ServiceConfig;

#[derive(Debug, Clone)]
pub struct CliConfig {
    /// JSON file holding the connections and job-run history.
    pub connections_file: PathBuf,
    /// Account the local user belongs to. `None` means the file's account.
    pub account_id: Option<String>,
    pub service: ServiceConfig,
}

impl CliConfig {
    pub fn from_env() -> Result<Self> {
        let connections_file = std::env::var("TAPLINE_CONNECTIONS_FILE")
            .unwrap_or_else(|_| "./connections.json".to_string());
        let account_id = std::env::var("TAPLINE_ACCOUNT_ID")
            .ok()
            .filter(|a| !a.trim().is_empty());
        let service = ServiceConfig::from_env().context("Invalid service configuration")?;
        Ok(Self {
            connections_file: PathBuf::from(connections_file),
            account_id,
            service,
        })
    }
}
