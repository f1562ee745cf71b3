//! Service configuration from environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use tapline_connectors::s3::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Bound on opening a SQL connection.
    pub connect_timeout: Duration,
    /// Keys requested per object listing page.
    pub object_page_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            object_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let connect_timeout_secs: u64 = std::env::var("TAPLINE_CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("Invalid TAPLINE_CONNECT_TIMEOUT_SECS")?;
        let object_page_size: usize = std::env::var("TAPLINE_OBJECT_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .context("Invalid TAPLINE_OBJECT_PAGE_SIZE")?;
        anyhow::ensure!(
            connect_timeout_secs > 0,
            "TAPLINE_CONNECT_TIMEOUT_SECS must be positive"
        );
        anyhow::ensure!(
            object_page_size > 0,
            "TAPLINE_OBJECT_PAGE_SIZE must be positive"
        );
        Ok(Self {
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            object_page_size,
        })
    }
}
