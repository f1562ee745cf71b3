//! File-backed stand-ins for the connection registry, the account
//! authorizer and the job-run registry.
//!
//! ```json
//! {
//!   "account_id": "acct-1",
//!   "connections": [{"id": "db", "account_id": "acct-1",
//!                    "config": {"kind": "postgres", "url": "postgres://..."}}],
//!   "job_runs": {"nightly": [{"run_id": "r1"}, {"run_id": "r2"}]}
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tapline_core::{
    AccountAuthorizer, Connection, ConnectionRegistry, JobRun, JobRunHistory, RequestContext,
    TaplineError,
};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    account_id: String,
    #[serde(default)]
    connections: Vec<Connection>,
    /// Job id to its runs, newest last.
    #[serde(default)]
    job_runs: HashMap<String, Vec<JobRun>>,
}

#[derive(Debug)]
pub struct FileRegistry {
    account_id: String,
    connections: HashMap<String, Connection>,
    job_runs: HashMap<String, Vec<JobRun>>,
}

impl FileRegistry {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read connections file {:?}", path))?;
        let file: RegistryFile = serde_json::from_str(&content)
            .with_context(|| format!("Invalid connections file {:?}", path))?;

        let mut connections = HashMap::new();
        for connection in file.connections {
            if connections.contains_key(&connection.id) {
                anyhow::bail!("Duplicate connection id '{}' in {:?}", connection.id, path);
            }
            connections.insert(connection.id.clone(), connection);
        }
        debug!(
            "Loaded {} connections and {} jobs from {:?}",
            connections.len(),
            file.job_runs.len(),
            path
        );
        Ok(Self {
            account_id: file.account_id,
            connections,
            job_runs: file.job_runs,
        })
    }

    /// The account the file's user belongs to.
    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

#[async_trait]
impl ConnectionRegistry for FileRegistry {
    async fn get_connection(
        &self,
        _ctx: &RequestContext,
        connection_id: &str,
    ) -> tapline_core::Result<Connection> {
        self.connections
            .get(connection_id)
            .cloned()
            .ok_or_else(|| TaplineError::NotFound(format!("connection '{}'", connection_id)))
    }
}

#[async_trait]
impl JobRunHistory for FileRegistry {
    async fn recent_runs(
        &self,
        _ctx: &RequestContext,
        job_id: &str,
    ) -> tapline_core::Result<Vec<JobRun>> {
        Ok(self.job_runs.get(job_id).cloned().unwrap_or_default())
    }
}

/// The local user belongs to exactly one account.
#[derive(Debug, Clone)]
pub struct LocalAuthorizer {
    account_id: String,
}

impl LocalAuthorizer {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
        }
    }
}

#[async_trait]
impl AccountAuthorizer for LocalAuthorizer {
    async fn verify_user_in_account(
        &self,
        ctx: &RequestContext,
        account_id: &str,
    ) -> tapline_core::Result<()> {
        if account_id == self.account_id {
            Ok(())
        } else {
            Err(TaplineError::Unauthorized(format!(
                "user '{}' is not a member of account '{}'",
                ctx.user_id, account_id
            )))
        }
    }
}
