//! Interfaces of the services this crate consumes but does not own.

use async_trait::async_trait;

use crate::connection::Connection;
use crate::context::RequestContext;
use crate::error::Result;
use crate::row::JobRun;

/// Connection record lookup. Missing ids are `NotFound`.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn get_connection(&self, ctx: &RequestContext, connection_id: &str) -> Result<Connection>;
}

/// Account membership check. Non-members are `Unauthorized`.
#[async_trait]
pub trait AccountAuthorizer: Send + Sync {
    async fn verify_user_in_account(&self, ctx: &RequestContext, account_id: &str) -> Result<()>;
}

/// Recent runs of a job. Order is not guaranteed; newest-last is typical.
#[async_trait]
pub trait JobRunHistory: Send + Sync {
    async fn recent_runs(&self, ctx: &RequestContext, job_id: &str) -> Result<Vec<JobRun>>;
}
