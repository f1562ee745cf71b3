//! Explicit per-request context.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, TaplineError};

/// Identity and cancellation state carried through every call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub user_id: String,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::with_token(user_id, CancellationToken::new())
    }

    pub fn with_token(user_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            user_id: user_id.into(),
            cancel,
        }
    }

    /// Token the caller cancels to stop a long-running stream.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `Cancelled` once the token has fired.
    pub fn check_cancelled(&self, during: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TaplineError::Cancelled(format!(
                "request {} cancelled during {}",
                self.request_id, during
            )));
        }
        Ok(())
    }
}
