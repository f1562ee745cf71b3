//! Typed errors shared by every Tapline crate.

use thiserror::Error;

/// Errors returned by connection data operations.
///
/// Every message names the operation and the identifiers involved so the
/// caller can log and surface it without extra context.
#[derive(Debug, Error)]
pub enum TaplineError {
    /// Invalid schema/table, missing selector or otherwise malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The caller does not belong to the connection's account.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Connection, run, or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Backend kind or mode not supported by this operation.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// Backend unreachable or authentication failed.
    #[error("connection failed: {0}")]
    Connection(String),
    /// A catalog or data query failed.
    #[error("query failed: {0}")]
    Query(String),
    /// Malformed payload (gzip, JSON, column value).
    #[error("decode failed: {0}")]
    Decode(String),
    /// The text-generation model call failed.
    #[error("upstream model error: {0}")]
    Upstream(String),
    /// The model truncated its answer or returned no candidates.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// The caller's sink refused a row.
    #[error("stream send failed: {0}")]
    Sink(String),
    /// The request context was cancelled.
    #[error("request cancelled: {0}")]
    Cancelled(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaplineError {
    /// Stable snake_case code for the transport layer to map onto its own
    /// status codes.
    pub fn code(&self) -> &'static str {
        match self {
            TaplineError::BadRequest(_) => "bad_request",
            TaplineError::Unauthorized(_) => "unauthorized",
            TaplineError::NotFound(_) => "not_found",
            TaplineError::NotImplemented(_) => "not_implemented",
            TaplineError::Connection(_) => "connection_error",
            TaplineError::Query(_) => "query_error",
            TaplineError::Decode(_) => "decode_error",
            TaplineError::Upstream(_) => "upstream_error",
            TaplineError::ResourceExhausted(_) => "resource_exhausted",
            TaplineError::Sink(_) => "sink_error",
            TaplineError::Cancelled(_) => "cancelled",
            TaplineError::Internal(_) => "internal",
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        TaplineError::BadRequest(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        TaplineError::NotImplemented(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        TaplineError::Decode(msg.into())
    }
}

impl From<serde_json::Error> for TaplineError {
    fn from(e: serde_json::Error) -> Self {
        TaplineError::Decode(e.to_string())
    }
}

pub type Result<T, E = TaplineError> = std::result::Result<T, E>;
