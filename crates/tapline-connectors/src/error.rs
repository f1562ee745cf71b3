//! Mapping of driver errors onto the shared error taxonomy.

use tapline_core::TaplineError;

/// Classify a sqlx error raised while performing `op`.
pub fn sql_error(op: &str, e: sqlx::Error) -> TaplineError {
    match e {
        sqlx::Error::Database(db) => TaplineError::Query(format!("{}: {}", op, db)),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => TaplineError::Connection(format!("{}: {}", op, e)),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => TaplineError::Decode(format!("{}: {}", op, e)),
        other => TaplineError::Query(format!("{}: {}", op, other)),
    }
}

/// Errors while opening a pool. A rejected login arrives as a database
/// error, so every failure here is a connection failure.
pub fn connect_error(op: &str, e: sqlx::Error) -> TaplineError {
    TaplineError::Connection(format!("{}: {}", op, e))
}

/// Classify an object_store error raised while performing `op`.
pub fn store_error(op: &str, e: object_store::Error) -> TaplineError {
    match e {
        object_store::Error::NotFound { .. } => TaplineError::NotFound(format!("{}: {}", op, e)),
        other => TaplineError::Connection(format!("{}: {}", op, other)),
    }
}

/// Errors while reading an object body (transfer, gzip or UTF-8 framing).
pub fn read_error(key: &str, e: std::io::Error) -> TaplineError {
    TaplineError::Decode(format!("reading object '{}': {}", key, e))
}
