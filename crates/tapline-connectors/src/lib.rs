//! Tapline connectors - backend adapters
//!
//! This crate provides the per-backend halves of connection data access:
//! - PostgreSQL and MySQL catalog introspection, DDL synthesis and row streaming
//! - S3 run resolution, table discovery and gzip JSON-lines streaming
//!
//! Every adapter reports failures as [`tapline_core::TaplineError`].

pub mod error;
pub mod s3;
pub mod sql;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use s3::{
    build_store, find_latest_run_with_data, ListObjectsPage, ListObjectsRequest, ObjectClient,
    ObjectStoreAdapter, ObjectStoreClient,
};
pub use sql::{connect_sql, MySqlAdapter, PostgresAdapter, SqlAdapter};
