//! Object-store backed sources: job-run artifacts written as gzip JSON lines.
//!
//! Layout (shared with the writers, must not change):
//!
//! ```text
//! workflows/<run_id>/activities/<schema>.<table>/data/<object>.gz
//! ```

pub mod adapter;
pub mod client;
pub mod runs;
pub mod store;

pub use adapter::ObjectStoreAdapter;
pub use client::{ListObjectsPage, ListObjectsRequest, ObjectClient, ObjectReader, ObjectStoreClient};
pub use runs::{find_latest_run_with_data, newest_first};
pub use store::build_store;

use tapline_core::schema::qualified_table;

/// Default number of keys requested per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// `workflows/<run_id>/activities/`
pub fn activities_prefix(run_id: &str) -> String {
    format!("workflows/{}/activities/", run_id)
}

/// `workflows/<run_id>/activities/<schema>.<table>/data`
pub fn table_data_prefix(run_id: &str, schema: &str, table: &str) -> String {
    format!(
        "{}{}/data",
        activities_prefix(run_id),
        qualified_table(schema, table)
    )
}
