//! Tapline core: the data model shared by the connectors, the AI synthesizer
//! and the dispatch service.

pub mod coerce;
pub mod collaborators;
pub mod connection;
pub mod context;
pub mod error;
pub mod row;
pub mod schema;
pub mod sink;

pub use collaborators::{AccountAuthorizer, ConnectionRegistry, JobRunHistory};
pub use connection::{
    AwsS3Config, BackendKind, Connection, ConnectionConfig, OpenAiConfig, SqlConnectionConfig,
    SqlConnectionFields,
};
pub use context::RequestContext;
pub use error::{Result, TaplineError};
pub use row::{JobRun, Row, RunLocator};
pub use schema::{
    Column, ForeignKey, ForeignKeyColumn, ForeignKeyConstraint, ForeignKeyMap,
    PrimaryKeyConstraint, PrimaryKeyMap, TableConstraints, UniqueConstraint, UniqueConstraintMap,
};
pub use sink::RowSink;
