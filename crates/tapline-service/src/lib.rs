//! Tapline service - per-request entry points for connection data
//!
//! Every entry point loads the connection, authorizes the caller against its
//! account, branches on the backend kind and delegates to the matching
//! adapter from `tapline-connectors` or `tapline-ai`.

pub mod backends;
pub mod config;
pub mod service;
pub mod types;

pub use backends::{BackendFactory, LiveBackends};
pub use config::ServiceConfig;
pub use service::ConnectionDataService;
pub use types::{
    GenerateDataRequest, InitStatementOptions, InitStatements, SchemaOptions, StreamRequest,
    UniqueConstraintsResponse,
};
