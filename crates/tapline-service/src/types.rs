//! Request options and assembled responses of the outbound operations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tapline_core::schema::flatten_unique_constraints;
use tapline_core::{RunLocator, UniqueConstraintMap};

/// Backend-specific schema options. Object-store connections need a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOptions {
    pub run: Option<RunLocator>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitStatementOptions {
    pub init_schema: bool,
    pub truncate_before_insert: bool,
    pub truncate_cascade: bool,
}

/// DDL keyed by `schema.table`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitStatements {
    pub create_statements: HashMap<String, String>,
    pub truncate_statements: HashMap<String, String>,
}

/// Unique constraints grouped per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraintsResponse {
    pub table_constraints: UniqueConstraintMap,
}

impl UniqueConstraintsResponse {
    /// Compatibility shim: one concatenated column list per table, losing
    /// the constraint boundaries.
    pub fn flattened(&self) -> HashMap<String, Vec<String>> {
        flatten_unique_constraints(&self.table_constraints)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub connection_id: String,
    pub schema: String,
    pub table: String,
    /// Required for object-store connections, ignored otherwise.
    #[serde(default)]
    pub run: Option<RunLocator>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateDataRequest {
    pub ai_connection_id: String,
    pub data_connection_id: String,
    pub schema: String,
    pub table: String,
    pub prompt: String,
    pub count: u32,
    pub model_name: String,
}
