//! Structural metadata: columns and table constraints.
//!
//! Tables are keyed by their qualified `schema.table` name throughout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaplineError};

/// Join a schema and table into the `schema.table` key used in constraint maps
/// and object-store folder names. An empty schema yields the bare table.
pub fn qualified_table(schema: &str, table: &str) -> String {
    if schema.is_empty() {
        table.to_string()
    } else {
        format!("{}.{}", schema, table)
    }
}

/// Split a `schema.table` key on its first dot.
pub fn split_qualified_table(name: &str) -> Option<(&str, &str)> {
    match name.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => Some((schema, table)),
        _ => None,
    }
}

/// One physical column as reported by a backend catalog (or inferred from
/// sample data for object storage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub schema: String,
    pub table: String,
    pub column: String,
    /// Backend type name; empty when the backend has no catalog.
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    /// Generated-column kind (e.g. "STORED", "VIRTUAL", "IDENTITY ALWAYS").
    pub generated_type: Option<String>,
}

impl Column {
    pub fn qualified_table(&self) -> String {
        qualified_table(&self.schema, &self.table)
    }
}

/// True when `(schema, table)` appears in the introspected column set.
pub fn contains_table(columns: &[Column], schema: &str, table: &str) -> bool {
    columns
        .iter()
        .any(|c| c.schema == schema && c.table == table)
}

/// Distinct schema names of an introspected column set, sorted.
pub fn distinct_schemas(columns: &[Column]) -> Vec<String> {
    let mut schemas: Vec<String> = columns.iter().map(|c| c.schema.clone()).collect();
    schemas.sort();
    schemas.dedup();
    schemas
}

/// Distinct `(schema, table)` pairs of an introspected column set, sorted.
pub fn distinct_tables(columns: &[Column]) -> Vec<(String, String)> {
    let mut tables: Vec<(String, String)> = columns
        .iter()
        .map(|c| (c.schema.clone(), c.table.clone()))
        .collect();
    tables.sort();
    tables.dedup();
    tables
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced `schema.table`.
    pub table: String,
    pub columns: Vec<String>,
}

/// A (possibly multi-column) foreign key.
///
/// `columns`, `not_nullable` and `foreign_key.columns` are positionally
/// aligned and always the same length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    pub name: String,
    /// Owning `schema.table`.
    pub table: String,
    pub columns: Vec<String>,
    pub not_nullable: Vec<bool>,
    pub foreign_key: ForeignKey,
}

/// Per-column projection of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyColumn {
    pub column: String,
    pub nullable: bool,
    pub foreign_table: String,
    pub foreign_column: String,
}

impl ForeignKeyConstraint {
    /// Build a constraint, rejecting misaligned column metadata.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
        not_nullable: Vec<bool>,
        foreign_table: impl Into<String>,
        foreign_columns: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        let table = table.into();
        if columns.is_empty()
            || columns.len() != not_nullable.len()
            || columns.len() != foreign_columns.len()
        {
            return Err(TaplineError::Query(format!(
                "foreign key '{}' on '{}' has misaligned columns ({} columns, {} not-null flags, {} referenced columns)",
                name,
                table,
                columns.len(),
                not_nullable.len(),
                foreign_columns.len()
            )));
        }
        Ok(Self {
            name,
            table,
            columns,
            not_nullable,
            foreign_key: ForeignKey {
                table: foreign_table.into(),
                columns: foreign_columns,
            },
        })
    }

    /// One entry per owning column, in constraint order.
    pub fn column_pairs(&self) -> impl Iterator<Item = ForeignKeyColumn> + '_ {
        self.columns
            .iter()
            .zip(self.not_nullable.iter())
            .zip(self.foreign_key.columns.iter())
            .map(|((column, not_null), foreign_column)| ForeignKeyColumn {
                column: column.clone(),
                nullable: !not_null,
                foreign_table: self.foreign_key.table.clone(),
                foreign_column: foreign_column.clone(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyConstraint {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

pub type ForeignKeyMap = HashMap<String, Vec<ForeignKeyConstraint>>;
pub type PrimaryKeyMap = HashMap<String, PrimaryKeyConstraint>;
pub type UniqueConstraintMap = HashMap<String, Vec<UniqueConstraint>>;

/// Foreign, primary and unique constraints of a schema set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConstraints {
    pub foreign_keys: ForeignKeyMap,
    pub primary_keys: PrimaryKeyMap,
    pub unique_constraints: UniqueConstraintMap,
}

/// Compatibility shim: concatenate every unique constraint of a table into a
/// single column list. This loses which columns belong to which constraint;
/// prefer the grouped map.
pub fn flatten_unique_constraints(map: &UniqueConstraintMap) -> HashMap<String, Vec<String>> {
    map.iter()
        .map(|(table, constraints)| {
            let columns = constraints
                .iter()
                .flat_map(|uc| uc.columns.iter().cloned())
                .collect();
            (table.clone(), columns)
        })
        .collect()
}
