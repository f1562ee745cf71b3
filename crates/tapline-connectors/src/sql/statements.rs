//! SQL text builders shared by the Postgres and MySQL adapters.
//!
//! Identifiers are always quoted; where clauses are appended verbatim.

use tapline_core::Column;

/// Identifier quoting style of a SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    pub fn quote_table(self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }
}

pub fn probe_select(dialect: Dialect, schema: &str, table: &str) -> String {
    format!("SELECT * FROM {} LIMIT 1", dialect.quote_table(schema, table))
}

pub fn select_columns(dialect: Dialect, schema: &str, table: &str, columns: &[String]) -> String {
    let cols = if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("SELECT {} FROM {}", cols, dialect.quote_table(schema, table))
}

/// `SELECT COUNT(*)` with the caller's where clause appended uninterpreted.
pub fn count_rows(dialect: Dialect, schema: &str, table: &str, where_clause: Option<&str>) -> String {
    let mut sql = format!("SELECT COUNT(*) FROM {}", dialect.quote_table(schema, table));
    if let Some(wc) = where_clause.map(str::trim).filter(|wc| !wc.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(wc);
    }
    sql
}

pub fn truncate_table(dialect: Dialect, schema: &str, table: &str, cascade: bool) -> String {
    let mut sql = format!("TRUNCATE TABLE {}", dialect.quote_table(schema, table));
    if cascade {
        sql.push_str(" CASCADE");
    }
    sql.push(';');
    sql
}

/// A named table constraint rendered by the catalog (`pg_get_constraintdef`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDef {
    pub name: String,
    pub definition: String,
}

/// Postgres `CREATE TABLE IF NOT EXISTS` from catalog columns and the
/// table's primary-key, unique and check constraints.
pub fn postgres_create_table(
    schema: &str,
    table: &str,
    columns: &[Column],
    constraints: &[ConstraintDef],
) -> String {
    let d = Dialect::Postgres;
    let mut lines: Vec<String> = columns.iter().map(postgres_column_def).collect();
    lines.extend(
        constraints
            .iter()
            .map(|c| format!("CONSTRAINT {} {}", d.quote_ident(&c.name), c.definition)),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);",
        d.quote_table(schema, table),
        lines.join(",\n  ")
    )
}

fn postgres_column_def(col: &Column) -> String {
    let mut def = format!(
        "{} {}",
        Dialect::Postgres.quote_ident(&col.column),
        col.data_type
    );
    match col.generated_type.as_deref() {
        Some("STORED") => {
            if let Some(expr) = &col.column_default {
                def.push_str(&format!(" GENERATED ALWAYS AS ({}) STORED", expr));
            }
        }
        Some("IDENTITY ALWAYS") => def.push_str(" GENERATED ALWAYS AS IDENTITY"),
        Some("IDENTITY BY DEFAULT") => def.push_str(" GENERATED BY DEFAULT AS IDENTITY"),
        _ => {
            if let Some(default) = &col.column_default {
                def.push_str(&format!(" DEFAULT {}", default));
            }
        }
    }
    if !col.is_nullable {
        def.push_str(" NOT NULL");
    }
    def
}

/// Comma-separated `?` placeholders for a MySQL `IN (...)` list.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
