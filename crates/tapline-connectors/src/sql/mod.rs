//! Relational backends: catalog introspection, DDL synthesis and row streaming.

pub mod mysql;
pub mod postgres;
pub mod statements;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use tapline_core::{
    BackendKind, Column, ConnectionConfig, ForeignKeyMap, PrimaryKeyMap, RequestContext, Result,
    RowSink, SqlConnectionConfig, TableConstraints, TaplineError, UniqueConstraintMap,
};
use tracing::{debug, info};

use crate::error::{connect_error, sql_error};

pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;

/// Per-backend schema and stream contract of a relational connection.
///
/// An adapter owns one small pool for the duration of a request; callers
/// invoke [`SqlAdapter::close`] when done.
#[async_trait]
pub trait SqlAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// One entry per physical column of every accessible user table.
    async fn get_schema(&self) -> Result<Vec<Column>>;

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<Vec<Column>>;

    async fn get_foreign_keys(&self, schemas: &[String]) -> Result<ForeignKeyMap>;

    async fn get_primary_keys(&self, schemas: &[String]) -> Result<PrimaryKeyMap>;

    async fn get_unique_constraints(&self, schemas: &[String]) -> Result<UniqueConstraintMap>;

    async fn get_table_constraints(&self, schemas: &[String]) -> Result<TableConstraints> {
        Ok(TableConstraints {
            foreign_keys: self.get_foreign_keys(schemas).await?,
            primary_keys: self.get_primary_keys(schemas).await?,
            unique_constraints: self.get_unique_constraints(schemas).await?,
        })
    }

    async fn get_create_statement(&self, schema: &str, table: &str) -> Result<String>;

    /// Fails with `NotImplemented` where the backend cannot honour `cascade`.
    fn get_truncate_statement(&self, schema: &str, table: &str, cascade: bool) -> Result<String>;

    /// `where_clause` is appended to the count query as given.
    async fn get_row_count(&self, schema: &str, table: &str, where_clause: Option<&str>)
        -> Result<i64>;

    /// Stream every row of `schema.table` into `sink`, returning the count.
    async fn stream_rows(
        &self,
        ctx: &RequestContext,
        schema: &str,
        table: &str,
        sink: &mut dyn RowSink,
    ) -> Result<u64>;

    async fn close(&self);
}

/// Open a pooled connection for a Postgres or MySQL configuration.
///
/// `timeout` bounds pool acquisition, including the first connect.
pub async fn connect_sql(config: &ConnectionConfig, timeout: Duration) -> Result<Box<dyn SqlAdapter>> {
    match config {
        ConnectionConfig::Postgres(sql) => {
            let options = pg_options(sql)?;
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(timeout)
                .connect_with(options)
                .await
                .map_err(|e| connect_error("connect to postgres", e))?;
            info!("Connected to postgres ({})", describe_target(sql));
            Ok(Box::new(PostgresAdapter::new(pool)))
        }
        ConnectionConfig::Mysql(sql) => {
            let options = mysql_options(sql)?;
            let pool = MySqlPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(timeout)
                .connect_with(options)
                .await
                .map_err(|e| connect_error("connect to mysql", e))?;
            info!("Connected to mysql ({})", describe_target(sql));
            Ok(Box::new(MySqlAdapter::new(pool)))
        }
        other => Err(TaplineError::not_implemented(format!(
            "'{}' is not a SQL connection",
            other.kind()
        ))),
    }
}

fn describe_target(sql: &SqlConnectionConfig) -> String {
    match sql {
        SqlConnectionConfig::Url { url } => tapline_core::connection::redact_url_password(url),
        SqlConnectionConfig::Fields(f) => format!("{}:{}/{}", f.host, f.port, f.database),
    }
}

fn pg_options(sql: &SqlConnectionConfig) -> Result<PgConnectOptions> {
    match sql {
        SqlConnectionConfig::Url { url } => {
            PgConnectOptions::from_str(url).map_err(|e| sql_error("parse postgres url", e))
        }
        SqlConnectionConfig::Fields(f) => {
            let mut options = PgConnectOptions::new()
                .host(&f.host)
                .port(f.port)
                .username(&f.user)
                .password(&f.password)
                .database(&f.database);
            if let Some(mode) = &f.ssl_mode {
                let mode = PgSslMode::from_str(mode)
                    .map_err(|e| sql_error("parse postgres ssl mode", e))?;
                options = options.ssl_mode(mode);
            }
            Ok(options)
        }
    }
}

fn mysql_options(sql: &SqlConnectionConfig) -> Result<MySqlConnectOptions> {
    match sql {
        SqlConnectionConfig::Url { url } => {
            MySqlConnectOptions::from_str(url).map_err(|e| sql_error("parse mysql url", e))
        }
        SqlConnectionConfig::Fields(f) => {
            let mut options = MySqlConnectOptions::new()
                .host(&f.host)
                .port(f.port)
                .username(&f.user)
                .password(&f.password)
                .database(&f.database);
            if let Some(mode) = &f.ssl_mode {
                let mode = MySqlSslMode::from_str(mode)
                    .map_err(|e| sql_error("parse mysql ssl mode", e))?;
                options = options.ssl_mode(mode);
            }
            Ok(options)
        }
    }
}

/// Keep only the columns of one table.
pub(crate) fn filter_table(columns: Vec<Column>, schema: &str, table: &str) -> Vec<Column> {
    columns
        .into_iter()
        .filter(|c| c.schema == schema && c.table == table)
        .collect()
}

/// Group per-column key rows `(constraint, schema, table, column)` that are
/// ordered by table, constraint and column position.
pub(crate) fn group_key_columns(
    rows: Vec<(String, String, String, String)>,
) -> Vec<(String, String, Vec<String>)> {
    let mut grouped: Vec<(String, String, Vec<String>)> = Vec::new();
    for (name, schema, table, column) in rows {
        let qualified = tapline_core::schema::qualified_table(&schema, &table);
        match grouped.last_mut() {
            Some((last_table, last_name, columns)) if *last_table == qualified && *last_name == name => {
                columns.push(column)
            }
            _ => grouped.push((qualified, name, vec![column])),
        }
    }
    grouped
}

pub(crate) fn into_primary_key_map(groups: Vec<(String, String, Vec<String>)>) -> PrimaryKeyMap {
    let mut map = HashMap::new();
    for (table, name, columns) in groups {
        debug!("primary key '{}' on '{}'", name, table);
        map.insert(
            table.clone(),
            tapline_core::PrimaryKeyConstraint {
                name,
                table,
                columns,
            },
        );
    }
    map
}

pub(crate) fn into_unique_map(groups: Vec<(String, String, Vec<String>)>) -> UniqueConstraintMap {
    let mut map: UniqueConstraintMap = HashMap::new();
    for (table, name, columns) in groups {
        map.entry(table.clone())
            .or_default()
            .push(tapline_core::UniqueConstraint {
                name,
                table,
                columns,
            });
    }
    map
}
