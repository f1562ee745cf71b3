//! The dispatch and validation layer.

use std::sync::Arc;

use tapline_ai::{generate_records, GenerateRequest, Record};
use tapline_connectors::{ObjectStoreAdapter, SqlAdapter};
use tapline_core::schema::{contains_table, distinct_schemas, distinct_tables, qualified_table};
use tapline_core::{
    AccountAuthorizer, BackendKind, Column, Connection, ConnectionConfig, ConnectionRegistry,
    ForeignKeyMap, JobRunHistory, PrimaryKeyMap, RequestContext, Result, RowSink, RunLocator,
    TableConstraints, TaplineError,
};
use tracing::{debug, info};

use crate::backends::BackendFactory;
use crate::config::ServiceConfig;
use crate::types::{
    GenerateDataRequest, InitStatementOptions, InitStatements, SchemaOptions, StreamRequest,
    UniqueConstraintsResponse,
};

/// Entry points for connection introspection, streaming and synthesis.
///
/// Holds no per-request state; every call opens and closes its own backend
/// handles.
pub struct ConnectionDataService {
    connections: Arc<dyn ConnectionRegistry>,
    authorizer: Arc<dyn AccountAuthorizer>,
    job_runs: Arc<dyn JobRunHistory>,
    backends: Arc<dyn BackendFactory>,
    config: ServiceConfig,
}

impl ConnectionDataService {
    pub fn new(
        connections: Arc<dyn ConnectionRegistry>,
        authorizer: Arc<dyn AccountAuthorizer>,
        job_runs: Arc<dyn JobRunHistory>,
        backends: Arc<dyn BackendFactory>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            connections,
            authorizer,
            job_runs,
            backends,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    pub async fn get_connection_schema(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
        options: &SchemaOptions,
    ) -> Result<Vec<Column>> {
        let connection = self.authorized_connection(ctx, connection_id).await?;
        self.schema_of(ctx, &connection, options.run.as_ref()).await
    }

    async fn schema_of(
        &self,
        ctx: &RequestContext,
        connection: &Connection,
        run: Option<&RunLocator>,
    ) -> Result<Vec<Column>> {
        match &connection.config {
            ConnectionConfig::Postgres(_) | ConnectionConfig::Mysql(_) => {
                let db = self.open_sql(connection).await?;
                let result = db.get_schema().await;
                db.close().await;
                result
            }
            ConnectionConfig::AwsS3(s3) => {
                let locator = require_run(run, connection)?;
                let adapter = self.object_adapter(s3)?;
                let run_id = adapter
                    .resolve_run(ctx, self.job_runs.as_ref(), locator)
                    .await?;
                adapter.get_schema(ctx, &run_id).await
            }
            ConnectionConfig::Openai(_) => Err(unsupported("schema", connection)),
        }
    }

    // -----------------------------------------------------------------------
    // Constraints
    // -----------------------------------------------------------------------

    pub async fn get_connection_foreign_constraints(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
    ) -> Result<ForeignKeyMap> {
        let connection = self.authorized_connection(ctx, connection_id).await?;
        let db = self.open_sql_for(&connection, "foreign constraints").await?;
        let result = async {
            let schemas = distinct_schemas(&db.get_schema().await?);
            db.get_foreign_keys(&schemas).await
        }
        .await;
        db.close().await;
        result
    }

    pub async fn get_connection_primary_constraints(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
    ) -> Result<PrimaryKeyMap> {
        let connection = self.authorized_connection(ctx, connection_id).await?;
        let db = self.open_sql_for(&connection, "primary constraints").await?;
        let result = async {
            let schemas = distinct_schemas(&db.get_schema().await?);
            db.get_primary_keys(&schemas).await
        }
        .await;
        db.close().await;
        result
    }

    pub async fn get_connection_unique_constraints(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
    ) -> Result<UniqueConstraintsResponse> {
        let connection = self.authorized_connection(ctx, connection_id).await?;
        let db = self.open_sql_for(&connection, "unique constraints").await?;
        let result = async {
            let schemas = distinct_schemas(&db.get_schema().await?);
            db.get_unique_constraints(&schemas).await
        }
        .await;
        db.close().await;
        Ok(UniqueConstraintsResponse {
            table_constraints: result?,
        })
    }

    pub async fn get_connection_table_constraints(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
    ) -> Result<TableConstraints> {
        let connection = self.authorized_connection(ctx, connection_id).await?;
        let db = self.open_sql_for(&connection, "table constraints").await?;
        let result = async {
            let schemas = distinct_schemas(&db.get_schema().await?);
            db.get_table_constraints(&schemas).await
        }
        .await;
        db.close().await;
        result
    }

    // -----------------------------------------------------------------------
    // Init statements
    // -----------------------------------------------------------------------

    pub async fn get_connection_init_statements(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
        options: &InitStatementOptions,
    ) -> Result<InitStatements> {
        let connection = self.authorized_connection(ctx, connection_id).await?;
        let kind = connection.config.kind();
        if kind == BackendKind::Postgres
            && options.truncate_before_insert
            && !options.truncate_cascade
        {
            return Err(TaplineError::not_implemented(
                "postgres truncate unsupported: table foreign keys are required to order truncate statements",
            ));
        }

        let db = self.open_sql_for(&connection, "init statements").await?;
        let result = async {
            let tables = distinct_tables(&db.get_schema().await?);
            let mut statements = InitStatements::default();
            for (schema, table) in &tables {
                let key = qualified_table(schema, table);
                if options.init_schema {
                    let create = db.get_create_statement(schema, table).await?;
                    statements.create_statements.insert(key.clone(), create);
                }
                let truncate = match kind {
                    BackendKind::Postgres if options.truncate_cascade => true,
                    BackendKind::Mysql => options.truncate_before_insert,
                    _ => false,
                };
                if truncate {
                    let stmt =
                        db.get_truncate_statement(schema, table, options.truncate_cascade)?;
                    statements.truncate_statements.insert(key, stmt);
                }
            }
            debug!(
                "built {} create and {} truncate statements for '{}'",
                statements.create_statements.len(),
                statements.truncate_statements.len(),
                connection.id
            );
            Ok(statements)
        }
        .await;
        db.close().await;
        result
    }

    // -----------------------------------------------------------------------
    // Row count & streaming
    // -----------------------------------------------------------------------

    /// `where_clause` is passed to the backend uninterpreted.
    pub async fn get_table_row_count(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
        schema: &str,
        table: &str,
        where_clause: Option<&str>,
    ) -> Result<i64> {
        let connection = self.authorized_connection(ctx, connection_id).await?;
        let db = self.open_sql_for(&connection, "row count").await?;
        let result = async {
            validate_table(&db.get_schema().await?, schema, table)?;
            db.get_row_count(schema, table, where_clause).await
        }
        .await;
        db.close().await;
        result
    }

    /// Stream every row of the table into `sink`, returning the row count.
    /// Any failure aborts the stream; rows already sent are not retracted.
    pub async fn stream_connection_data(
        &self,
        ctx: &RequestContext,
        request: &StreamRequest,
        sink: &mut dyn RowSink,
    ) -> Result<u64> {
        let connection = self
            .authorized_connection(ctx, &request.connection_id)
            .await?;
        let (schema, table) = (request.schema.as_str(), request.table.as_str());

        let count = match &connection.config {
            ConnectionConfig::Postgres(_) | ConnectionConfig::Mysql(_) => {
                let db = self.open_sql(&connection).await?;
                let result = async {
                    validate_table(&db.get_schema().await?, schema, table)?;
                    db.stream_rows(ctx, schema, table, sink).await
                }
                .await;
                db.close().await;
                result?
            }
            ConnectionConfig::AwsS3(s3) => {
                let locator = require_run(request.run.as_ref(), &connection)?;
                let adapter = self.object_adapter(s3)?;
                let run_id = adapter
                    .resolve_run(ctx, self.job_runs.as_ref(), locator)
                    .await?;
                let tables = adapter.list_tables(ctx, &run_id).await?;
                if !tables.iter().any(|(s, t)| s == schema && t == table) {
                    return Err(invalid_table(schema, table));
                }
                adapter.stream_rows(ctx, &run_id, schema, table, sink).await?
            }
            ConnectionConfig::Openai(_) => return Err(unsupported("data streaming", &connection)),
        };
        info!(
            "request {}: streamed {} rows of '{}' from connection '{}'",
            ctx.request_id,
            count,
            qualified_table(schema, table),
            connection.id
        );
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // AI generation
    // -----------------------------------------------------------------------

    /// Example records for a SQL table, produced by the model connection.
    pub async fn get_ai_generated_data(
        &self,
        ctx: &RequestContext,
        request: &GenerateDataRequest,
    ) -> Result<Vec<Record>> {
        let ai_connection = self
            .authorized_connection(ctx, &request.ai_connection_id)
            .await?;
        let ConnectionConfig::Openai(openai) = &ai_connection.config else {
            return Err(TaplineError::bad_request(format!(
                "connection '{}' must be a valid openai connection",
                ai_connection.id
            )));
        };

        let data_connection = self
            .authorized_connection(ctx, &request.data_connection_id)
            .await?;
        let db = self
            .open_sql_for(&data_connection, "ai data generation")
            .await?;
        let columns = db.get_table_schema(&request.schema, &request.table).await;
        db.close().await;
        let columns = columns?;
        if columns.is_empty() {
            return Err(invalid_table(&request.schema, &request.table));
        }

        let model = self.backends.completion_model(openai)?;
        generate_records(
            model.as_ref(),
            &GenerateRequest {
                model_name: &request.model_name,
                prompt: &request.prompt,
                count: request.count,
                columns: &columns,
            },
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn authorized_connection(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
    ) -> Result<Connection> {
        let connection = self.connections.get_connection(ctx, connection_id).await?;
        self.authorizer
            .verify_user_in_account(ctx, &connection.account_id)
            .await?;
        debug!(
            "request {}: user '{}' authorized for {} connection '{}'",
            ctx.request_id,
            ctx.user_id,
            connection.config.kind(),
            connection.id
        );
        Ok(connection)
    }

    async fn open_sql(&self, connection: &Connection) -> Result<Box<dyn SqlAdapter>> {
        self.backends
            .sql_adapter(&connection.config, self.config.connect_timeout)
            .await
    }

    /// Open a SQL adapter, rejecting other backend kinds for `operation`.
    async fn open_sql_for(
        &self,
        connection: &Connection,
        operation: &str,
    ) -> Result<Box<dyn SqlAdapter>> {
        if !connection.config.is_sql() {
            return Err(unsupported(operation, connection));
        }
        self.open_sql(connection).await
    }

    fn object_adapter(&self, config: &tapline_core::AwsS3Config) -> Result<ObjectStoreAdapter> {
        let client = self.backends.object_client(config)?;
        Ok(ObjectStoreAdapter::new(client).with_page_size(self.config.object_page_size))
    }
}

fn require_run<'a>(run: Option<&'a RunLocator>, connection: &Connection) -> Result<&'a RunLocator> {
    run.ok_or_else(|| {
        TaplineError::bad_request(format!(
            "connection '{}' is object storage: a job id or job run id is required",
            connection.id
        ))
    })
}

fn validate_table(columns: &[Column], schema: &str, table: &str) -> Result<()> {
    if contains_table(columns, schema, table) {
        Ok(())
    } else {
        Err(invalid_table(schema, table))
    }
}

fn invalid_table(schema: &str, table: &str) -> TaplineError {
    TaplineError::bad_request(format!(
        "must provide valid schema and table: '{}'",
        qualified_table(schema, table)
    ))
}

fn unsupported(operation: &str, connection: &Connection) -> TaplineError {
    TaplineError::not_implemented(format!(
        "{} is not supported for {} connection '{}'",
        operation,
        connection.config.kind(),
        connection.id
    ))
}
