//! Schema inference and row streaming over job-run artifacts.

use std::sync::Arc;

use async_compression::tokio::bufread::GzipDecoder;
use serde_json::{Map, Value};
use tapline_core::coerce::json_record_to_row;
use tapline_core::schema::{qualified_table, split_qualified_table};
use tapline_core::{Column, JobRunHistory, RequestContext, Result, RowSink, RunLocator};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info, warn};

use super::client::{ListObjectsRequest, ObjectClient, ObjectReader};
use super::runs::find_latest_run_with_data;
use super::{activities_prefix, table_data_prefix, DEFAULT_PAGE_SIZE};
use crate::error::read_error;

type JsonLines = Lines<BufReader<GzipDecoder<BufReader<ObjectReader>>>>;

/// Gzip-decode an object body and split it into lines.
fn json_lines(reader: ObjectReader) -> JsonLines {
    let mut decoder = GzipDecoder::new(BufReader::new(reader));
    decoder.multiple_members(true);
    BufReader::new(decoder).lines()
}

fn parse_record(key: &str, line_no: usize, line: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(line).map_err(|e| {
        tapline_core::TaplineError::decode(format!(
            "object '{}' line {}: {}",
            key, line_no, e
        ))
    })
}

/// Reads `workflows/<run>/activities/<schema>.<table>/data` objects.
pub struct ObjectStoreAdapter {
    client: Arc<dyn ObjectClient>,
    page_size: usize,
}

impl ObjectStoreAdapter {
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Explicit run ids are used as given; job ids resolve to the newest run
    /// with data.
    pub async fn resolve_run(
        &self,
        ctx: &RequestContext,
        history: &dyn JobRunHistory,
        locator: &RunLocator,
    ) -> Result<String> {
        match locator {
            RunLocator::JobRunId(run_id) => Ok(run_id.clone()),
            RunLocator::JobId(job_id) => {
                find_latest_run_with_data(ctx, self.client.as_ref(), history, job_id).await
            }
        }
    }

    /// `(schema, table)` pairs with a folder under the run's activities.
    pub async fn list_tables(&self, ctx: &RequestContext, run_id: &str) -> Result<Vec<(String, String)>> {
        let prefix = activities_prefix(run_id);
        let mut tables = Vec::new();
        let mut token = None;
        loop {
            ctx.check_cancelled("table listing")?;
            let page = self
                .client
                .list_objects(&ListObjectsRequest {
                    prefix: prefix.clone(),
                    delimited: true,
                    continuation_token: token.take(),
                    max_keys: Some(self.page_size),
                })
                .await?;
            for folder in &page.common_prefixes {
                let name = folder
                    .strip_prefix(prefix.as_str())
                    .unwrap_or(folder)
                    .trim_matches('/');
                match split_qualified_table(name) {
                    Some((schema, table)) => tables.push((schema.to_string(), table.to_string())),
                    None => warn!("skipping activity folder '{}': not <schema>.<table>", folder),
                }
            }
            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }
        tables.sort();
        tables.dedup();
        debug!("run '{}' has {} tables", run_id, tables.len());
        Ok(tables)
    }

    /// Columns from the keys of the first record of the table's first data
    /// object, in key order. Object storage has no types; every column is
    /// nullable.
    pub async fn infer_schema(
        &self,
        ctx: &RequestContext,
        run_id: &str,
        schema: &str,
        table: &str,
    ) -> Result<Vec<Column>> {
        ctx.check_cancelled("schema inference")?;
        let prefix = table_data_prefix(run_id, schema, table);
        let page = self
            .client
            .list_objects(&ListObjectsRequest {
                prefix: prefix.clone(),
                max_keys: Some(1),
                ..Default::default()
            })
            .await?;
        let Some(key) = page.keys.first() else {
            warn!("no data objects under '{}'", prefix);
            return Ok(Vec::new());
        };

        let mut lines = json_lines(self.client.get_object(key).await?);
        let mut line_no = 0;
        while let Some(line) = lines.next_line().await.map_err(|e| read_error(key, e))? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_record(key, line_no, &line)?;
            let mut names: Vec<&String> = record.keys().collect();
            names.sort();
            return Ok(names
                .into_iter()
                .map(|name| Column {
                    schema: schema.to_string(),
                    table: table.to_string(),
                    column: name.clone(),
                    data_type: String::new(),
                    is_nullable: true,
                    column_default: None,
                    generated_type: None,
                })
                .collect());
        }
        warn!("first data object '{}' has no records", key);
        Ok(Vec::new())
    }

    /// Inferred columns of every table of the run.
    pub async fn get_schema(&self, ctx: &RequestContext, run_id: &str) -> Result<Vec<Column>> {
        let mut columns = Vec::new();
        for (schema, table) in self.list_tables(ctx, run_id).await? {
            columns.extend(self.infer_schema(ctx, run_id, &schema, &table).await?);
        }
        info!("Inferred {} columns for run '{}'", columns.len(), run_id);
        Ok(columns)
    }

    /// Stream every record of every data object of the table, page by page.
    pub async fn stream_rows(
        &self,
        ctx: &RequestContext,
        run_id: &str,
        schema: &str,
        table: &str,
        sink: &mut dyn RowSink,
    ) -> Result<u64> {
        let prefix = table_data_prefix(run_id, schema, table);
        let op = format!("stream of {}", qualified_table(schema, table));
        let mut token = None;
        let mut objects = 0usize;
        let mut rows = 0u64;
        loop {
            ctx.check_cancelled(&op)?;
            let page = self
                .client
                .list_objects(&ListObjectsRequest {
                    prefix: prefix.clone(),
                    delimited: false,
                    continuation_token: token.take(),
                    max_keys: Some(self.page_size),
                })
                .await?;
            for key in &page.keys {
                ctx.check_cancelled(&op)?;
                rows += self.stream_object(ctx, &op, key, sink).await?;
                objects += 1;
            }
            match page.next_continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }
        if objects == 0 {
            info!("0 files found for path: {}", prefix);
        }
        info!(
            "Streamed {} rows from {} objects for run '{}' table '{}.{}'",
            rows, objects, run_id, schema, table
        );
        Ok(rows)
    }

    /// One object, start to finish. The reader is dropped on every return.
    async fn stream_object(
        &self,
        ctx: &RequestContext,
        op: &str,
        key: &str,
        sink: &mut dyn RowSink,
    ) -> Result<u64> {
        debug!("reading object '{}'", key);
        let mut lines = json_lines(self.client.get_object(key).await?);
        let mut line_no = 0;
        let mut rows = 0u64;
        while let Some(line) = lines.next_line().await.map_err(|e| read_error(key, e))? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            ctx.check_cancelled(op)?;
            let record = parse_record(key, line_no, &line)?;
            sink.send(json_record_to_row(&record)).await?;
            rows += 1;
        }
        Ok(rows)
    }
}
