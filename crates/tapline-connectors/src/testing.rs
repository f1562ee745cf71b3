//! In-memory fakes for exercising adapters and the dispatch layer without
//! live backends.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_compression::tokio::bufread::GzipEncoder;
use async_trait::async_trait;
use tapline_core::schema::qualified_table;
use tapline_core::{
    AccountAuthorizer, BackendKind, Column, Connection, ConnectionRegistry, ForeignKeyMap, JobRun,
    JobRunHistory, PrimaryKeyMap, RequestContext, Result, Row, RowSink, TableConstraints,
    TaplineError, UniqueConstraintMap,
};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::s3::{ListObjectsPage, ListObjectsRequest, ObjectClient, ObjectReader};
use crate::sql::statements::{self, Dialect};
use crate::sql::SqlAdapter;

/// Gzip-compress `data` as a single member.
pub async fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzipEncoder::new(data);
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await?;
    Ok(out)
}

// ===========================================================================
// FakeObjectClient
// ===========================================================================

/// S3-like object client over a sorted key map.
///
/// Prefixes match as plain string prefixes; continuation tokens are the last
/// key returned. Tracks how many readers were opened and dropped.
#[derive(Default)]
pub struct FakeObjectClient {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<ListObjectsRequest>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl FakeObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, body: Vec<u8>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key.to_string(), body);
        }
    }

    /// Make `get_object(key)` fail with a connection error.
    pub fn fail_get(&self, key: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(key.to_string());
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn list_requests(&self) -> Vec<ListObjectsRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectClient for FakeObjectClient {
    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListObjectsPage> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let objects = self
            .objects
            .lock()
            .map_err(|_| TaplineError::Internal("fake object map poisoned".into()))?;

        let mut entries: Vec<(String, bool)> = Vec::new();
        for key in objects.keys() {
            let Some(rest) = key.strip_prefix(request.prefix.as_str()) else {
                continue;
            };
            if request.delimited {
                if let Some(slash) = rest.find('/') {
                    let folder = format!("{}{}", request.prefix, &rest[..=slash]);
                    if entries.last().map(|(k, _)| k != &folder).unwrap_or(true) {
                        entries.push((folder, true));
                    }
                    continue;
                }
            }
            entries.push((key.clone(), false));
        }

        if let Some(token) = &request.continuation_token {
            entries.retain(|(k, _)| k > token);
        }
        let limit = request.max_keys.unwrap_or(usize::MAX);
        let is_truncated = entries.len() > limit;
        entries.truncate(limit);

        let next_continuation_token = if is_truncated {
            entries.last().map(|(k, _)| k.clone())
        } else {
            None
        };
        let mut page = ListObjectsPage {
            is_truncated,
            next_continuation_token,
            ..Default::default()
        };
        for (key, is_prefix) in entries {
            if is_prefix {
                page.common_prefixes.push(key);
            } else {
                page.keys.push(key);
            }
        }
        Ok(page)
    }

    async fn get_object(&self, key: &str) -> Result<ObjectReader> {
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(key))
            .unwrap_or(false);
        if failing {
            return Err(TaplineError::Connection(format!(
                "get object '{}': connection reset",
                key
            )));
        }
        let body = self
            .objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
            .ok_or_else(|| TaplineError::NotFound(format!("object '{}'", key)))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(TrackedReader {
            inner: io::Cursor::new(body),
            closed: self.closed.clone(),
        }))
    }
}

struct TrackedReader {
    inner: io::Cursor<Vec<u8>>,
    closed: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ===========================================================================
// FakeSqlAdapter
// ===========================================================================

/// Canned relational backend. Clones share the close counter and the
/// recorded where clauses.
#[derive(Clone)]
pub struct FakeSqlAdapter {
    kind: BackendKind,
    columns: Vec<Column>,
    constraints: TableConstraints,
    rows: HashMap<String, Vec<Row>>,
    closed: Arc<AtomicUsize>,
    where_clauses: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeSqlAdapter {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            columns: Vec::new(),
            constraints: TableConstraints::default(),
            rows: HashMap::new(),
            closed: Arc::new(AtomicUsize::new(0)),
            where_clauses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_constraints(mut self, constraints: TableConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_rows(mut self, schema: &str, table: &str, rows: Vec<Row>) -> Self {
        self.rows.insert(qualified_table(schema, table), rows);
        self
    }

    /// Number of times an adapter sharing this state was closed.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn where_clauses(&self) -> Vec<Option<String>> {
        self.where_clauses
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    fn dialect(&self) -> Dialect {
        match self.kind {
            BackendKind::Mysql => Dialect::MySql,
            _ => Dialect::Postgres,
        }
    }
}

fn in_schemas<V: Clone>(map: &HashMap<String, V>, schemas: &[String]) -> HashMap<String, V> {
    map.iter()
        .filter(|(table, _)| {
            table
                .split_once('.')
                .map(|(schema, _)| schemas.iter().any(|s| s == schema))
                .unwrap_or(false)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[async_trait]
impl SqlAdapter for FakeSqlAdapter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn get_schema(&self) -> Result<Vec<Column>> {
        Ok(self.columns.clone())
    }

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        Ok(self
            .columns
            .iter()
            .filter(|c| c.schema == schema && c.table == table)
            .cloned()
            .collect())
    }

    async fn get_foreign_keys(&self, schemas: &[String]) -> Result<ForeignKeyMap> {
        Ok(in_schemas(&self.constraints.foreign_keys, schemas))
    }

    async fn get_primary_keys(&self, schemas: &[String]) -> Result<PrimaryKeyMap> {
        Ok(in_schemas(&self.constraints.primary_keys, schemas))
    }

    async fn get_unique_constraints(&self, schemas: &[String]) -> Result<UniqueConstraintMap> {
        Ok(in_schemas(&self.constraints.unique_constraints, schemas))
    }

    async fn get_create_statement(&self, schema: &str, table: &str) -> Result<String> {
        let columns = self.get_table_schema(schema, table).await?;
        match self.kind {
            BackendKind::Postgres => Ok(statements::postgres_create_table(
                schema, table, &columns, &[],
            )),
            _ => Ok(format!(
                "CREATE TABLE {} ({});",
                self.dialect().quote_table(schema, table),
                columns
                    .iter()
                    .map(|c| format!("{} {}", self.dialect().quote_ident(&c.column), c.data_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    fn get_truncate_statement(&self, schema: &str, table: &str, cascade: bool) -> Result<String> {
        if self.kind == BackendKind::Postgres && !cascade {
            return Err(TaplineError::not_implemented(
                "non-cascading postgres truncate",
            ));
        }
        Ok(statements::truncate_table(
            self.dialect(),
            schema,
            table,
            self.kind == BackendKind::Postgres,
        ))
    }

    async fn get_row_count(
        &self,
        schema: &str,
        table: &str,
        where_clause: Option<&str>,
    ) -> Result<i64> {
        if let Ok(mut clauses) = self.where_clauses.lock() {
            clauses.push(where_clause.map(str::to_string));
        }
        Ok(self
            .rows
            .get(&qualified_table(schema, table))
            .map(|rows| rows.len() as i64)
            .unwrap_or(0))
    }

    async fn stream_rows(
        &self,
        ctx: &RequestContext,
        schema: &str,
        table: &str,
        sink: &mut dyn RowSink,
    ) -> Result<u64> {
        let mut count = 0;
        for row in self
            .rows
            .get(&qualified_table(schema, table))
            .cloned()
            .unwrap_or_default()
        {
            ctx.check_cancelled("fake stream")?;
            sink.send(row).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ===========================================================================
// Collaborators
// ===========================================================================

#[derive(Default)]
pub struct StaticConnections {
    connections: HashMap<String, Connection>,
}

impl StaticConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, connection: Connection) -> Self {
        self.connections.insert(connection.id.clone(), connection);
        self
    }
}

#[async_trait]
impl ConnectionRegistry for StaticConnections {
    async fn get_connection(&self, _ctx: &RequestContext, connection_id: &str) -> Result<Connection> {
        self.connections
            .get(connection_id)
            .cloned()
            .ok_or_else(|| TaplineError::NotFound(format!("connection '{}'", connection_id)))
    }
}

/// Admits the request's user into a fixed set of accounts.
#[derive(Default)]
pub struct StaticAuthorizer {
    accounts: HashSet<String>,
}

impl StaticAuthorizer {
    pub fn allowing(accounts: &[&str]) -> Self {
        Self {
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[async_trait]
impl AccountAuthorizer for StaticAuthorizer {
    async fn verify_user_in_account(&self, ctx: &RequestContext, account_id: &str) -> Result<()> {
        if self.accounts.contains(account_id) {
            Ok(())
        } else {
            Err(TaplineError::Unauthorized(format!(
                "user '{}' is not a member of account '{}'",
                ctx.user_id, account_id
            )))
        }
    }
}

#[derive(Default)]
pub struct StaticJobRuns {
    runs: HashMap<String, Vec<JobRun>>,
}

impl StaticJobRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs of `job_id`, newest last.
    pub fn with_runs(mut self, job_id: &str, runs: Vec<JobRun>) -> Self {
        self.runs.insert(job_id.to_string(), runs);
        self
    }
}

#[async_trait]
impl JobRunHistory for StaticJobRuns {
    async fn recent_runs(&self, _ctx: &RequestContext, job_id: &str) -> Result<Vec<JobRun>> {
        Ok(self.runs.get(job_id).cloned().unwrap_or_default())
    }
}
