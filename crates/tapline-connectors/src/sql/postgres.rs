//! PostgreSQL adapter over `pg_catalog`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column as _, Executor, Row as _, TypeInfo};
use tapline_core::coerce;
use tapline_core::schema::qualified_table;
use tapline_core::{
    BackendKind, Column, ForeignKeyConstraint, ForeignKeyMap, PrimaryKeyMap, RequestContext,
    Result, Row, RowSink, TaplineError, UniqueConstraintMap,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::statements::{self, ConstraintDef, Dialect};
use super::{group_key_columns, into_primary_key_map, into_unique_map, SqlAdapter};
use crate::error::sql_error;

// ===========================================================================
// Catalog queries
// ===========================================================================

const COLUMNS_QUERY: &str = r#"
    SELECT
        n.nspname::text AS table_schema,
        c.relname::text AS table_name,
        a.attname::text AS column_name,
        pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type,
        NOT a.attnotnull AS is_nullable,
        pg_catalog.pg_get_expr(d.adbin, d.adrelid) AS column_default,
        CASE
            WHEN a.attgenerated = 's' THEN 'STORED'
            WHEN a.attidentity = 'a' THEN 'IDENTITY ALWAYS'
            WHEN a.attidentity = 'd' THEN 'IDENTITY BY DEFAULT'
        END::text AS generated_type
    FROM pg_catalog.pg_attribute a
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
    WHERE a.attnum > 0
      AND NOT a.attisdropped
      AND c.relkind IN ('r', 'p')
      AND n.nspname NOT IN ('pg_catalog', 'information_schema')
      AND n.nspname NOT LIKE 'pg_toast%'
      AND n.nspname NOT LIKE 'pg_temp%'
      AND pg_catalog.has_schema_privilege(n.oid, 'USAGE')
      AND pg_catalog.has_table_privilege(c.oid, 'SELECT')
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        con.conname::text AS constraint_name,
        n.nspname::text AS schema_name,
        c.relname::text AS table_name,
        ARRAY_AGG(a.attname::text ORDER BY k.ord) AS columns,
        ARRAY_AGG(a.attnotnull ORDER BY k.ord) AS not_nullable,
        fn.nspname::text AS foreign_schema,
        fc.relname::text AS foreign_table,
        ARRAY_AGG(fa.attname::text ORDER BY k.ord) AS foreign_columns
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_catalog.pg_class fc ON fc.oid = con.confrelid
    JOIN pg_catalog.pg_namespace fn ON fn.oid = fc.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, fattnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    JOIN pg_catalog.pg_attribute fa ON fa.attrelid = con.confrelid AND fa.attnum = k.fattnum
    WHERE con.contype = 'f' AND n.nspname = ANY($1)
    GROUP BY con.conname, n.nspname, c.relname, fn.nspname, fc.relname
    ORDER BY n.nspname, c.relname, con.conname
"#;

/// Per-column rows of primary-key (`p`) or unique (`u`) constraints.
fn key_columns_query(contype: char) -> String {
    format!(
        r#"
    SELECT
        con.conname::text AS constraint_name,
        n.nspname::text AS schema_name,
        c.relname::text AS table_name,
        a.attname::text AS column_name
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    WHERE con.contype = '{}' AND n.nspname = ANY($1)
    ORDER BY n.nspname, c.relname, con.conname, k.ord
"#,
        contype
    )
}

const TABLE_CONSTRAINT_DEFS_QUERY: &str = r#"
    SELECT con.conname::text, pg_catalog.pg_get_constraintdef(con.oid)
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1 AND c.relname = $2 AND con.contype IN ('p', 'u', 'c')
    ORDER BY CASE con.contype WHEN 'p' THEN 0 WHEN 'u' THEN 1 ELSE 2 END, con.conname
"#;

type ColumnRow = (
    String,
    String,
    String,
    String,
    bool,
    Option<String>,
    Option<String>,
);

type ForeignKeyRow = (
    String,
    String,
    String,
    Vec<String>,
    Vec<bool>,
    String,
    String,
    Vec<String>,
);

fn to_column(row: ColumnRow) -> Column {
    let (schema, table, column, data_type, is_nullable, column_default, generated_type) = row;
    Column {
        schema,
        table,
        column,
        data_type,
        is_nullable,
        column_default,
        generated_type,
    }
}

// ===========================================================================
// Value coercion
// ===========================================================================

/// How a result column is turned into row bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Date,
    Uuid,
    Timestamp,
    Timestamptz,
    Text,
}

impl ValueKind {
    fn from_type_name(name: &str) -> Self {
        match name {
            "DATE" => ValueKind::Date,
            "UUID" => ValueKind::Uuid,
            "TIMESTAMP" => ValueKind::Timestamp,
            "TIMESTAMPTZ" => ValueKind::Timestamptz,
            _ => ValueKind::Text,
        }
    }

    fn is_temporal(self) -> bool {
        matches!(
            self,
            ValueKind::Date | ValueKind::Timestamp | ValueKind::Timestamptz
        )
    }
}

/// `infinity` and `-infinity` have no chrono value; they pass through as text.
fn is_infinite(text: &str) -> bool {
    text == "infinity" || text == "-infinity"
}

fn infinite_text(row: &PgRow, i: usize) -> Option<Vec<u8>> {
    row.try_get_unchecked::<Option<&str>, _>(i)
        .ok()
        .flatten()
        .filter(|text| is_infinite(text))
        .map(|text| text.as_bytes().to_vec())
}

/// Decode one text-protocol row. Temporal and UUID columns are decoded as
/// typed values and re-encoded; everything else keeps the server's text.
fn decode_row(row: &PgRow, columns: &[(String, ValueKind)]) -> Result<Row> {
    let mut out = Row::with_capacity(columns.len());
    for (i, (name, kind)) in columns.iter().enumerate() {
        if kind.is_temporal() {
            if let Some(text) = infinite_text(row, i) {
                out.insert(name.clone(), Some(text));
                continue;
            }
        }
        let value = match kind {
            ValueKind::Date => row
                .try_get::<Option<NaiveDate>, _>(i)
                .map(|v| v.map(coerce::date_to_bytes)),
            ValueKind::Uuid => row
                .try_get::<Option<Uuid>, _>(i)
                .map(|v| v.map(coerce::uuid_to_bytes)),
            ValueKind::Timestamp => row
                .try_get::<Option<NaiveDateTime>, _>(i)
                .map(|v| v.map(coerce::timestamp_to_bytes)),
            ValueKind::Timestamptz => row
                .try_get::<Option<DateTime<Utc>>, _>(i)
                .map(|v| v.map(coerce::timestamptz_to_bytes)),
            ValueKind::Text => row
                .try_get_unchecked::<Option<String>, _>(i)
                .map(|v| v.map(String::into_bytes)),
        }
        .map_err(|e| sql_error(&format!("decode column '{}'", name), e))?;
        out.insert(name.clone(), value);
    }
    Ok(out)
}

// ===========================================================================
// PostgresAdapter
// ===========================================================================

pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn query_columns(&self, filter: &str, schema: &str, table: &str) -> Result<Vec<Column>> {
        let sql = format!(
            "{} {} ORDER BY n.nspname, c.relname, a.attnum",
            COLUMNS_QUERY, filter
        );
        let mut query = sqlx::query_as::<_, ColumnRow>(&sql);
        if !filter.is_empty() {
            query = query.bind(schema).bind(table);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_error("query postgres columns", e))?;
        Ok(rows.into_iter().map(to_column).collect())
    }

    async fn key_columns(
        &self,
        contype: char,
        schemas: &[String],
    ) -> Result<Vec<(String, String, Vec<String>)>> {
        let rows: Vec<(String, String, String, String)> =
            sqlx::query_as(&key_columns_query(contype))
                .bind(schemas.to_vec())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| sql_error("query postgres key constraints", e))?;
        Ok(group_key_columns(rows))
    }

    /// Result column names and value kinds, known even for empty tables.
    async fn probe_columns(&self, schema: &str, table: &str) -> Result<Vec<(String, ValueKind)>> {
        let probe = statements::probe_select(Dialect::Postgres, schema, table);
        let described = (&self.pool)
            .describe(&probe)
            .await
            .map_err(|e| sql_error(&format!("probe {}.{}", schema, table), e))?;
        Ok(described
            .columns()
            .iter()
            .map(|c| {
                (
                    c.name().to_string(),
                    ValueKind::from_type_name(c.type_info().name()),
                )
            })
            .collect())
    }
}

#[async_trait]
impl SqlAdapter for PostgresAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn get_schema(&self) -> Result<Vec<Column>> {
        self.query_columns("", "", "").await
    }

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        self.query_columns("AND n.nspname = $1 AND c.relname = $2", schema, table)
            .await
    }

    async fn get_foreign_keys(&self, schemas: &[String]) -> Result<ForeignKeyMap> {
        if schemas.is_empty() {
            return Ok(ForeignKeyMap::new());
        }
        let rows: Vec<ForeignKeyRow> = sqlx::query_as(FOREIGN_KEYS_QUERY)
            .bind(schemas.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_error("query postgres foreign keys", e))?;

        let mut map: ForeignKeyMap = HashMap::new();
        for (name, schema, table, columns, not_nullable, f_schema, f_table, f_columns) in rows {
            let owner = qualified_table(&schema, &table);
            let fk = ForeignKeyConstraint::new(
                name,
                owner.clone(),
                columns,
                not_nullable,
                qualified_table(&f_schema, &f_table),
                f_columns,
            )?;
            map.entry(owner).or_default().push(fk);
        }
        Ok(map)
    }

    async fn get_primary_keys(&self, schemas: &[String]) -> Result<PrimaryKeyMap> {
        if schemas.is_empty() {
            return Ok(PrimaryKeyMap::new());
        }
        Ok(into_primary_key_map(self.key_columns('p', schemas).await?))
    }

    async fn get_unique_constraints(&self, schemas: &[String]) -> Result<UniqueConstraintMap> {
        if schemas.is_empty() {
            return Ok(UniqueConstraintMap::new());
        }
        Ok(into_unique_map(self.key_columns('u', schemas).await?))
    }

    async fn get_create_statement(&self, schema: &str, table: &str) -> Result<String> {
        let columns = self.get_table_schema(schema, table).await?;
        if columns.is_empty() {
            return Err(TaplineError::NotFound(format!(
                "table '{}' has no columns",
                qualified_table(schema, table)
            )));
        }
        let defs: Vec<(String, String)> = sqlx::query_as(TABLE_CONSTRAINT_DEFS_QUERY)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_error("query postgres constraint definitions", e))?;
        let defs: Vec<ConstraintDef> = defs
            .into_iter()
            .map(|(name, definition)| ConstraintDef { name, definition })
            .collect();
        Ok(statements::postgres_create_table(schema, table, &columns, &defs))
    }

    fn get_truncate_statement(&self, schema: &str, table: &str, cascade: bool) -> Result<String> {
        if !cascade {
            return Err(TaplineError::not_implemented(format!(
                "non-cascading truncate of '{}' requires dependency ordering",
                qualified_table(schema, table)
            )));
        }
        Ok(statements::truncate_table(Dialect::Postgres, schema, table, true))
    }

    async fn get_row_count(
        &self,
        schema: &str,
        table: &str,
        where_clause: Option<&str>,
    ) -> Result<i64> {
        let sql = statements::count_rows(Dialect::Postgres, schema, table, where_clause);
        debug!("row count: {}", sql);
        let (count,): (i64,) = sqlx::query_as(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| sql_error(&format!("count rows of {}.{}", schema, table), e))?;
        Ok(count)
    }

    async fn stream_rows(
        &self,
        ctx: &RequestContext,
        schema: &str,
        table: &str,
        sink: &mut dyn RowSink,
    ) -> Result<u64> {
        let columns = self.probe_columns(schema, table).await?;
        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        let select = statements::select_columns(Dialect::Postgres, schema, table, &names);
        debug!("stream: {}", select);

        let op = format!("stream {}.{}", schema, table);
        let mut rows = sqlx::raw_sql(&select).fetch(&self.pool);
        let mut count = 0u64;
        while let Some(row) = rows.try_next().await.map_err(|e| sql_error(&op, e))? {
            ctx.check_cancelled(&op)?;
            let row = decode_row(&row, &columns)?;
            sink.send(row).await?;
            count += 1;
        }
        info!("Streamed {} rows from postgres table '{}.{}'", count, schema, table);
        Ok(count)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
