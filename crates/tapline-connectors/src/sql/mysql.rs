//! MySQL adapter over `information_schema`.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{Column as _, Executor, Row as _};
use tapline_core::schema::qualified_table;
use tapline_core::{
    BackendKind, Column, ForeignKeyConstraint, ForeignKeyMap, PrimaryKeyMap, RequestContext,
    Result, Row, RowSink, TaplineError, UniqueConstraintMap,
};
use tracing::{debug, info};

use super::statements::{self, placeholders, Dialect};
use super::{filter_table, group_key_columns, into_primary_key_map, into_unique_map, SqlAdapter};
use crate::error::sql_error;

const COLUMNS_QUERY: &str = r#"
    SELECT
        CAST(c.TABLE_SCHEMA AS CHAR),
        CAST(c.TABLE_NAME AS CHAR),
        CAST(c.COLUMN_NAME AS CHAR),
        CAST(c.COLUMN_TYPE AS CHAR),
        CAST(c.IS_NULLABLE AS CHAR),
        CAST(c.COLUMN_DEFAULT AS CHAR),
        CAST(c.EXTRA AS CHAR)
    FROM information_schema.COLUMNS c
    JOIN information_schema.TABLES t
      ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
    WHERE t.TABLE_TYPE = 'BASE TABLE'
      AND c.TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
    ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME, c.ORDINAL_POSITION
"#;

type ColumnRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
);

/// One column of a foreign key: constraint, owning schema/table/column,
/// nullability, referenced schema/table/column.
type ForeignKeyColumnRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

fn to_column(row: ColumnRow) -> Column {
    let (schema, table, column, data_type, is_nullable, column_default, extra) = row;
    Column {
        schema,
        table,
        column,
        data_type,
        is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
        column_default,
        generated_type: extra.as_deref().and_then(generated_kind),
    }
}

/// Generated-column kind from the `EXTRA` attribute.
fn generated_kind(extra: &str) -> Option<String> {
    let extra = extra.to_ascii_uppercase();
    if extra.contains("STORED GENERATED") {
        Some("STORED".to_string())
    } else if extra.contains("VIRTUAL GENERATED") {
        Some("VIRTUAL".to_string())
    } else {
        None
    }
}

fn foreign_keys_query(schema_count: usize) -> String {
    format!(
        r#"
    SELECT
        CAST(k.CONSTRAINT_NAME AS CHAR),
        CAST(k.TABLE_SCHEMA AS CHAR),
        CAST(k.TABLE_NAME AS CHAR),
        CAST(k.COLUMN_NAME AS CHAR),
        CAST(c.IS_NULLABLE AS CHAR),
        CAST(k.REFERENCED_TABLE_SCHEMA AS CHAR),
        CAST(k.REFERENCED_TABLE_NAME AS CHAR),
        CAST(k.REFERENCED_COLUMN_NAME AS CHAR)
    FROM information_schema.KEY_COLUMN_USAGE k
    JOIN information_schema.COLUMNS c
      ON c.TABLE_SCHEMA = k.TABLE_SCHEMA
     AND c.TABLE_NAME = k.TABLE_NAME
     AND c.COLUMN_NAME = k.COLUMN_NAME
    WHERE k.REFERENCED_TABLE_NAME IS NOT NULL
      AND k.TABLE_SCHEMA IN ({})
    ORDER BY k.TABLE_SCHEMA, k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION
"#,
        placeholders(schema_count)
    )
}

fn key_columns_query(constraint_type: &str, schema_count: usize) -> String {
    format!(
        r#"
    SELECT
        CAST(tc.CONSTRAINT_NAME AS CHAR),
        CAST(tc.TABLE_SCHEMA AS CHAR),
        CAST(tc.TABLE_NAME AS CHAR),
        CAST(k.COLUMN_NAME AS CHAR)
    FROM information_schema.TABLE_CONSTRAINTS tc
    JOIN information_schema.KEY_COLUMN_USAGE k
      ON k.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
     AND k.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
     AND k.TABLE_SCHEMA = tc.TABLE_SCHEMA
     AND k.TABLE_NAME = tc.TABLE_NAME
    WHERE tc.CONSTRAINT_TYPE = '{}'
      AND tc.TABLE_SCHEMA IN ({})
    ORDER BY tc.TABLE_SCHEMA, tc.TABLE_NAME, tc.CONSTRAINT_NAME, k.ORDINAL_POSITION
"#,
        constraint_type,
        placeholders(schema_count)
    )
}

/// Fold ordered per-column rows into one constraint per foreign key.
fn group_foreign_keys(rows: Vec<ForeignKeyColumnRow>) -> Result<ForeignKeyMap> {
    struct Pending {
        name: String,
        table: String,
        columns: Vec<String>,
        not_nullable: Vec<bool>,
        foreign_table: String,
        foreign_columns: Vec<String>,
    }

    let mut pending: Vec<Pending> = Vec::new();
    for (name, schema, table, column, nullable, f_schema, f_table, f_column) in rows {
        let owner = qualified_table(&schema, &table);
        let not_null = !nullable.eq_ignore_ascii_case("YES");
        match pending.last_mut() {
            Some(p) if p.table == owner && p.name == name => {
                p.columns.push(column);
                p.not_nullable.push(not_null);
                p.foreign_columns.push(f_column);
            }
            _ => pending.push(Pending {
                name,
                table: owner,
                columns: vec![column],
                not_nullable: vec![not_null],
                foreign_table: qualified_table(&f_schema, &f_table),
                foreign_columns: vec![f_column],
            }),
        }
    }

    let mut map: ForeignKeyMap = HashMap::new();
    for p in pending {
        let fk = ForeignKeyConstraint::new(
            p.name,
            p.table.clone(),
            p.columns,
            p.not_nullable,
            p.foreign_table,
            p.foreign_columns,
        )?;
        map.entry(p.table).or_default().push(fk);
    }
    Ok(map)
}

fn decode_row(row: &MySqlRow, columns: &[String]) -> Result<Row> {
    let mut out = Row::with_capacity(columns.len());
    for (i, name) in columns.iter().enumerate() {
        let value = row
            .try_get_unchecked::<Option<Vec<u8>>, _>(i)
            .map_err(|e| sql_error(&format!("decode column '{}'", name), e))?;
        out.insert(name.clone(), value);
    }
    Ok(out)
}

pub struct MySqlAdapter {
    pool: MySqlPool,
}

impl MySqlAdapter {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn key_columns(
        &self,
        constraint_type: &str,
        schemas: &[String],
    ) -> Result<Vec<(String, String, Vec<String>)>> {
        let sql = key_columns_query(constraint_type, schemas.len());
        let mut query = sqlx::query_as::<_, (String, String, String, String)>(&sql);
        for schema in schemas {
            query = query.bind(schema);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_error("query mysql key constraints", e))?;
        Ok(group_key_columns(rows))
    }

    async fn probe_columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let probe = statements::probe_select(Dialect::MySql, schema, table);
        let described = (&self.pool)
            .describe(&probe)
            .await
            .map_err(|e| sql_error(&format!("probe {}.{}", schema, table), e))?;
        Ok(described
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }
}

#[async_trait]
impl SqlAdapter for MySqlAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Mysql
    }

    async fn get_schema(&self) -> Result<Vec<Column>> {
        let rows: Vec<ColumnRow> = sqlx::query_as(COLUMNS_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_error("query mysql columns", e))?;
        Ok(rows.into_iter().map(to_column).collect())
    }

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        Ok(filter_table(self.get_schema().await?, schema, table))
    }

    async fn get_foreign_keys(&self, schemas: &[String]) -> Result<ForeignKeyMap> {
        if schemas.is_empty() {
            return Ok(ForeignKeyMap::new());
        }
        let sql = foreign_keys_query(schemas.len());
        let mut query = sqlx::query_as::<_, ForeignKeyColumnRow>(&sql);
        for schema in schemas {
            query = query.bind(schema);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| sql_error("query mysql foreign keys", e))?;
        group_foreign_keys(rows)
    }

    async fn get_primary_keys(&self, schemas: &[String]) -> Result<PrimaryKeyMap> {
        if schemas.is_empty() {
            return Ok(PrimaryKeyMap::new());
        }
        Ok(into_primary_key_map(
            self.key_columns("PRIMARY KEY", schemas).await?,
        ))
    }

    async fn get_unique_constraints(&self, schemas: &[String]) -> Result<UniqueConstraintMap> {
        if schemas.is_empty() {
            return Ok(UniqueConstraintMap::new());
        }
        Ok(into_unique_map(self.key_columns("UNIQUE", schemas).await?))
    }

    async fn get_create_statement(&self, schema: &str, table: &str) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {}", Dialect::MySql.quote_table(schema, table));
        let row = sqlx::raw_sql(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| sql_error(&format!("show create table {}.{}", schema, table), e))?;
        let ddl = row
            .try_get_unchecked::<Vec<u8>, _>(1)
            .map_err(|e| sql_error("read create statement", e))?;
        let ddl = String::from_utf8(ddl).map_err(|e| {
            TaplineError::decode(format!("create statement of {}.{}: {}", schema, table, e))
        })?;
        Ok(format!("{};", ddl.trim_end_matches(';')))
    }

    fn get_truncate_statement(&self, schema: &str, table: &str, _cascade: bool) -> Result<String> {
        Ok(statements::truncate_table(Dialect::MySql, schema, table, false))
    }

    async fn get_row_count(
        &self,
        schema: &str,
        table: &str,
        where_clause: Option<&str>,
    ) -> Result<i64> {
        let sql = statements::count_rows(Dialect::MySql, schema, table, where_clause);
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
        let select = statements::select_columns(Dialect::MySql, schema, table, &columns);
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
        info!("Streamed {} rows from mysql table '{}.{}'", count, schema, table);
        Ok(count)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk_row(
        name: &str,
        table: &str,
        column: &str,
        nullable: &str,
        f_table: &str,
        f_column: &str,
    ) -> ForeignKeyColumnRow {
        (
            name.into(),
            "shop".into(),
            table.into(),
            column.into(),
            nullable.into(),
            "shop".into(),
            f_table.into(),
            f_column.into(),
        )
    }

    #[test]
    fn generated_kinds_from_extra() {
        assert_eq!(generated_kind("STORED GENERATED"), Some("STORED".to_string()));
        assert_eq!(generated_kind("VIRTUAL GENERATED"), Some("VIRTUAL".to_string()));
        assert_eq!(generated_kind("auto_increment"), None);
        assert_eq!(generated_kind(""), None);
    }

    #[test]
    fn information_schema_rows_map_onto_columns() {
        let col = to_column((
            "shop".into(),
            "orders".into(),
            "total".into(),
            "decimal(10,2)".into(),
            "NO".into(),
            Some("0.00".into()),
            Some("".into()),
        ));
        assert!(!col.is_nullable);
        assert_eq!(col.column_default.as_deref(), Some("0.00"));
        assert_eq!(col.generated_type, None);
    }

    #[test]
    fn composite_foreign_keys_are_grouped_in_order() {
        let map = group_foreign_keys(vec![
            fk_row("fk_line_order", "order_lines", "order_id", "NO", "orders", "id"),
            fk_row("fk_line_order", "order_lines", "tenant_id", "YES", "orders", "tenant_id"),
            fk_row("fk_line_product", "order_lines", "product_id", "NO", "products", "id"),
            fk_row("fk_order_customer", "orders", "customer_id", "YES", "customers", "id"),
        ])
        .unwrap();

        let lines = &map["shop.order_lines"];
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].columns, vec!["order_id", "tenant_id"]);
        assert_eq!(lines[0].not_nullable, vec![true, false]);
        assert_eq!(lines[0].foreign_key.table, "shop.orders");
        assert_eq!(lines[0].foreign_key.columns, vec!["id", "tenant_id"]);
        assert_eq!(lines[1].foreign_key.table, "shop.products");
        assert_eq!(map["shop.orders"][0].not_nullable, vec![false]);
    }

    #[test]
    fn key_queries_expand_placeholders() {
        let sql = key_columns_query("PRIMARY KEY", 2);
        assert!(sql.contains("tc.CONSTRAINT_TYPE = 'PRIMARY KEY'"));
        assert!(sql.contains("IN (?, ?)"));
        assert!(foreign_keys_query(3).contains("IN (?, ?, ?)"));
    }
}
