//! Metadata Collector
//!
//! Raw catalog reads against one database. Every call takes its own
//! connection from the pool and returns it before the call completes.

use crate::canonical::{canonicalize, canonicalize_database};
use crate::error::{not_found_error, query_error, SchemaResult};
use crate::escape::{escape_id, escape_string, in_list};
use crate::model::{Field, TableKind};
use crate::pool::{DbaPool, QueryResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Upper bound for catalog listings
pub const CATALOG_MAX_ROWS: usize = 10_000;

/// Upper bound of primary key rows per requested table
const PRIMARY_KEY_ROWS_PER_TABLE: usize = 100;

/// One row of the catalog's table listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableListing {
    pub name: String,
    pub kind: TableKind,
    pub data_length: u64,
    pub row_count: u64,
}

#[derive(Clone)]
pub struct MetadataCollector {
    pool: Arc<dyn DbaPool>,
}

impl MetadataCollector {
    pub fn new(pool: Arc<dyn DbaPool>) -> Self {
        Self { pool }
    }

    async fn fetch(&self, sql: &str, max_rows: usize, want_fields: bool) -> SchemaResult<QueryResult> {
        let mut conn = self.pool.acquire().await?;
        conn.execute_fetch(sql, max_rows, want_fields).await
    }

    /// Canonical `CREATE DATABASE` statement of `db`.
    pub async fn database_schema(&self, db: &str) -> SchemaResult<String> {
        let sql = format!("SHOW CREATE DATABASE IF NOT EXISTS {}", escape_id(db));
        let result = self.fetch(&sql, 1, false).await?;
        let raw = result
            .value(0, 1)
            .ok_or_else(|| not_found_error(format!("database {} not found", db)))?;
        Ok(canonicalize_database(raw, db))
    }

    /// Tables (and views when `include_views`) in catalog order.
    pub async fn list_tables(&self, db: &str, include_views: bool) -> SchemaResult<Vec<TableListing>> {
        let mut sql = format!(
            "SELECT table_name, table_type, data_length, table_rows FROM information_schema.tables WHERE table_schema = {}",
            escape_string(db)
        );
        if !include_views {
            sql.push_str(" AND table_type = 'BASE TABLE'");
        }

        let result = self.fetch(&sql, CATALOG_MAX_ROWS, false).await?;
        let mut tables = Vec::with_capacity(result.rows.len());
        for row in 0..result.rows.len() {
            let name = result
                .value(row, 0)
                .ok_or_else(|| query_error("table listing returned a NULL table_name"))?;
            let kind = TableKind::from_catalog(result.value(row, 1).unwrap_or_default())?;
            tables.push(TableListing {
                name: name.to_string(),
                kind,
                data_length: parse_counter(result.value(row, 2), "data_length")?,
                row_count: parse_counter(result.value(row, 3), "table_rows")?,
            });
        }

        debug!("{}: {} catalog entries", db, tables.len());
        Ok(tables)
    }

    /// Primary key columns per table, in ordinal order. Tables without one are absent.
    pub async fn primary_keys(&self, db: &str, tables: &[String]) -> SchemaResult<HashMap<String, Vec<String>>> {
        let mut keys: HashMap<String, Vec<String>> = HashMap::new();
        if tables.is_empty() {
            return Ok(keys);
        }

        let sql = format!(
            "SELECT table_name, ordinal_position, column_name FROM information_schema.key_column_usage \
             WHERE table_schema = {} AND table_name IN {} AND constraint_name = 'PRIMARY' \
             ORDER BY table_name, ordinal_position",
            escape_string(db),
            in_list(tables)
        );
        let result = self
            .fetch(&sql, tables.len() * PRIMARY_KEY_ROWS_PER_TABLE, false)
            .await?;

        for row in 0..result.rows.len() {
            let (Some(table), Some(column)) = (result.value(row, 0), result.value(row, 2)) else {
                return Err(query_error("primary key lookup returned a NULL name"));
            };
            keys.entry(table.to_string()).or_default().push(column.to_string());
        }
        Ok(keys)
    }

    /// Column descriptors and names, from a query that can never return rows.
    pub async fn columns(&self, db: &str, table: &str) -> SchemaResult<(Vec<Field>, Vec<String>)> {
        let sql = format!("SELECT * FROM {}.{} WHERE 1=0", escape_id(db), escape_id(table));
        let result = self.fetch(&sql, 0, true).await?;
        let names = result.fields.iter().map(|f| f.name.clone()).collect();
        Ok((result.fields, names))
    }

    /// Server-reported `CREATE TABLE` / `CREATE VIEW` text, uncanonicalized.
    pub async fn create_statement(&self, db: &str, table: &str) -> SchemaResult<String> {
        let sql = format!("SHOW CREATE TABLE {}.{}", escape_id(db), escape_id(table));
        let result = self.fetch(&sql, 1, false).await?;
        result
            .value(0, 1)
            .map(str::to_string)
            .ok_or_else(|| not_found_error(format!("table {} not found in database {}", table, db)))
    }

    pub async fn canonical_schema(&self, db: &str, table: &str, kind: TableKind) -> SchemaResult<String> {
        let raw = self.create_statement(db, table).await?;
        Ok(canonicalize(&raw, kind, db))
    }
}

fn parse_counter(value: Option<&str>, column: &str) -> SchemaResult<u64> {
    match value {
        None => Ok(0),
        Some(v) => v
            .parse()
            .map_err(|_| query_error(format!("invalid {} value {:?}", column, v))),
    }
}
