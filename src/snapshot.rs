//! Schema Snapshotter
//!
//! Builds a complete [`SchemaDefinition`] for one database. Catalog listing
//! and primary keys are fetched up front; per-table details (columns and
//! canonical DDL) are then fetched by one task per table. A snapshot is
//! all-or-nothing: the first failing table cancels the others and, once every
//! task has finished, its error is returned.

use crate::collector::{MetadataCollector, TableListing};
use crate::error::{SchemaError, SchemaResult};
use crate::filter::TableFilter;
use crate::model::{Field, SchemaDefinition, TableDefinition, TableKind};
use crate::version::assign_version;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct TableDetails {
    fields: Vec<Field>,
    columns: Vec<String>,
    schema: String,
}

#[derive(Clone)]
pub struct SchemaSnapshotter {
    collector: MetadataCollector,
}

impl SchemaSnapshotter {
    pub fn new(collector: MetadataCollector) -> Self {
        Self { collector }
    }

    /// Snapshot `db`, keeping only the catalog entries `filter` accepts.
    pub async fn snapshot(
        &self,
        ctx: &CancellationToken,
        db: &str,
        filter: &TableFilter,
        include_views: bool,
    ) -> SchemaResult<SchemaDefinition> {
        if ctx.is_cancelled() {
            return Err(SchemaError::Cancelled);
        }

        let database_schema = self.collector.database_schema(db).await?;
        let listing = self.collector.list_tables(db, include_views).await?;

        let mut schema = SchemaDefinition {
            database_schema,
            tables: Vec::new(),
            version: String::new(),
        };
        if listing.is_empty() {
            assign_version(&mut schema);
            return Ok(schema);
        }

        let mut tables: Vec<TableDefinition> = listing
            .into_iter()
            .filter(|t| filter.includes(&t.name, t.kind))
            .map(table_definition)
            .collect();

        let names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
        let mut keys = self.collector.primary_keys(db, &names).await?;
        for table in &mut tables {
            table.primary_key_columns = keys.remove(&table.name).unwrap_or_default();
        }

        let details = self.collect_details(ctx, db, &tables).await?;
        for (table, detail) in tables.iter_mut().zip(details) {
            table.fields = detail.fields;
            table.columns = detail.columns;
            table.schema = detail.schema;
        }

        schema.tables = tables;
        assign_version(&mut schema);
        info!("snapshot of {}: {} tables, version {}", db, schema.tables.len(), schema.version);
        Ok(schema)
    }

    /// Snapshot with a filter built from include/exclude lists.
    pub async fn snapshot_matching(
        &self,
        ctx: &CancellationToken,
        db: &str,
        tables: &[String],
        exclude_tables: &[String],
        include_views: bool,
    ) -> SchemaResult<SchemaDefinition> {
        let filter = TableFilter::new(tables, exclude_tables, include_views)?;
        self.snapshot(ctx, db, &filter, include_views).await
    }

    pub async fn snapshot_all(
        &self,
        ctx: &CancellationToken,
        db: &str,
        include_views: bool,
    ) -> SchemaResult<SchemaDefinition> {
        self.snapshot(ctx, db, &TableFilter::all(include_views), include_views).await
    }

    /// Expand names and `/regex/` patterns into the concrete table and view names they match.
    pub async fn resolve_tables(
        &self,
        ctx: &CancellationToken,
        db: &str,
        patterns: &[String],
    ) -> SchemaResult<Vec<String>> {
        let schema = self.snapshot_matching(ctx, db, patterns, &[], true).await?;
        Ok(schema.table_names())
    }

    pub async fn columns_of(&self, db: &str, table: &str) -> SchemaResult<(Vec<Field>, Vec<String>)> {
        self.collector.columns(db, table).await
    }

    pub async fn primary_key_columns_of(&self, db: &str, table: &str) -> SchemaResult<Vec<String>> {
        let mut keys = self.collector.primary_keys(db, &[table.to_string()]).await?;
        Ok(keys.remove(table).unwrap_or_default())
    }

    /// Fetch per-table details concurrently, returned in the order of `tables`.
    async fn collect_details(
        &self,
        ctx: &CancellationToken,
        db: &str,
        tables: &[TableDefinition],
    ) -> SchemaResult<Vec<TableDetails>> {
        let cancel = ctx.child_token();
        let db: Arc<str> = Arc::from(db);
        let mut set = JoinSet::new();

        for (index, table) in tables.iter().enumerate() {
            let collector = self.collector.clone();
            let cancel = cancel.clone();
            let db = Arc::clone(&db);
            let name = table.name.clone();
            let kind = table.kind;
            set.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(SchemaError::Cancelled),
                    result = table_details(&collector, &db, &name, kind) => result,
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<TableDetails>> = (0..tables.len()).map(|_| None).collect();
        let mut first_error: Option<SchemaError> = None;

        // Drain every task, even after a failure, so none outlives this call.
        while let Some(joined) = set.join_next().await {
            let outcome = match joined {
                Ok((index, Ok(details))) => {
                    slots[index] = Some(details);
                    continue;
                }
                Ok((_, Err(e))) => e,
                Err(e) => SchemaError::Internal(format!("table task failed: {}", e)),
            };
            if first_error.is_none() {
                debug!("{}: aborting snapshot: {}", db, outcome);
                cancel.cancel();
                first_error = Some(outcome);
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| SchemaError::Internal("table task produced no result".to_string())))
            .collect()
    }
}

async fn table_details(
    collector: &MetadataCollector,
    db: &str,
    table: &str,
    kind: TableKind,
) -> SchemaResult<TableDetails> {
    let ((fields, columns), schema) = tokio::try_join!(
        collector.columns(db, table),
        collector.canonical_schema(db, table, kind)
    )?;
    debug!("{}.{}: {} columns", db, table, columns.len());
    Ok(TableDetails { fields, columns, schema })
}

fn table_definition(listing: TableListing) -> TableDefinition {
    TableDefinition {
        name: listing.name,
        kind: listing.kind,
        data_length: listing.data_length,
        row_count: listing.row_count,
        primary_key_columns: Vec::new(),
        columns: Vec::new(),
        fields: Vec::new(),
        schema: String::new(),
    }
}
