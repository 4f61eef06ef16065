//! Schema route handlers
//!
//! Snapshot, resolve and inspect a database, and validate or apply schema
//! changes against it.

use crate::error::{validation_error, SchemaResult};
use crate::model::{Field, SchemaChange, SchemaChangeResult, SchemaDefinition};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::{Validate, ValidationError};

// ==================== Request/Response Types ====================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    /// Names or `/regex/` patterns; empty means every table
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    #[serde(default)]
    pub include_views: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    #[validate(length(min = 1, message = "At least one table name or pattern is required"))]
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnsResponse {
    pub fields: Vec<Field>,
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyResponse {
    pub columns: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreflightRequest {
    #[validate(
        length(min = 1, message = "At least one change is required"),
        custom(function = "validate_statements")
    )]
    pub changes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    #[validate(length(min = 1, message = "SQL is required"))]
    pub sql: String,
    #[serde(default)]
    pub before_schema: Option<SchemaDefinition>,
    #[serde(default)]
    pub after_schema: Option<SchemaDefinition>,
    #[serde(default)]
    pub allow_replication: bool,
    #[serde(default)]
    pub force: bool,
}

impl From<ApplyRequest> for SchemaChange {
    fn from(req: ApplyRequest) -> Self {
        SchemaChange {
            sql: req.sql,
            before_schema: req.before_schema,
            after_schema: req.after_schema,
            allow_replication: req.allow_replication,
            force: req.force,
        }
    }
}

/// Every change must carry some SQL
fn validate_statements(changes: &[String]) -> Result<(), ValidationError> {
    if changes.iter().any(|c| c.trim().is_empty()) {
        let mut err = ValidationError::new("blank_statement");
        err.message = Some("Changes must not be blank".into());
        return Err(err);
    }
    Ok(())
}

// ==================== Handlers ====================

/// Snapshot a database
pub async fn snapshot(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Json(payload): Json<SnapshotRequest>,
) -> SchemaResult<Json<SchemaDefinition>> {
    debug!("Snapshot of {} requested ({} include, {} exclude)", db, payload.tables.len(), payload.exclude_tables.len());

    let ctx = state.request_context();
    let schema = state
        .snapshotter
        .snapshot_matching(&ctx, &db, &payload.tables, &payload.exclude_tables, payload.include_views)
        .await?;

    Ok(Json(schema))
}

/// Expand table names and patterns
pub async fn resolve(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Json(payload): Json<ResolveRequest>,
) -> SchemaResult<Json<ResolveResponse>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let ctx = state.request_context();
    let tables = state.snapshotter.resolve_tables(&ctx, &db, &payload.tables).await?;

    Ok(Json(ResolveResponse { tables }))
}

pub async fn columns(
    State(state): State<SharedState>,
    Path((db, table)): Path<(String, String)>,
) -> SchemaResult<Json<ColumnsResponse>> {
    let (fields, columns) = state.snapshotter.columns_of(&db, &table).await?;
    Ok(Json(ColumnsResponse { fields, columns }))
}

pub async fn primary_key(
    State(state): State<SharedState>,
    Path((db, table)): Path<(String, String)>,
) -> SchemaResult<Json<PrimaryKeyResponse>> {
    let columns = state.snapshotter.primary_key_columns_of(&db, &table).await?;
    Ok(Json(PrimaryKeyResponse { columns }))
}

/// Simulate changes in a shadow copy of the database
pub async fn preflight(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Json(payload): Json<PreflightRequest>,
) -> SchemaResult<Json<Vec<SchemaChangeResult>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let ctx = state.request_context();
    let results = state.validator.preflight(&ctx, &db, &payload.changes).await?;

    info!("Preflight of {} change(s) on {} succeeded", results.len(), db);
    Ok(Json(results))
}

/// Apply a change to the live database
pub async fn apply(
    State(state): State<SharedState>,
    Path(db): Path<String>,
    Json(payload): Json<ApplyRequest>,
) -> SchemaResult<Json<SchemaChangeResult>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let ctx = state.request_context();
    let change = SchemaChange::from(payload);
    let result = state.validator.apply(&ctx, &db, &change).await?;

    Ok(Json(result))
}
