//! Error handling module
//!
//! Provides the error taxonomy shared by the snapshot engine, the migration
//! validator and the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Schema-management error type
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Pool exhaustion or a connection that could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed SQL or a server-side failure during introspection.
    #[error("Query error: {0}")]
    Query(String),

    /// A database or table vanished between listing and detail fetch.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid include/exclude configuration.
    #[error("Invalid table filter: {0}")]
    Filter(String),

    /// Live schema differs from the expected before-state.
    #[error("BeforeSchema differs: {}", .differences.join("; "))]
    PreconditionMismatch { differences: Vec<String> },

    /// Schema after the change differs from the expected after-state.
    #[error("AfterSchema differs: {}", .differences.join("; "))]
    PostconditionMismatch { differences: Vec<String> },

    /// The script executor failed to run a DDL/admin script.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Request payload failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Work abandoned because a sibling task failed first.
    #[error("Cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// ER_NO_SUCH_TABLE
const NO_SUCH_TABLE: u16 = 1146;

impl From<mysql_async::Error> for SchemaError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(e) if e.code == NO_SUCH_TABLE => SchemaError::NotFound(e.message),
            mysql_async::Error::Server(e) => SchemaError::Query(format!("ERROR {} ({}): {}", e.code, e.state, e.message)),
            mysql_async::Error::Io(e) => SchemaError::Connection(e.to_string()),
            mysql_async::Error::Driver(e) => SchemaError::Connection(e.to_string()),
            other => SchemaError::Query(other.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub differences: Vec<String>,
}

impl IntoResponse for SchemaError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            SchemaError::Connection(_) => (StatusCode::SERVICE_UNAVAILABLE, "CONNECTION_ERROR"),
            SchemaError::Query(_) => (StatusCode::INTERNAL_SERVER_ERROR, "QUERY_ERROR"),
            SchemaError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            SchemaError::Filter(_) => (StatusCode::BAD_REQUEST, "FILTER_ERROR"),
            SchemaError::PreconditionMismatch { .. } => (StatusCode::CONFLICT, "PRECONDITION_MISMATCH"),
            SchemaError::PostconditionMismatch { .. } => (StatusCode::CONFLICT, "POSTCONDITION_MISMATCH"),
            SchemaError::Execution(_) => (StatusCode::UNPROCESSABLE_ENTITY, "EXECUTION_ERROR"),
            SchemaError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            SchemaError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            SchemaError::Cancelled => (StatusCode::INTERNAL_SERVER_ERROR, "CANCELLED"),
            SchemaError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            SchemaError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            error!("{}", self);
        }

        let differences = match &self {
            SchemaError::PreconditionMismatch { differences }
            | SchemaError::PostconditionMismatch { differences } => differences.clone(),
            _ => Vec::new(),
        };

        let body = Json(ErrorResponse {
            success: false,
            message: self.to_string(),
            code: Some(error_code.to_string()),
            differences,
        });

        (status, body).into_response()
    }
}

/// Result type alias used across the crate
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> SchemaError {
    SchemaError::NotFound(msg.into())
}

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> SchemaError {
    SchemaError::Validation(msg.into())
}

/// Helper function to create a query error
pub fn query_error(msg: impl Into<String>) -> SchemaError {
    SchemaError::Query(msg.into())
}
