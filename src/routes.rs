//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod schema;

use crate::config::ServerConfig;
use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::{limit::GlobalConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, server: &ServerConfig) -> Router {
    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(GlobalConcurrencyLimitLayer::new(server.max_concurrent_requests))
        .propagate_x_request_id();

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Snapshot routes
        .route("/schema/{db}/snapshot", post(schema::snapshot))
        .route("/schema/{db}/resolve", post(schema::resolve))
        .route("/schema/{db}/tables/{table}/columns", get(schema::columns))
        .route("/schema/{db}/tables/{table}/primary-key", get(schema::primary_key))

        // Schema change routes
        .route("/schema/{db}/preflight", post(schema::preflight))
        .route("/schema/{db}/apply", post(schema::apply))

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
