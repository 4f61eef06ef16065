//! schema-guard - Schema snapshot and migration validation service
//!
//! Captures canonical, comparable snapshots of a database's tables and views,
//! simulates DDL in a disposable shadow database, and applies changes guarded
//! by expected before/after schemas.

use schema_guard::config::Settings;
use schema_guard::executor::CliScriptRunner;
use schema_guard::pool::MysqlPool;
use schema_guard::routes::create_router;
use schema_guard::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting schema-guard...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Administrative connection pool - REQUIRED
    let pool = MysqlPool::connect(&settings.database)?;
    if let Err(e) = pool.ping().await {
        error!("❌ FATAL: database at {}:{} is not reachable: {}", settings.database.host, settings.database.port, e);
        return Err(e.into());
    }
    info!("✅ Database connection successful (TLS: {})", settings.database.require_tls);

    let runner = CliScriptRunner::new(&settings.script, &settings.database);
    info!("🛠️  Schema scripts run through {}", settings.script.program);

    let state = Arc::new(AppState::new(
        Arc::new(pool.clone()),
        Arc::new(runner),
        settings.validator.clone(),
    ));
    let shutdown = state.shutdown.clone();

    // Build the router
    let app = create_router(state, &settings.server);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   GET  /health                                 - Liveness");
    info!("   POST /schema/{{db}}/snapshot                   - Canonical schema snapshot");
    info!("   POST /schema/{{db}}/resolve                    - Expand table names/patterns");
    info!("   GET  /schema/{{db}}/tables/{{table}}/columns     - Column descriptors");
    info!("   GET  /schema/{{db}}/tables/{{table}}/primary-key - Primary key columns");
    info!("   POST /schema/{{db}}/preflight                  - Simulate changes in a shadow database");
    info!("   POST /schema/{{db}}/apply                      - Apply a guarded schema change");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    if let Err(e) = pool.disconnect().await {
        error!("Failed to close database connections: {}", e);
    }
    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schema_guard=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Wait for Ctrl+C or SIGTERM, then cancel in-flight schema work.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }

    shutdown.cancel();
}
