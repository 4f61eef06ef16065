//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::collector::MetadataCollector;
use crate::config::ValidatorConfig;
use crate::executor::ScriptRunner;
use crate::pool::DbaPool;
use crate::snapshot::SchemaSnapshotter;
use crate::validator::SchemaChangeValidator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application state shared across all handlers
pub struct AppState {
    pub snapshotter: SchemaSnapshotter,
    pub validator: SchemaChangeValidator,

    /// Cancelled on shutdown; every request works under a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pool: Arc<dyn DbaPool>, runner: Arc<dyn ScriptRunner>, config: ValidatorConfig) -> Self {
        let snapshotter = SchemaSnapshotter::new(MetadataCollector::new(pool));
        let validator = SchemaChangeValidator::new(snapshotter.clone(), runner, config);

        Self {
            snapshotter,
            validator,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token for one request's work
    pub fn request_context(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
