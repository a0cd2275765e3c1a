//! Route configuration for the debug API.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::backend::DebugBackend;
use crate::handlers::{debug_handler, metrics_handler};

/// Shared state behind every route.
#[derive(Clone)]
pub struct RpcState {
    pub backend: Arc<dyn DebugBackend>,
    /// Basic-auth user and password; `None` disables auth.
    pub credentials: Option<(String, String)>,
    /// Served on `/metrics` when set.
    pub registry: Option<prometheus::Registry>,
}

pub fn create_router(state: RpcState) -> Router {
    Router::new()
        .route("/debug", post(debug_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
