//! HTTP router

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::handler::{AuthzHandler, health_handler, protected_handler};

/// Create the router
pub fn create_router(handler: Arc<AuthzHandler>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/protected", get(protected_handler))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}
