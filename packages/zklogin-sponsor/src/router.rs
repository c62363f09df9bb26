//! HTTP router setup.

use crate::handlers;
use crate::middleware;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/execute", post(handlers::execute))
        .route("/sponsor/execute", post(handlers::execute_as_sponsor))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/login", get(handlers::login))
        .route("/callback", get(handlers::callback_page).post(handlers::callback))
        .route("/sponsor", get(handlers::sponsor))
        .merge(protected)
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
