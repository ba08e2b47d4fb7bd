/**
 * Router Configuration
 *
 * This module provides the router creation function that combines every
 * route into a single Axum router.
 *
 * # Routes
 *
 * - `GET /health` - liveness and resource counts
 * - `GET /ws` - WebSocket upgrade for the sync protocol
 *
 * Every request is traced with `tower_http::trace::TraceLayer`. Unknown
 * paths fall through to a plain 404.
 */

use axum::{http::StatusCode, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::backend::realtime::ws_handler;
use crate::backend::routes::health::health;
use crate::backend::server::state::AppState;

/// Create the Axum router with all routes configured
///
/// # Arguments
///
/// * `app_state` - Application state (backend, connect manager, config)
///
/// # Returns
///
/// Configured Axum Router ready to serve requests
pub fn create_router(app_state: AppState) -> Router<()> {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .fallback(|| async { (StatusCode::NOT_FOUND, "404 Not Found") })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state)
}
