/**
 * Application State Management
 *
 * This module defines the application state structure and implements
 * the necessary `FromRef` traits for Axum state extraction.
 *
 * # Architecture
 *
 * The `AppState` struct is the central state container of the server:
 * - `SyncBackend` (store, rules, pub/sub, connection registry)
 * - `ConnectManager` (handshake authentication)
 * - The loaded configuration
 *
 * Every field is cheap to clone; clones share the same inner state.
 *
 * # Example
 *
 * ```rust,no_run
 * use docsync::backend::server::state::AppState;
 * use axum::extract::State;
 *
 * async fn handler(State(state): State<AppState>) -> String {
 *     state.backend.connection_count().to_string()
 * }
 * ```
 */

use axum::extract::FromRef;
use std::sync::Arc;

use crate::backend::auth::ConnectManager;
use crate::backend::sync::SyncBackend;
use crate::shared::SyncConfig;

/// Shared state of the HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    /// Submit pipeline and connection registry
    pub backend: SyncBackend,

    /// Handshake authentication (token verification, loopback trust)
    pub connect: Arc<ConnectManager>,

    /// Configuration the server was started with
    pub config: Arc<SyncConfig>,
}

impl AppState {
    pub fn new(backend: SyncBackend, connect: ConnectManager) -> Self {
        let config = Arc::new(backend.config().clone());
        Self {
            backend,
            connect: Arc::new(connect),
            config,
        }
    }
}

impl FromRef<AppState> for SyncBackend {
    fn from_ref(state: &AppState) -> Self {
        state.backend.clone()
    }
}

impl FromRef<AppState> for Arc<ConnectManager> {
    fn from_ref(state: &AppState) -> Self {
        state.connect.clone()
    }
}

impl FromRef<AppState> for Arc<SyncConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
