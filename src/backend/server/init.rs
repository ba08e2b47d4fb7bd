/**
 * Server Initialization
 *
 * This module handles the initialization and setup of the Axum HTTP server,
 * including store selection, backend construction and route configuration.
 *
 * # Initialization Process
 *
 * 1. Open the document store (PostgreSQL or in-memory)
 * 2. Build the `SyncBackend` (rules, hooks, migrations)
 * 3. Build the `ConnectManager` with a role loader over the projects collection
 * 4. Run pending schema migrations when enabled
 * 5. Start the resource monitor and the pub/sub channel cleanup
 * 6. Create the router
 */

use axum::Router;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::auth::{ConnectManager, StoreRoleLoader};
use crate::backend::error::BackendResult;
use crate::backend::monitor::ResourceMonitor;
use crate::backend::routes::router::create_router;
use crate::backend::server::config::load_store;
use crate::backend::server::state::AppState;
use crate::backend::sync::{migrate_if_necessary, SyncBackend, SyncBackendBuilder};
use crate::shared::config::RuleKind;
use crate::shared::SyncConfig;

/// Collection holding project documents when none is configured with project rules
pub const DEFAULT_PROJECTS_COLLECTION: &str = "projects";

/// Create and configure the Axum application
///
/// # Arguments
///
/// * `config` - Validated configuration
///
/// # Returns
///
/// Router serving `/health` and `/ws`. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`; the WebSocket
/// handler needs the peer address.
///
/// # Errors
///
/// Fails when the store cannot be opened, the JWKS configuration is
/// invalid, or a migration fails.
pub async fn create_app(config: SyncConfig) -> BackendResult<Router> {
    tracing::info!("Initializing docsync backend");
    let store = load_store(&config).await?;
    create_app_with(SyncBackend::builder(config, store)).await
}

/// Create the application from a prepared backend builder
///
/// Embedders use this to register hooks, migrations and custom rules.
pub async fn create_app_with(builder: SyncBackendBuilder) -> BackendResult<Router> {
    let state = build_state(builder).await?;
    start_background_tasks(&state);

    let app = create_router(state);
    tracing::info!("Router configured with monitor and cleanup tasks");
    Ok(app)
}

/// Build the application state and run pending migrations
pub async fn build_state(builder: SyncBackendBuilder) -> BackendResult<AppState> {
    let backend = builder.build()?;
    let config = backend.config();

    let projects = config
        .collections
        .iter()
        .find(|c| c.rules == Some(RuleKind::Projects))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| DEFAULT_PROJECTS_COLLECTION.to_string());
    let loader = Arc::new(StoreRoleLoader::new(backend.store(), projects));
    let connect = ConnectManager::new(config, loader)?;

    if config.sync.migrations_enabled {
        migrate_if_necessary(&backend).await?;
    } else {
        tracing::info!("Schema migrations disabled");
    }

    tracing::info!(
        "Backend ready: {} collections, {} projections, {} roles",
        config.collections.len(),
        config.projections.len(),
        config.roles.len()
    );
    Ok(AppState::new(backend, connect))
}

/// Start the resource monitor and the periodic pub/sub channel cleanup
fn start_background_tasks(state: &AppState) {
    let server = &state.config.server;

    if server.monitor_interval_secs > 0 {
        ResourceMonitor::new(state.backend.clone()).spawn(Duration::from_secs(server.monitor_interval_secs));
    }

    if server.channel_cleanup_interval_secs > 0 {
        let backend = state.backend.clone();
        let period = Duration::from_secs(server.channel_cleanup_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = backend.cleanup();
                tracing::debug!("Cleaned up {} inactive document channels", removed);
            }
        });
    }
}
