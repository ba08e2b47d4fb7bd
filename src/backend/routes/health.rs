/**
 * Health Route
 *
 * `GET /health` reports liveness plus the backend's current resource
 * counts. It performs no store access.
 */

use axum::{extract::State, Json};
use serde::Serialize;

use crate::backend::sync::SyncBackend;
use crate::shared::protocol::PROTOCOL_VERSION;

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub protocol: u32,
    pub connections: usize,
    pub subscriptions: usize,
    pub channels: usize,
}

/// Handle `GET /health`
pub async fn health(State(backend): State<SyncBackend>) -> Json<HealthStatus> {
    let stats = backend.stats();
    Json(HealthStatus {
        status: "ok",
        protocol: PROTOCOL_VERSION,
        connections: stats.connections,
        subscriptions: stats.subscriptions,
        channels: stats.channels,
    })
}
