//! Integration tests
//!
//! End-to-end flows through `SyncBackend`, the handshake and the WebSocket route.

pub mod access_scenarios_test;
pub mod convergence_test;
pub mod handshake_test;
pub mod migration_test;
pub mod websocket_test;
