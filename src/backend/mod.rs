//! Backend Module
//!
//! This module contains all server-side code of the sync engine: the Axum
//! server, handshake authentication, the access rule engine, the durable
//! store and the submit pipeline.
//!
//! This module is only compiled when the `ssr` feature is enabled.
//!
//! # Architecture
//!
//! - **`server`** - Server initialization, application state, store selection
//! - **`routes`** - HTTP route configuration and router assembly
//! - **`realtime`** - Per-document pub/sub and the WebSocket transport
//! - **`sync`** - `SyncBackend`, connections, subscriptions, wire agents,
//!   projections, milestones, hooks and migrations
//! - **`access`** - Per-collection rule predicates over the rights model
//! - **`auth`** - JWT/JWKS verification, sessions and project-role caches
//! - **`store`** - `DocStore` trait with in-memory and PostgreSQL stores
//! - **`monitor`** - Periodic resource diagnostics
//! - **`error`** - Backend-specific error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs      - Module exports and documentation
//! ├── main.rs     - Server binary
//! ├── monitor.rs  - Resource monitor
//! ├── server/     - Server initialization and state
//! ├── routes/     - Route configuration
//! ├── realtime/   - Pub/sub and WebSocket handler
//! ├── sync/       - Submit pipeline and connections
//! ├── access/     - Rule engine
//! ├── auth/       - Authentication and sessions
//! ├── store/      - Document stores
//! └── error/      - Error types
//! ```
//!
//! # Request Flow
//!
//! WebSocket frame → `Agent` parses a `ClientRequest` → `Connection` →
//! `SyncBackend` reads the snapshot → the collection's rules decide →
//! OT apply/transform → store compare-and-set commit → `PubSub` publishes
//! the committed op → each subscriber's forwarder writes it to its socket.
//!
//! # Thread Safety
//!
//! - `SyncBackend`, `PubSub` and `AppState` are cheap clones over `Arc`
//! - Registries use `std::sync::Mutex` held only for map updates
//! - Commits to one document are serialized by the store's version check;
//!   publish order follows commit order under a per-document async lock

/// Server setup and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Real-time transport
pub mod realtime;

/// Submit pipeline and connections
pub mod sync;

/// Access control rules
pub mod access;

/// Authentication and sessions
pub mod auth;

/// Document stores
pub mod store;

/// Resource monitor
pub mod monitor;

/// Backend error types
pub mod error;

pub use error::{BackendError, BackendResult};
pub use server::create_app;
pub use sync::{Connection, SyncBackend};
