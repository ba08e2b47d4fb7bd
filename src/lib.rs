// Increase recursion limit for complex async operations
#![recursion_limit = "256"]

//! docsync - Realtime Document Sync Engine
//!
//! docsync lets many clients edit shared structured documents at the same
//! time. Edits are operational-transform operations (JSON0 or rich-text
//! deltas). Every edit is authorized against a per-path, per-role rights
//! model before it is committed and broadcast.
//!
//! # Module Structure
//!
//! - **`shared`** - Types and algorithms shared by every part of the crate
//!   - Rights model, path templates, OT types
//!   - Snapshots, operations, wire protocol, configuration
//!   - Error types
//!
//! - **`backend`** - Server-side code (only compiled with `ssr` feature)
//!   - Axum WebSocket server and health route
//!   - JWT/JWKS authentication and per-connection sessions
//!   - Access control rules, durable store, submit pipeline
//!   - Pub/sub fan-out of committed operations
//!
//! - **`client`** - Document adapters
//!   - In-memory adapter for tests
//!   - Realtime adapter over a backend connection (`ssr`)
//!
//! # Feature Flags
//!
//! - **`ssr`** (default) - enables the backend and the realtime adapter
//!
//! # Usage
//!
//! ```rust,no_run
//! use docsync::backend::server::init::create_app;
//! use docsync::shared::SyncConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::load()?;
//! let app = create_app(config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - Configuration, rights tables and templates are read-only after startup
//! - Per-document submits are serialized by the store's version compare-and-set
//! - Per-connection role caches are owned by their connection
//!
//! # Error Handling
//!
//! - `shared::error::SharedError` for parse/apply/config failures
//! - `backend::error::BackendError` for everything reported to clients

/// Shared types and algorithms
pub mod shared;

/// Backend server-side code
#[cfg(feature = "ssr")]
pub mod backend;

/// Document adapters
pub mod client;
