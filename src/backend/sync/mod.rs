//! Synchronization Backend
//!
//! This module owns the submit pipeline, the registry of logical
//! connections and the per-connection wire agents. It composes the store,
//! the access rules and the pub/sub layer.
//!
//! # Architecture
//!
//! - **`backend`** - `SyncBackend`: fetch, submit (rebase, authorize,
//!   commit, publish), connection registry, stats
//! - **`connection`** - `Connection` and `Subscription`, used by WebSocket
//!   agents, server-side jobs and document adapters alike
//! - **`agent`** - wire protocol handling for one WebSocket peer
//! - **`projections`** - field-whitelist read models
//! - **`milestones`** - snapshots at past versions
//! - **`hooks`** - entity insert/update/delete callbacks after commit
//! - **`migrations`** - per-collection schema migrations
//!
//! # Ordering
//!
//! Commits to one document are serialized by the store's version
//! compare-and-set. A submit that loses the race rebases over the ops it
//! missed and tries again, a bounded number of times. Committed ops are
//! published in commit order.

/// SyncBackend and the submit pipeline
pub mod backend;

/// Logical connections and subscriptions
pub mod connection;

/// WebSocket protocol agent
pub mod agent;

/// Read-model projections
pub mod projections;

/// Past-version snapshots
pub mod milestones;

/// Entity hooks
pub mod hooks;

/// Schema migrations
pub mod migrations;

pub use agent::Agent;
pub use backend::{BackendStats, ConnectionInfo, SubmitRequest, SyncBackend, SyncBackendBuilder};
pub use connection::{Connection, ConnectionState, Subscription};
pub use hooks::{EntityChange, EntityHooks};
pub use migrations::{migrate_if_necessary, Migration, MigrationRegistry};
