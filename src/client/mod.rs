//! Document Adapters
//!
//! A document adapter is the application-facing handle on one
//! `(collection, id)`. Local edits are applied optimistically and show up
//! immediately in `snapshot()`; the adapter reconciles them with the ops
//! other clients commit.
//!
//! # Implementations
//!
//! - **`memory`** - `MemoryDoc`, no network; ops apply synchronously and
//!   events fire in call order. Used by tests and offline tools.
//! - **`remote`** - `RealtimeDoc` over a backend `Connection` (`ssr`).
//!   One op is in flight at a time; later local ops queue behind it and
//!   are transformed against every remote op that arrives first.
//!
//! # Events
//!
//! `events()` returns a `tokio::sync::broadcast` receiver of `DocEvent`s:
//! local and remote changes, document creation and deletion, and `Idle`
//! whenever no local op awaits acknowledgement.
//!
//! # Failures
//!
//! A rejected op fails the `submit_op` call that queued it, along with
//! every op queued behind it, and the adapter reloads the server's
//! snapshot. A failure never closes the adapter.

/// In-memory adapter
pub mod memory;

/// Realtime adapter over a backend connection
#[cfg(feature = "ssr")]
pub mod remote;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::shared::document::{DocKey, Snapshot};
use crate::shared::ot::{DocOp, OtType};
use crate::shared::SharedError;

pub use memory::MemoryDoc;
#[cfg(feature = "ssr")]
pub use remote::RealtimeDoc;

/// Capacity of an adapter's event channel
pub const EVENT_CAPACITY: usize = 256;

/// Something that happened to an adapter's document
#[derive(Debug, Clone, PartialEq)]
pub enum DocEvent {
    /// A local op was applied to the local view
    LocalChange { op: DocOp, source: Option<String> },
    /// An op committed by another client was applied
    RemoteChange { op: DocOp, source: String },
    Create,
    Delete,
    /// No local op awaits acknowledgement
    Idle,
}

/// Adapter failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    /// The server refused the request
    #[error("Rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    /// The op does not apply to the local document
    #[error(transparent)]
    Shared(#[from] SharedError),

    /// The adapter was destroyed
    #[error("Adapter closed")]
    Closed,

    /// Ops are only accepted while a subscription delivers the server's commits
    #[error("Adapter is not subscribed")]
    NotSubscribed,

    /// The request needs an adapter without unacknowledged ops
    #[error("{count} local ops are not acknowledged yet")]
    PendingOps { count: usize },
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Application-facing handle on one document
#[async_trait]
pub trait DocumentAdapter: Send + Sync {
    fn key(&self) -> &DocKey;

    /// Local view, including unacknowledged local ops
    fn snapshot(&self) -> Snapshot;

    /// Local ops sent or queued but not acknowledged, in submission order
    fn pending_ops(&self) -> Vec<DocOp>;

    fn events(&self) -> broadcast::Receiver<DocEvent>;

    /// Load the server's snapshot
    async fn fetch(&self) -> AdapterResult<Snapshot>;

    /// Load the snapshot and start applying remote ops
    async fn subscribe(&self) -> AdapterResult<Snapshot>;

    /// Apply an edit locally and commit it; resolves once acknowledged
    async fn submit_op(&self, op: DocOp, source: Option<String>) -> AdapterResult<()>;

    async fn create(&self, ot_type: OtType, data: serde_json::Value) -> AdapterResult<()>;

    async fn delete(&self) -> AdapterResult<()>;

    /// Replace the local view with a snapshot obtained elsewhere
    ///
    /// Older snapshots are ignored. Fails while local ops are pending.
    fn ingest_snapshot(&self, snapshot: Snapshot) -> AdapterResult<()>;

    /// Resolves when no local op awaits acknowledgement
    async fn idle(&self);

    /// Stop receiving remote ops and fail everything still pending
    async fn destroy(&self);
}
