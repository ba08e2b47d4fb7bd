//! Durable Document Store
//!
//! The store is the single source of truth for snapshots and operation
//! logs, and the only place a document's version changes. Every commit is a
//! per-document compare-and-set on the version: a commit whose op was built
//! against anything but the current version fails with
//! `StoreError::VersionConflict` and the caller rebases and retries.
//!
//! # Implementations
//!
//! - **`memory`** - `MemoryStore`, in-process maps (tests, local runs)
//! - **`postgres`** - `PgStore`, `sqlx` over PostgreSQL with JSONB payloads
//!
//! # Queries
//!
//! `DocQuery` filters existing documents of one collection by JSON path
//! presence or equality. The session layer uses it to find every project
//! whose `userRoles` contains a user; migrations use it to page through a
//! collection.

/// In-memory store
pub mod memory;

/// PostgreSQL store
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::shared::document::{CommittedOp, DocKey, Snapshot};
use crate::shared::ot::json0;
use crate::shared::path_template::Path;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document moved past the op's base version
    #[error("Version conflict on {key}: expected version {expected}")]
    VersionConflict { key: String, expected: u64 },

    /// A stored record could not be decoded
    #[error("Corrupt record: {message}")]
    Corrupt { message: String },

    /// The store cannot be reached
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Commit flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Also store the resulting snapshot as a milestone
    pub save_milestone: bool,
}

/// One query predicate over document data
#[derive(Debug, Clone, PartialEq)]
pub enum DocFilter {
    /// Path resolves to any value
    Exists(Path),
    /// Path resolves to exactly this value
    Eq(Path, Value),
}

impl DocFilter {
    fn matches(&self, data: &Value) -> bool {
        match self {
            DocFilter::Exists(path) => json0::get(data, path).is_some(),
            DocFilter::Eq(path, expected) => json0::get(data, path) == Some(expected),
        }
    }
}

/// Conjunction of filters plus paging, ordered by document id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocQuery {
    pub filters: Vec<DocFilter>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl DocQuery {
    /// Every existing document
    pub fn all() -> Self {
        Self::default()
    }

    pub fn exists(mut self, path: Path) -> Self {
        self.filters.push(DocFilter::Exists(path));
        self
    }

    pub fn eq(mut self, path: Path, value: Value) -> Self {
        self.filters.push(DocFilter::Eq(path, value));
        self
    }

    pub fn page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }

    /// Evaluate the filters against document data
    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(data))
    }
}

/// Durable document storage with per-document compare-and-set commits
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Current snapshot; version 0 with no type when never created
    async fn get_snapshot(&self, key: &DocKey) -> StoreResult<Snapshot>;

    /// Committed ops with `from <= version < to` (`to = None` reads to the end)
    async fn get_ops(&self, key: &DocKey, from: u64, to: Option<u64>) -> StoreResult<Vec<CommittedOp>>;

    /// Append `op` and replace the snapshot, if the document is still at `op.version`
    async fn commit(&self, key: &DocKey, op: &CommittedOp, snapshot: &Snapshot, options: CommitOptions)
        -> StoreResult<()>;

    /// Latest milestone snapshot at or below `version`
    async fn get_milestone(&self, key: &DocKey, version: u64) -> StoreResult<Option<Snapshot>>;

    /// Existing documents of a collection matching the query
    async fn query(&self, collection: &str, query: &DocQuery) -> StoreResult<Vec<Snapshot>>;

    /// Schema version recorded for a collection (0 when never migrated)
    async fn get_schema_version(&self, collection: &str) -> StoreResult<u32>;

    async fn set_schema_version(&self, collection: &str, version: u32) -> StoreResult<()>;
}
