/**
 * In-Memory Store
 *
 * `MemoryStore` keeps every document's snapshot, op log and milestones in
 * a map behind one `tokio::sync::RwLock`. Commits take the write lock, so
 * the version compare-and-set is atomic. Used by tests and by servers run
 * without `DATABASE_URL`.
 */

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::backend::store::{CommitOptions, DocQuery, DocStore, StoreError, StoreResult};
use crate::shared::document::{CommittedOp, DocKey, Snapshot};

#[derive(Debug, Default)]
struct DocRecord {
    snapshot: Option<Snapshot>,
    ops: Vec<CommittedOp>,
    milestones: BTreeMap<u64, Snapshot>,
}

/// Process-local document store
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<DocKey, DocRecord>>,
    schema_versions: RwLock<HashMap<String, u32>>,
    query_count: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `query` calls served so far
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    /// Make every call fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("memory store switched off"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn get_snapshot(&self, key: &DocKey) -> StoreResult<Snapshot> {
        self.check_available()?;
        let docs = self.docs.read().await;
        Ok(docs
            .get(key)
            .and_then(|record| record.snapshot.clone())
            .unwrap_or_else(|| Snapshot::empty(key.id.clone())))
    }

    async fn get_ops(&self, key: &DocKey, from: u64, to: Option<u64>) -> StoreResult<Vec<CommittedOp>> {
        self.check_available()?;
        let docs = self.docs.read().await;
        let ops = match docs.get(key) {
            Some(record) => record
                .ops
                .iter()
                .filter(|op| op.version >= from && to.map_or(true, |to| op.version < to))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(ops)
    }

    async fn commit(
        &self,
        key: &DocKey,
        op: &CommittedOp,
        snapshot: &Snapshot,
        options: CommitOptions,
    ) -> StoreResult<()> {
        self.check_available()?;
        let mut docs = self.docs.write().await;
        let record = docs.entry(key.clone()).or_default();
        let current = record.snapshot.as_ref().map_or(0, |s| s.version);
        if current != op.version || snapshot.version != op.version + 1 {
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected: op.version,
            });
        }
        record.ops.push(op.clone());
        record.snapshot = Some(snapshot.clone());
        if options.save_milestone {
            record.milestones.insert(snapshot.version, snapshot.clone());
        }
        Ok(())
    }

    async fn get_milestone(&self, key: &DocKey, version: u64) -> StoreResult<Option<Snapshot>> {
        self.check_available()?;
        let docs = self.docs.read().await;
        Ok(docs
            .get(key)
            .and_then(|record| record.milestones.range(..=version).next_back())
            .map(|(_, snapshot)| snapshot.clone()))
    }

    async fn query(&self, collection: &str, query: &DocQuery) -> StoreResult<Vec<Snapshot>> {
        self.check_available()?;
        self.query_count.fetch_add(1, Ordering::SeqCst);
        let docs = self.docs.read().await;
        let mut matches: Vec<Snapshot> = docs
            .iter()
            .filter(|(key, _)| key.collection == collection)
            .filter_map(|(_, record)| record.snapshot.as_ref())
            .filter(|snapshot| snapshot.exists())
            .filter(|snapshot| snapshot.data.as_ref().map_or(false, |data| query.matches(data)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matches.into_iter().skip(query.skip).take(limit).collect())
    }

    async fn get_schema_version(&self, collection: &str) -> StoreResult<u32> {
        self.check_available()?;
        Ok(self.schema_versions.read().await.get(collection).copied().unwrap_or(0))
    }

    async fn set_schema_version(&self, collection: &str, version: u32) -> StoreResult<()> {
        self.check_available()?;
        self.schema_versions.write().await.insert(collection.to_string(), version);
        Ok(())
    }
}
