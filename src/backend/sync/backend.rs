/**
 * Synchronization Backend
 *
 * `SyncBackend` binds the store, the rule engine and the pub/sub layer, and
 * keeps the registry of logical connections. It is cheap to clone; every
 * clone shares one inner state.
 *
 * # Submit Pipeline
 *
 * 1. Load the current snapshot; a base version ahead of it is a protocol error
 * 2. Read the ops committed since the base; a matching `(src, seq)` means the
 *    op already committed and is acknowledged again without re-applying
 * 3. Rebase the op over those ops (OT transform, or the migration's
 *    `migrate_op` for ops written by a migration)
 * 4. Apply, then run the rule predicate for create, update or delete
 * 5. Commit with a version compare-and-set; a conflict restarts from 1,
 *    up to `max_submit_retries` attempts
 * 6. Publish the committed op while still holding the document's commit
 *    lock, then fire entity hooks
 *
 * Subscribers only ever see the committed (rebased) op, never the request.
 */

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::access::{AccessControl, CollectionRules, DomainClassifier};
use crate::backend::auth::ConnectSession;
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::realtime::broadcast::{OpEvent, PubSub};
use crate::backend::store::{CommitOptions, DocStore};
use crate::backend::sync::hooks::{self, EntityHooks};
use crate::backend::sync::migrations::{Migration, MigrationRegistry};
use crate::backend::sync::{milestones, projections, Connection};
use crate::shared::config::{ProjectionConfig, SyncConfig};
use crate::shared::document::{CommittedOp, DocKey, OpMetadata, OpPayload, RawOp, Snapshot};
use crate::shared::ot::Side;

/// One op submission
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub key: DocKey,
    /// Version the op was composed against
    pub base: u64,
    /// Submitting client id
    pub src: String,
    /// Client-local sequence number
    pub seq: u64,
    pub payload: OpPayload,
    /// Schema version, for ops written by a migration
    pub migration: Option<u32>,
}

/// Registry entry of a logical connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub client_id: String,
    pub user_id: Option<String>,
    pub trusted: bool,
    pub subscriptions: Arc<AtomicUsize>,
}

/// Point-in-time resource counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub connections: usize,
    pub subscriptions: usize,
    pub channels: usize,
    pub in_flight: usize,
}

struct BackendInner {
    config: Arc<SyncConfig>,
    store: Arc<dyn DocStore>,
    access: AccessControl,
    pubsub: PubSub,
    hooks: HashMap<String, Arc<dyn EntityHooks>>,
    classifiers: HashMap<String, DomainClassifier>,
    migrations: HashMap<String, MigrationRegistry>,
    connections: Mutex<HashMap<u64, ConnectionInfo>>,
    next_handle: AtomicU64,
    in_flight: AtomicUsize,
    doc_locks: Mutex<HashMap<DocKey, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Clone)]
pub struct SyncBackend {
    inner: Arc<BackendInner>,
}

/// Builder for SyncBackend
pub struct SyncBackendBuilder {
    config: SyncConfig,
    store: Arc<dyn DocStore>,
    rules: Vec<(String, Arc<dyn CollectionRules>)>,
    hooks: HashMap<String, Arc<dyn EntityHooks>>,
    migrations: HashMap<String, Vec<Arc<dyn Migration>>>,
}

impl SyncBackendBuilder {
    /// Replace the rule set of one collection
    pub fn rules(mut self, collection: impl Into<String>, rules: Arc<dyn CollectionRules>) -> Self {
        self.rules.push((collection.into(), rules));
        self
    }

    pub fn hooks(mut self, collection: impl Into<String>, hooks: Arc<dyn EntityHooks>) -> Self {
        self.hooks.insert(collection.into(), hooks);
        self
    }

    pub fn migration(mut self, collection: impl Into<String>, migration: Arc<dyn Migration>) -> Self {
        self.migrations.entry(collection.into()).or_default().push(migration);
        self
    }

    pub fn build(self) -> BackendResult<SyncBackend> {
        let mut access = AccessControl::from_config(&self.config);
        for (collection, rules) in self.rules {
            access = access.with_rules(collection, rules);
        }

        let mut migrations = HashMap::new();
        for (collection, list) in self.migrations {
            migrations.insert(collection, MigrationRegistry::new(list)?);
        }

        let classifiers = self
            .config
            .collections
            .iter()
            .map(|c| (c.name.clone(), DomainClassifier::from_collection(c)))
            .collect();

        let pubsub = PubSub::new(self.config.server.outbound_buffer);

        Ok(SyncBackend {
            inner: Arc::new(BackendInner {
                config: Arc::new(self.config),
                store: self.store,
                access,
                pubsub,
                hooks: self.hooks,
                classifiers,
                migrations,
                connections: Mutex::new(HashMap::new()),
                next_handle: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                doc_locks: Mutex::new(HashMap::new()),
            }),
        })
    }
}

/// Decrements the in-flight counter when a submit finishes
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SyncBackend {
    pub fn builder(config: SyncConfig, store: Arc<dyn DocStore>) -> SyncBackendBuilder {
        SyncBackendBuilder {
            config,
            store,
            rules: Vec::new(),
            hooks: HashMap::new(),
            migrations: HashMap::new(),
        }
    }

    /// Backend with configured rules and no hooks or migrations
    pub fn new(config: SyncConfig, store: Arc<dyn DocStore>) -> BackendResult<Self> {
        Self::builder(config, store).build()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn store(&self) -> Arc<dyn DocStore> {
        self.inner.store.clone()
    }

    pub fn pubsub(&self) -> &PubSub {
        &self.inner.pubsub
    }

    pub fn migrations(&self) -> &HashMap<String, MigrationRegistry> {
        &self.inner.migrations
    }

    /// In-process trusted connection, for jobs and server-side adapters
    pub fn connect(&self, user_id: Option<&str>) -> Connection {
        self.connect_as(ConnectSession::Trusted {
            user_id: user_id.map(str::to_string),
        })
    }

    /// In-process connection bound to an arbitrary session
    pub fn connect_as(&self, session: ConnectSession) -> Connection {
        let handle = self.inner.next_handle.fetch_add(1, Ordering::SeqCst);
        let client_id = uuid::Uuid::new_v4().to_string();
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let info = ConnectionInfo {
            client_id: client_id.clone(),
            user_id: session.user_id().map(str::to_string),
            trusted: session.is_trusted(),
            subscriptions: subscriptions.clone(),
        };
        self.inner
            .connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle, info);
        tracing::debug!("Registered connection {} ({})", handle, client_id);
        Connection::new(handle, client_id, session, self.clone(), subscriptions)
    }

    pub(crate) fn deregister(&self, handle: u64) {
        let removed = self
            .inner
            .connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle);
        if removed.is_some() {
            tracing::debug!("Deregistered connection {}", handle);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Registry snapshot keyed by connection handle
    pub fn connections(&self) -> Vec<(u64, ConnectionInfo)> {
        let connections = self.inner.connections.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = connections.iter().map(|(h, i)| (*h, i.clone())).collect();
        list.sort_by_key(|(handle, _)| *handle);
        list
    }

    pub fn stats(&self) -> BackendStats {
        let connections = self.connections();
        BackendStats {
            connections: connections.len(),
            subscriptions: connections
                .iter()
                .map(|(_, info)| info.subscriptions.load(Ordering::SeqCst))
                .sum(),
            channels: self.inner.pubsub.channel_count(),
            in_flight: self.inner.in_flight.load(Ordering::SeqCst),
        }
    }

    /// Drop idle pub/sub channels and document locks
    pub fn cleanup(&self) -> usize {
        let channels = self.inner.pubsub.cleanup_inactive_channels();
        let mut locks = self.inner.doc_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        channels
    }

    fn doc_lock(&self, key: &DocKey) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .doc_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.clone())
            .or_default()
            .clone()
    }

    pub(crate) fn projection(&self, name: &str) -> Option<&ProjectionConfig> {
        self.inner.config.projection(name)
    }

    /// Key holding the data a read of `key` returns (projections read their source)
    pub(crate) fn source_key(&self, key: &DocKey) -> DocKey {
        match self.projection(&key.collection) {
            Some(projection) => DocKey::new(projection.collection.clone(), key.id.clone()),
            None => key.clone(),
        }
    }

    /// Read a document, optionally at a past version
    pub async fn fetch(&self, session: &ConnectSession, key: &DocKey, version: Option<u64>) -> BackendResult<Snapshot> {
        let source = self.source_key(key);
        let snapshot = match version {
            Some(version) => milestones::snapshot_at(self.inner.store.as_ref(), &source, version).await?,
            None => self.inner.store.get_snapshot(&source).await?,
        };

        self.inner
            .access
            .check_read(&key.collection, &key.id, &snapshot, session)
            .await?;

        Ok(match self.projection(&key.collection) {
            Some(projection) => projections::project_snapshot(&snapshot, &projection.fields),
            None => snapshot,
        })
    }

    /// Read check for a snapshot already loaded
    pub(crate) async fn check_read(&self, session: &ConnectSession, key: &DocKey, snapshot: &Snapshot) -> BackendResult<()> {
        self.inner
            .access
            .check_read(&key.collection, &key.id, snapshot, session)
            .await
    }

    /// Parse a wire op body against the document's current type and submit it
    pub async fn submit_raw(
        &self,
        session: &ConnectSession,
        key: DocKey,
        base: u64,
        src: String,
        seq: u64,
        raw: RawOp,
    ) -> BackendResult<u64> {
        let doc_type = match raw.op {
            Some(_) => self.inner.store.get_snapshot(&self.source_key(&key)).await?.ot_type,
            None => None,
        };
        let payload = raw.into_payload(doc_type)?;
        self.submit(
            session,
            SubmitRequest {
                key,
                base,
                src,
                seq,
                payload,
                migration: None,
            },
        )
        .await
    }

    /// Commit an op; returns the version it was applied at
    pub async fn submit(&self, session: &ConnectSession, request: SubmitRequest) -> BackendResult<u64> {
        let _in_flight = InFlight::enter(&self.inner.in_flight);
        let key = &request.key;

        if self.projection(&key.collection).is_some() {
            return Err(BackendError::protocol(format!("{} is a read-only projection", key.collection)));
        }
        if let (OpPayload::Create { ot_type, .. }, Some(collection)) =
            (&request.payload, self.inner.config.collection(&key.collection))
        {
            if *ot_type != collection.ot_type {
                return Err(BackendError::protocol(format!(
                    "collection {} holds {} documents, not {}",
                    collection.name,
                    collection.ot_type.name(),
                    ot_type.name()
                )));
            }
        }

        let attempts = self.inner.config.sync.max_submit_retries.max(1);
        for attempt in 1..=attempts {
            // Held from load to publish
            let lock = self.doc_lock(key);
            let guard = lock.lock().await;
            let snapshot = self.inner.store.get_snapshot(key).await?;
            if request.base > snapshot.version {
                return Err(BackendError::protocol(format!(
                    "op base version {} is ahead of {} at version {}",
                    request.base, key, snapshot.version
                )));
            }

            let mut payload = request.payload.clone();
            if request.base < snapshot.version {
                let committed = self
                    .inner
                    .store
                    .get_ops(key, request.base, Some(snapshot.version))
                    .await?;

                if let Some(previous) = committed
                    .iter()
                    .find(|op| op.src == request.src && op.seq == request.seq)
                {
                    tracing::debug!(
                        "Op {}:{} on {} already committed at v{}",
                        request.src,
                        request.seq,
                        key,
                        previous.version
                    );
                    return Ok(previous.version);
                }

                for op in &committed {
                    payload = self.rebase(key, payload, op)?;
                }
            }

            let next = snapshot.apply(&payload)?;
            self.authorize(session, key, &snapshot, &next, &payload).await?;

            let op = CommittedOp {
                src: request.src.clone(),
                seq: request.seq,
                version: snapshot.version,
                payload,
                metadata: OpMetadata {
                    migration: request.migration,
                    ..OpMetadata::now(session.user_id().map(str::to_string))
                },
            };
            let options = CommitOptions {
                save_milestone: self
                    .inner
                    .config
                    .milestone_interval(&key.collection)
                    .filter(|interval| *interval > 0)
                    .map(|interval| next.version % interval == 0)
                    .unwrap_or(false),
            };

            match self.inner.store.commit(key, &op, &next, options).await {
                Ok(()) => {
                    let event: OpEvent = Arc::new(op);
                    self.inner.pubsub.publish(key, event.clone());
                    drop(guard);

                    tracing::debug!("Committed {}:{} on {} at v{}", event.src, event.seq, key, event.version);
                    self.run_hooks(key, &snapshot, &next, &event.payload).await;
                    return Ok(event.version);
                }
                Err(err) if err.is_conflict() => {
                    drop(guard);
                    tracing::debug!("Commit on {} lost the race (attempt {}/{})", key, attempt, attempts);
                }
                Err(err) => {
                    tracing::warn!("Commit on {} failed: {}", key, err);
                    return Err(err.into());
                }
            }
        }

        Err(BackendError::conflict(format!(
            "could not commit to {} after {} attempts",
            key, attempts
        )))
    }

    /// Rebase a pending payload over one committed op
    fn rebase(&self, key: &DocKey, payload: OpPayload, committed: &CommittedOp) -> BackendResult<OpPayload> {
        match (payload, &committed.payload) {
            (OpPayload::Edit(op), OpPayload::Edit(applied)) => {
                let migration = committed
                    .metadata
                    .migration
                    .and_then(|version| self.inner.migrations.get(&key.collection)?.get(version).cloned());
                match migration {
                    Some(migration) => {
                        let mut op = op;
                        migration.migrate_op(&mut op)?;
                        Ok(OpPayload::Edit(op))
                    }
                    None => Ok(OpPayload::Edit(op.transform(applied, Side::Left)?)),
                }
            }
            (OpPayload::Delete, OpPayload::Edit(_)) => Ok(OpPayload::Delete),
            (payload, _) => Err(BackendError::conflict(format!(
                "{} was {} since the op's base version",
                key,
                match (&payload, &committed.payload) {
                    (_, OpPayload::Create { .. }) => "created",
                    (_, OpPayload::Delete) => "deleted",
                    _ => "changed",
                }
            ))),
        }
    }

    async fn authorize(
        &self,
        session: &ConnectSession,
        key: &DocKey,
        before: &Snapshot,
        after: &Snapshot,
        payload: &OpPayload,
    ) -> BackendResult<()> {
        let access = &self.inner.access;
        match payload {
            OpPayload::Create { .. } => access.check_create(&key.collection, &key.id, after, session).await,
            OpPayload::Delete => access.check_delete(&key.collection, &key.id, before, session).await,
            OpPayload::Edit(op) => {
                access
                    .check_update(&key.collection, &key.id, before, after, op, session)
                    .await
            }
        }
    }

    async fn run_hooks(&self, key: &DocKey, before: &Snapshot, after: &Snapshot, payload: &OpPayload) {
        let (Some(hooks), Some(classifier)) = (
            self.inner.hooks.get(&key.collection),
            self.inner.classifiers.get(&key.collection),
        ) else {
            return;
        };
        hooks::dispatch(hooks.as_ref(), classifier, &key.collection, &key.id, before, after, payload).await;
    }
}

impl std::fmt::Debug for SyncBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBackend").field("stats", &self.stats()).finish()
    }
}
