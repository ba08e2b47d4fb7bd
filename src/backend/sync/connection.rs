/**
 * Logical Connections
 *
 * A `Connection` is one registered client of the backend: a WebSocket
 * peer, a server-side job, or a realtime document adapter. It is distinct
 * from the raw socket and owns its session, its client id (used as `src`
 * on every op it submits) and its op sequence counter.
 *
 * # Subscriptions
 *
 * `subscribe` attaches to the document's pub/sub channel *before* reading
 * the snapshot, so no op committed in between is lost. `Subscription::next`
 * then yields committed ops strictly in version order starting at the
 * snapshot version. Ops already covered by the snapshot are skipped, the
 * connection's own ops are skipped (they are acknowledged instead), and a
 * gap or a lagged channel is refilled from the store's op log.
 */

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::backend::auth::ConnectSession;
use crate::backend::error::{BackendError, BackendResult};
use crate::backend::realtime::broadcast::OpEvent;
use crate::backend::store::DocQuery;
use crate::backend::sync::{projections, SubmitRequest, SyncBackend};
use crate::shared::document::{CommittedOp, DocKey, OpPayload, RawOp, Snapshot};
use crate::shared::ot::OtType;

/// Lifecycle of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Authenticated,
    Active,
    Closed,
}

impl ConnectionState {
    /// Whether `next` may follow `self`; every state may close
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Authenticated)
                | (Authenticated, Active)
                | (Connecting | Authenticating | Authenticated | Active, Closed)
        )
    }

    /// Move to `next`, refusing transitions the lifecycle does not allow
    pub fn advance(self, next: ConnectionState) -> BackendResult<ConnectionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BackendError::protocol(format!(
                "invalid connection transition {:?} -> {:?}",
                self, next
            )))
        }
    }
}

pub struct Connection {
    handle: u64,
    client_id: String,
    session: ConnectSession,
    backend: SyncBackend,
    seq: AtomicU64,
    subscriptions: Arc<AtomicUsize>,
}

impl Connection {
    pub(crate) fn new(
        handle: u64,
        client_id: String,
        session: ConnectSession,
        backend: SyncBackend,
        subscriptions: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            handle,
            client_id,
            session,
            backend,
            seq: AtomicU64::new(1),
            subscriptions,
        }
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn session(&self) -> &ConnectSession {
        &self.session
    }

    pub fn backend(&self) -> &SyncBackend {
        &self.backend
    }

    /// Next op sequence number of this connection
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub async fn fetch(&self, collection: &str, id: &str) -> BackendResult<Snapshot> {
        self.backend
            .fetch(&self.session, &DocKey::new(collection, id), None)
            .await
    }

    /// Read a document as it was at `version`
    pub async fn fetch_at(&self, collection: &str, id: &str, version: u64) -> BackendResult<Snapshot> {
        self.backend
            .fetch(&self.session, &DocKey::new(collection, id), Some(version))
            .await
    }

    /// Read a document and follow every op committed after it
    pub async fn subscribe(&self, collection: &str, id: &str) -> BackendResult<(Snapshot, Subscription)> {
        let key = DocKey::new(collection, id);
        let source = self.backend.source_key(&key);
        let receiver = self.backend.pubsub().subscribe(&source);
        let snapshot = self.backend.fetch(&self.session, &key, None).await?;
        let fields = self
            .backend
            .projection(collection)
            .map(|projection| projection.fields.clone());

        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Connection {} subscribed to {} at v{}", self.handle, key, snapshot.version);

        let subscription = Subscription {
            key,
            source,
            receiver,
            next_version: snapshot.version,
            src: self.client_id.clone(),
            fields,
            backend: self.backend.clone(),
            pending: VecDeque::new(),
            counter: self.subscriptions.clone(),
        };
        Ok((snapshot, subscription))
    }

    /// Submit an op with the next local sequence number
    pub async fn submit(&self, collection: &str, id: &str, base: u64, payload: OpPayload) -> BackendResult<u64> {
        self.submit_with_seq(collection, id, base, self.next_seq(), payload)
            .await
    }

    /// Submit an op under a caller-chosen sequence number (resubmission keeps the original)
    pub async fn submit_with_seq(
        &self,
        collection: &str,
        id: &str,
        base: u64,
        seq: u64,
        payload: OpPayload,
    ) -> BackendResult<u64> {
        self.backend
            .submit(
                &self.session,
                SubmitRequest {
                    key: DocKey::new(collection, id),
                    base,
                    src: self.client_id.clone(),
                    seq,
                    payload,
                    migration: None,
                },
            )
            .await
    }

    /// Submit a wire op body
    pub async fn submit_raw(&self, collection: &str, id: &str, base: u64, seq: u64, raw: RawOp) -> BackendResult<u64> {
        self.backend
            .submit_raw(
                &self.session,
                DocKey::new(collection, id),
                base,
                self.client_id.clone(),
                seq,
                raw,
            )
            .await
    }

    /// Create a document at its current version
    pub async fn create(&self, collection: &str, id: &str, ot_type: OtType, data: serde_json::Value) -> BackendResult<u64> {
        let base = self.current_version(collection, id).await?;
        self.submit(collection, id, base, OpPayload::Create { ot_type, data })
            .await
    }

    /// Delete a document at its current version
    pub async fn delete(&self, collection: &str, id: &str) -> BackendResult<u64> {
        let base = self.current_version(collection, id).await?;
        self.submit(collection, id, base, OpPayload::Delete).await
    }

    async fn current_version(&self, collection: &str, id: &str) -> BackendResult<u64> {
        let key = DocKey::new(collection, id);
        Ok(self.backend.store().get_snapshot(&key).await?.version)
    }

    /// Documents of a collection (or projection) matching `query` that this session may read
    pub async fn query(&self, collection: &str, query: &DocQuery) -> BackendResult<Vec<Snapshot>> {
        let requested = DocKey::new(collection, "");
        let source = self.backend.source_key(&requested);
        let fields = self
            .backend
            .projection(collection)
            .map(|projection| projection.fields.clone());

        let mut results = Vec::new();
        for snapshot in self.backend.store().query(&source.collection, query).await? {
            let key = DocKey::new(collection, snapshot.id.clone());
            match self.backend.check_read(&self.session, &key, &snapshot).await {
                Ok(()) => results.push(match &fields {
                    Some(fields) => projections::project_snapshot(&snapshot, fields),
                    None => snapshot,
                }),
                Err(_) => continue,
            }
        }
        Ok(results)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.backend.deregister(self.handle);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .field("client_id", &self.client_id)
            .field("trusted", &self.session.is_trusted())
            .finish()
    }
}

/// Ordered stream of ops committed to one document
pub struct Subscription {
    key: DocKey,
    source: DocKey,
    receiver: broadcast::Receiver<OpEvent>,
    next_version: u64,
    src: String,
    fields: Option<Vec<String>>,
    backend: SyncBackend,
    pending: VecDeque<CommittedOp>,
    counter: Arc<AtomicUsize>,
}

impl Subscription {
    pub fn key(&self) -> &DocKey {
        &self.key
    }

    /// Version the next delivered op applies to
    pub fn version(&self) -> u64 {
        self.next_version
    }

    /// Next op committed by another connection; `None` once the channel closes
    pub async fn next(&mut self) -> BackendResult<Option<CommittedOp>> {
        loop {
            if let Some(op) = self.pending.pop_front() {
                if let Some(op) = self.accept(op) {
                    return Ok(Some(op));
                }
                continue;
            }

            match self.receiver.recv().await {
                Ok(event) => {
                    if event.version < self.next_version {
                        continue;
                    }
                    if event.version > self.next_version {
                        tracing::debug!(
                            "Subscription to {} missed v{}..v{}, reading the op log",
                            self.key,
                            self.next_version,
                            event.version
                        );
                        self.refill(Some(event.version)).await?;
                    }
                    self.pending.push_back(event.as_ref().clone());
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Subscription to {} lagged by {} ops, reading the op log", self.key, skipped);
                    self.refill(None).await?;
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    /// Advance past `op`, returning it unless it is our own
    fn accept(&mut self, op: CommittedOp) -> Option<CommittedOp> {
        if op.version != self.next_version {
            return None;
        }
        self.next_version += 1;
        if op.src == self.src {
            return None;
        }
        Some(match &self.fields {
            Some(fields) => projections::project_op(&op, fields),
            None => op,
        })
    }

    async fn refill(&mut self, to: Option<u64>) -> BackendResult<()> {
        let ops = self
            .backend
            .store()
            .get_ops(&self.source, self.next_version, to)
            .await?;
        self.pending.extend(ops);
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("version", &self.next_version)
            .finish()
    }
}
