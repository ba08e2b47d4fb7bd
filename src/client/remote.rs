/**
 * Realtime Document Adapter
 *
 * `RealtimeDoc` edits one document through a backend `Connection`.
 *
 * # Local Ops
 *
 * A submitted op is applied to the local view at once and queued. At most
 * one op is in flight; it is sent against the last server version this
 * adapter has applied. The rest wait in `pending` and are sent one by one
 * as acknowledgements arrive.
 *
 * # Remote Ops
 *
 * The subscription delivers ops committed by other clients, in version
 * order. Remote ops and acknowledgements travel separately, so both are
 * held until the adapter reaches their version: a remote op waits in a
 * version-keyed buffer, and an acknowledgement for version `v` is stashed
 * until every remote op below `v` has been applied.
 *
 * Applying a remote op transforms the in-flight and pending ops over it
 * (local ops take the left side, matching the server) and the remote op
 * over them, then applies the result to the local view.
 *
 * Submitting needs a live subscription: an acknowledgement can land ahead
 * of the local version, and only the subscription brings the commits in
 * between. Without one, submits fail with `AdapterError::NotSubscribed`,
 * and a subscription that ends fails every local op.
 *
 * # Rollback
 *
 * A rejected op, or a remote create/delete while local ops are pending,
 * fails the in-flight op and everything queued behind it. The adapter
 * then reloads the server snapshot. Submits made while it reloads wait
 * for the reload to finish.
 *
 * One adapter per document per connection: the subscription recognises
 * this adapter's own ops by the connection's client id.
 */

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::task::JoinHandle;

use crate::backend::error::types::CODE_CONFLICT;
use crate::backend::error::BackendError;
use crate::backend::sync::{Connection, Subscription};
use crate::client::{AdapterError, AdapterResult, DocEvent, DocumentAdapter, EVENT_CAPACITY};
use crate::shared::document::{CommittedOp, DocKey, OpPayload, Snapshot};
use crate::shared::ot::{DocOp, OtType, Side};

impl From<BackendError> for AdapterError {
    fn from(err: BackendError) -> Self {
        AdapterError::Rejected {
            code: err.code(),
            message: err.wire_message(),
        }
    }
}

struct LocalOp {
    seq: u64,
    payload: OpPayload,
    done: Option<oneshot::Sender<AdapterResult<()>>>,
}

impl LocalOp {
    fn finish(mut self, result: AdapterResult<()>) {
        if let Some(done) = self.done.take() {
            let _ = done.send(result);
        }
    }
}

#[derive(Default)]
struct DocState {
    /// Local view: server state plus every unacknowledged local op
    snapshot: Option<Snapshot>,
    /// Server version the local view is based on
    version: u64,
    inflight: Option<LocalOp>,
    pending: VecDeque<LocalOp>,
    /// Remote ops ahead of `version`
    buffered: BTreeMap<u64, CommittedOp>,
    /// Acknowledged version of the in-flight op, waiting for `version` to catch up
    stashed_ack: Option<u64>,
    subscribed: bool,
    recovering: bool,
    closed: bool,
}

impl DocState {
    fn has_local(&self) -> bool {
        self.inflight.is_some() || !self.pending.is_empty()
    }

    fn view(&self, id: &str) -> Snapshot {
        self.snapshot.clone().unwrap_or_else(|| Snapshot::empty(id))
    }

    fn set_view(&mut self, mut snapshot: Snapshot) {
        snapshot.version = self.version;
        self.snapshot = Some(snapshot);
    }
}

/// What a state transition asks the caller to do once the lock is released
#[derive(Default)]
struct Effects {
    events: Vec<DocEvent>,
    send: Option<(u64, u64, OpPayload)>,
    rollback: Option<AdapterError>,
    idle: bool,
}

struct Inner {
    connection: Arc<Connection>,
    key: DocKey,
    state: Mutex<DocState>,
    events: broadcast::Sender<DocEvent>,
    idle: Notify,
    recovered: Notify,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// Realtime adapter over a backend connection
#[derive(Clone)]
pub struct RealtimeDoc {
    inner: Arc<Inner>,
}

impl RealtimeDoc {
    pub fn new(connection: Arc<Connection>, collection: impl Into<String>, id: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                connection,
                key: DocKey::new(collection, id),
                state: Mutex::new(DocState::default()),
                events,
                idle: Notify::new(),
                recovered: Notify::new(),
                reader: Mutex::new(None),
            }),
        }
    }

    /// Server version the local view is based on
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    async fn enqueue(&self, payload: OpPayload, source: Option<String>) -> AdapterResult<()> {
        self.wait_recovered().await;

        let (tx, rx) = oneshot::channel();
        let effects = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(AdapterError::Closed);
            }
            if !state.subscribed {
                return Err(AdapterError::NotSubscribed);
            }
            let next = state.view(&self.inner.key.id).apply(&payload)?;
            state.set_view(next);

            let mut effects = Effects::default();
            effects.events.push(match &payload {
                OpPayload::Create { .. } => DocEvent::Create,
                OpPayload::Delete => DocEvent::Delete,
                OpPayload::Edit(op) => DocEvent::LocalChange {
                    op: op.clone(),
                    source,
                },
            });

            state.pending.push_back(LocalOp {
                seq: self.inner.connection.next_seq(),
                payload,
                done: Some(tx),
            });
            Inner::flush(&mut state, &mut effects);
            effects
        };
        Inner::run(&self.inner, effects);

        rx.await.unwrap_or(Err(AdapterError::Closed))
    }

    async fn wait_recovered(&self) {
        loop {
            let notified = self.inner.recovered.notified();
            if !self.inner.lock().recovering {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, DocState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move the next pending op in flight if nothing is
    fn flush(state: &mut DocState, effects: &mut Effects) {
        if state.inflight.is_some() || state.recovering || state.closed {
            return;
        }
        if let Some(op) = state.pending.pop_front() {
            effects.send = Some((state.version, op.seq, op.payload.clone()));
            state.inflight = Some(op);
        }
    }

    /// Apply stashed acks and buffered remote ops that have become current
    fn process(state: &mut DocState, id: &str, effects: &mut Effects) {
        while !state.recovering {
            if state.stashed_ack == Some(state.version) {
                state.stashed_ack = None;
                state.version += 1;
                if let Some(op) = state.inflight.take() {
                    op.finish(Ok(()));
                }
                if let Some(view) = state.snapshot.as_mut() {
                    view.version = state.version;
                }
                Self::flush(state, effects);
                if !state.has_local() {
                    effects.idle = true;
                    effects.events.push(DocEvent::Idle);
                }
                continue;
            }

            let version = state.version;
            let Some(op) = state.buffered.remove(&version) else {
                break;
            };
            if let Err(err) = Self::apply_remote(state, id, op, effects) {
                effects.rollback = Some(err);
                return;
            }
        }
    }

    fn apply_remote(state: &mut DocState, id: &str, op: CommittedOp, effects: &mut Effects) -> AdapterResult<()> {
        let payload = match op.payload {
            OpPayload::Edit(remote) => {
                let mut remote = remote;
                let locals = state.inflight.iter_mut().chain(state.pending.iter_mut());
                for local in locals {
                    let OpPayload::Edit(edit) = &local.payload else {
                        return Err(AdapterError::Rejected {
                            code: CODE_CONFLICT,
                            message: "document changed under a pending create or delete".to_string(),
                        });
                    };
                    let transformed_local = edit.transform(&remote, Side::Left)?;
                    remote = remote.transform(edit, Side::Right)?;
                    local.payload = OpPayload::Edit(transformed_local);
                }
                effects.events.push(DocEvent::RemoteChange {
                    op: remote.clone(),
                    source: op.src,
                });
                OpPayload::Edit(remote)
            }
            other => {
                if state.has_local() {
                    return Err(AdapterError::Rejected {
                        code: CODE_CONFLICT,
                        message: "document was created or deleted under pending ops".to_string(),
                    });
                }
                effects.events.push(match other {
                    OpPayload::Create { .. } => DocEvent::Create,
                    _ => DocEvent::Delete,
                });
                other
            }
        };

        let next = state.view(id).apply(&payload)?;
        state.version += 1;
        state.set_view(next);
        Ok(())
    }

    /// Carry out effects after the state lock is released
    fn run(inner: &Arc<Inner>, effects: Effects) {
        for event in effects.events {
            let _ = inner.events.send(event);
        }
        if effects.idle {
            inner.idle.notify_waiters();
        }
        if let Some((base, seq, payload)) = effects.send {
            let inner = inner.clone();
            tokio::spawn(async move { Inner::send(inner, base, seq, payload).await });
        }
        if let Some(err) = effects.rollback {
            let inner = inner.clone();
            tokio::spawn(async move { Inner::rollback(inner, err).await });
        }
    }

    async fn send(inner: Arc<Inner>, base: u64, seq: u64, payload: OpPayload) {
        let result = inner
            .connection
            .submit_with_seq(&inner.key.collection, &inner.key.id, base, seq, payload)
            .await;

        match result {
            Ok(version) => {
                let effects = {
                    let mut state = inner.lock();
                    let mut effects = Effects::default();
                    state.stashed_ack = Some(version);
                    Self::process(&mut state, &inner.key.id, &mut effects);
                    effects
                };
                Self::run(&inner, effects);
            }
            Err(err) => {
                tracing::debug!("Op {} on {} rejected: {}", seq, inner.key, err);
                Self::rollback(inner, err.into()).await;
            }
        }
    }

    /// Fail every local op and reload the server snapshot
    async fn rollback(inner: Arc<Inner>, err: AdapterError) {
        let failed: Vec<LocalOp> = {
            let mut state = inner.lock();
            if state.recovering {
                return;
            }
            state.recovering = true;
            state.stashed_ack = None;
            let mut failed: Vec<LocalOp> = state.inflight.take().into_iter().collect();
            failed.extend(state.pending.drain(..));
            failed
        };
        for op in failed {
            op.finish(Err(err.clone()));
        }

        let reloaded = inner.connection.fetch(&inner.key.collection, &inner.key.id).await;

        let effects = {
            let mut state = inner.lock();
            let mut effects = Effects::default();
            match reloaded {
                Ok(snapshot) => {
                    state.version = snapshot.version;
                    state.snapshot = Some(snapshot);
                    let version = state.version;
                    state.buffered.retain(|v, _| *v >= version);
                }
                Err(e) => tracing::warn!("Reloading {} after a rejected op failed: {}", inner.key, e),
            }
            state.recovering = false;
            effects.idle = true;
            effects.events.push(DocEvent::Idle);
            Self::process(&mut state, &inner.key.id, &mut effects);
            effects
        };
        inner.recovered.notify_waiters();
        Self::run(&inner, effects);
    }

    async fn read(inner: Arc<Inner>, mut subscription: Subscription) {
        loop {
            match subscription.next().await {
                Ok(Some(op)) => {
                    let effects = {
                        let mut state = inner.lock();
                        let mut effects = Effects::default();
                        if op.version >= state.version {
                            state.buffered.insert(op.version, op);
                        }
                        Self::process(&mut state, &inner.key.id, &mut effects);
                        effects
                    };
                    Self::run(&inner, effects);
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!("Subscription to {} ended: {}", inner.key, err);
                    break;
                }
            }
        }

        let effects = {
            let mut state = inner.lock();
            state.subscribed = false;
            let mut effects = Effects::default();
            if state.has_local() {
                effects.rollback = Some(AdapterError::NotSubscribed);
            }
            effects
        };
        Self::run(&inner, effects);
    }
}

#[async_trait]
impl DocumentAdapter for RealtimeDoc {
    fn key(&self) -> &DocKey {
        &self.inner.key
    }

    fn snapshot(&self) -> Snapshot {
        self.inner.lock().view(&self.inner.key.id)
    }

    fn pending_ops(&self) -> Vec<DocOp> {
        let state = self.inner.lock();
        state
            .inflight
            .iter()
            .chain(state.pending.iter())
            .filter_map(|op| match &op.payload {
                OpPayload::Edit(edit) => Some(edit.clone()),
                _ => None,
            })
            .collect()
    }

    fn events(&self) -> broadcast::Receiver<DocEvent> {
        self.inner.events.subscribe()
    }

    async fn fetch(&self) -> AdapterResult<Snapshot> {
        let snapshot = self
            .inner
            .connection
            .fetch(&self.inner.key.collection, &self.inner.key.id)
            .await?;
        let mut state = self.inner.lock();
        if !state.has_local() && snapshot.version >= state.version {
            state.version = snapshot.version;
            state.snapshot = Some(snapshot.clone());
        }
        Ok(snapshot)
    }

    async fn subscribe(&self) -> AdapterResult<Snapshot> {
        let (snapshot, subscription) = self
            .inner
            .connection
            .subscribe(&self.inner.key.collection, &self.inner.key.id)
            .await?;
        {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(AdapterError::Closed);
            }
            if state.has_local() {
                return Err(AdapterError::PendingOps {
                    count: state.pending.len() + usize::from(state.inflight.is_some()),
                });
            }
            state.version = snapshot.version;
            state.snapshot = Some(snapshot.clone());
            state.buffered.clear();
            state.subscribed = true;
        }

        let task = tokio::spawn(Inner::read(self.inner.clone(), subscription));
        let mut reader = self.inner.reader.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = reader.replace(task) {
            previous.abort();
        }
        Ok(snapshot)
    }

    async fn submit_op(&self, op: DocOp, source: Option<String>) -> AdapterResult<()> {
        self.enqueue(OpPayload::Edit(op), source).await
    }

    async fn create(&self, ot_type: OtType, data: serde_json::Value) -> AdapterResult<()> {
        self.enqueue(OpPayload::Create { ot_type, data }, None).await
    }

    async fn delete(&self) -> AdapterResult<()> {
        self.enqueue(OpPayload::Delete, None).await
    }

    fn ingest_snapshot(&self, snapshot: Snapshot) -> AdapterResult<()> {
        let mut state = self.inner.lock();
        if snapshot.version < state.version {
            return Ok(());
        }
        if state.has_local() {
            return Err(AdapterError::PendingOps {
                count: state.pending.len() + usize::from(state.inflight.is_some()),
            });
        }
        state.version = snapshot.version;
        state.snapshot = Some(snapshot);
        let version = state.version;
        state.buffered.retain(|v, _| *v >= version);
        Ok(())
    }

    async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            {
                let state = self.inner.lock();
                if !state.has_local() && !state.recovering {
                    return;
                }
            }
            notified.await;
        }
    }

    async fn destroy(&self) {
        if let Some(task) = self.inner.reader.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        let failed: Vec<LocalOp> = {
            let mut state = self.inner.lock();
            state.closed = true;
            state.subscribed = false;
            let mut failed: Vec<LocalOp> = state.inflight.take().into_iter().collect();
            failed.extend(state.pending.drain(..));
            failed
        };
        for op in failed {
            op.finish(Err(AdapterError::Closed));
        }
        self.inner.idle.notify_waiters();
    }
}

impl std::fmt::Debug for RealtimeDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeDoc")
            .field("key", &self.inner.key)
            .field("version", &self.version())
            .finish()
    }
}
