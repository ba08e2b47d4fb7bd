/**
 * In-Memory Document Adapter
 *
 * `MemoryDoc` holds one document with no server behind it. Every op is
 * applied synchronously and acknowledged at once, so `pending_ops` is
 * always empty and `idle` resolves immediately. Events are sent in call
 * order before the mutating call returns.
 *
 * `apply_remote` feeds an op as if another client had committed it, which
 * lets tests drive `RemoteChange` handling without a backend.
 */

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::client::{AdapterError, AdapterResult, DocEvent, DocumentAdapter, EVENT_CAPACITY};
use crate::shared::document::{DocKey, OpPayload, Snapshot};
use crate::shared::ot::{DocOp, OtType};

pub struct MemoryDoc {
    key: DocKey,
    snapshot: Mutex<Snapshot>,
    events: broadcast::Sender<DocEvent>,
    closed: Mutex<bool>,
}

impl MemoryDoc {
    /// A document that does not exist yet
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        let key = DocKey::new(collection, id);
        let snapshot = Snapshot::empty(key.id.clone());
        Self::with_snapshot(key, snapshot)
    }

    pub fn with_snapshot(key: DocKey, snapshot: Snapshot) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            key,
            snapshot: Mutex::new(snapshot),
            events,
            closed: Mutex::new(false),
        }
    }

    /// Apply an op committed elsewhere
    pub fn apply_remote(&self, payload: OpPayload, source: impl Into<String>) -> AdapterResult<()> {
        let event = match &payload {
            OpPayload::Create { .. } => DocEvent::Create,
            OpPayload::Delete => DocEvent::Delete,
            OpPayload::Edit(op) => DocEvent::RemoteChange {
                op: op.clone(),
                source: source.into(),
            },
        };
        self.apply(&payload)?;
        self.emit(event);
        Ok(())
    }

    fn apply(&self, payload: &OpPayload) -> AdapterResult<()> {
        if *self.closed.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(AdapterError::Closed);
        }
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        *snapshot = snapshot.apply(payload)?;
        Ok(())
    }

    fn emit(&self, event: DocEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl DocumentAdapter for MemoryDoc {
    fn key(&self) -> &DocKey {
        &self.key
    }

    fn snapshot(&self) -> Snapshot {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn pending_ops(&self) -> Vec<DocOp> {
        Vec::new()
    }

    fn events(&self) -> broadcast::Receiver<DocEvent> {
        self.events.subscribe()
    }

    async fn fetch(&self) -> AdapterResult<Snapshot> {
        Ok(self.snapshot())
    }

    async fn subscribe(&self) -> AdapterResult<Snapshot> {
        Ok(self.snapshot())
    }

    async fn submit_op(&self, op: DocOp, source: Option<String>) -> AdapterResult<()> {
        self.apply(&OpPayload::Edit(op.clone()))?;
        self.emit(DocEvent::LocalChange { op, source });
        self.emit(DocEvent::Idle);
        Ok(())
    }

    async fn create(&self, ot_type: OtType, data: serde_json::Value) -> AdapterResult<()> {
        self.apply(&OpPayload::Create { ot_type, data })?;
        self.emit(DocEvent::Create);
        self.emit(DocEvent::Idle);
        Ok(())
    }

    async fn delete(&self) -> AdapterResult<()> {
        self.apply(&OpPayload::Delete)?;
        self.emit(DocEvent::Delete);
        self.emit(DocEvent::Idle);
        Ok(())
    }

    fn ingest_snapshot(&self, incoming: Snapshot) -> AdapterResult<()> {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        if incoming.version > snapshot.version {
            *snapshot = incoming;
        }
        Ok(())
    }

    async fn idle(&self) {}

    async fn destroy(&self) {
        *self.closed.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }
}

impl std::fmt::Debug for MemoryDoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDoc")
            .field("key", &self.key)
            .field("version", &self.snapshot().version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_op(value: serde_json::Value) -> DocOp {
        OtType::Json0.parse_op(value).unwrap()
    }

    #[tokio::test]
    async fn test_events_fire_in_order() {
        let doc = MemoryDoc::new("notes", "n1");
        let mut events = doc.events();

        doc.create(OtType::Json0, json!({"title": "a"})).await.unwrap();
        doc.submit_op(json_op(json!([{"p": ["title"], "od": "a", "oi": "b"}])), Some("editor".to_string()))
            .await
            .unwrap();
        doc.apply_remote(
            OpPayload::Edit(json_op(json!([{"p": ["n"], "oi": 1}]))),
            "other",
        )
        .unwrap();

        assert_eq!(events.try_recv().unwrap(), DocEvent::Create);
        assert_eq!(events.try_recv().unwrap(), DocEvent::Idle);
        assert!(matches!(events.try_recv().unwrap(), DocEvent::LocalChange { source: Some(ref s), .. } if s == "editor"));
        assert_eq!(events.try_recv().unwrap(), DocEvent::Idle);
        assert!(matches!(events.try_recv().unwrap(), DocEvent::RemoteChange { ref source, .. } if source == "other"));

        let snapshot = doc.snapshot();
        assert_eq!(snapshot.version, 3);
        assert_eq!(snapshot.data, Some(json!({"title": "b", "n": 1})));
        assert!(doc.pending_ops().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_op_leaves_document_unchanged() {
        let doc = MemoryDoc::new("notes", "n1");
        let err = doc
            .submit_op(json_op(json!([{"p": ["x"], "oi": 1}])), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Shared(_)));
        assert_eq!(doc.snapshot().version, 0);

        doc.destroy().await;
        assert_eq!(doc.create(OtType::Json0, json!({})).await, Err(AdapterError::Closed));
    }

    #[tokio::test]
    async fn test_ingest_ignores_older_snapshot() {
        let doc = MemoryDoc::new("notes", "n1");
        doc.create(OtType::Json0, json!({"v": 1})).await.unwrap();
        doc.ingest_snapshot(Snapshot::empty("n1")).unwrap();
        assert_eq!(doc.snapshot().version, 1);

        let newer = Snapshot {
            id: "n1".to_string(),
            version: 5,
            ot_type: Some(OtType::Json0),
            data: Some(json!({"v": 5})),
        };
        doc.ingest_snapshot(newer.clone()).unwrap();
        assert_eq!(doc.snapshot(), newer);
    }
}
