//! Startup schema migrations and entity hooks

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::common::*;
use docsync::backend::error::BackendResult;
use docsync::backend::server::build_state;
use docsync::backend::store::DocStore;
use docsync::backend::sync::{EntityChange, EntityHooks, Migration, SyncBackend};
use docsync::shared::document::{DocKey, OpPayload, Snapshot};
use docsync::shared::error::SharedResult;
use docsync::shared::ot::{DocOp, OtType};
use docsync::shared::path_template::PathKey;

/// Renames the question's `title` property to `name`
struct RenameTitle;

impl Migration for RenameTitle {
    fn version(&self) -> u32 {
        1
    }

    fn migrate_doc(&self, snapshot: &Snapshot) -> SharedResult<Option<DocOp>> {
        let Some(title) = snapshot.data.as_ref().and_then(|data| data.get("title")) else {
            return Ok(None);
        };
        let op = OtType::Json0.parse_op(json!([
            {"p": ["name"], "oi": title},
            {"p": ["title"], "od": title}
        ]))?;
        Ok(Some(op))
    }

    fn migrate_op(&self, op: &mut DocOp) -> SharedResult<()> {
        if let DocOp::Json0(components) = op {
            for component in components.iter_mut() {
                if component.path.first() == Some(&PathKey::Key("title".to_string())) {
                    component.path[0] = PathKey::Key("name".to_string());
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    changes: Mutex<Vec<EntityChange>>,
}

impl Recorder {
    fn take(&self) -> Vec<EntityChange> {
        std::mem::take(&mut *self.changes.lock().unwrap())
    }
}

#[async_trait]
impl EntityHooks for Recorder {
    async fn on_insert(&self, _doc_id: &str, domain: u32, entity: &Value) -> BackendResult<()> {
        self.changes.lock().unwrap().push(EntityChange::Insert {
            domain,
            entity: entity.clone(),
        });
        Ok(())
    }

    async fn on_update(&self, _doc_id: &str, domain: u32, entity: &Value) -> BackendResult<()> {
        self.changes.lock().unwrap().push(EntityChange::Update {
            domain,
            entity: entity.clone(),
        });
        Ok(())
    }

    async fn on_delete(&self, _doc_id: &str, domain: u32, entity: &Value) -> BackendResult<()> {
        self.changes.lock().unwrap().push(EntityChange::Delete {
            domain,
            entity: entity.clone(),
        });
        Ok(())
    }
}

#[tokio::test]
async fn test_startup_migration_rewrites_documents_and_stale_ops() {
    let (builder, store) = backend_builder(test_config());

    // Documents written before the migration existed
    let seeding = SyncBackend::new(test_config(), store.clone()).unwrap();
    seed_question(&seeding.connect(None)).await;
    drop(seeding);

    let state = build_state(builder.migration("questions", Arc::new(RenameTitle)))
        .await
        .expect("migrations run");

    assert_eq!(store.get_schema_version("questions").await.unwrap(), 1);
    let key = DocKey::new("questions", "p1:q1");
    let snapshot = store.get_snapshot(&key).await.unwrap();
    assert_eq!(snapshot.version, 2);
    let data = snapshot.data.unwrap();
    assert_eq!(data["name"], json!("Which colour?"));
    assert!(data.get("title").is_none());

    let ops = store.get_ops(&key, 1, None).await.unwrap();
    assert_eq!(ops[0].metadata.migration, Some(1));

    // A client still on the old schema edits `title` against v1
    let stale = json_op(json!([{"p": ["title"], "od": "Which colour?", "oi": "Which hue?"}]));
    let server = state.backend.connect(None);
    assert_eq!(server.submit("questions", "p1:q1", 1, OpPayload::Edit(stale)).await.unwrap(), 2);

    let data = server.fetch("questions", "p1:q1").await.unwrap().data.unwrap();
    assert_eq!(data["name"], json!("Which hue?"));
    assert!(data.get("title").is_none());
}

#[tokio::test]
async fn test_migration_skipped_once_applied() {
    let (builder, store) = backend_builder(test_config());
    store.set_schema_version("questions", 1).await.unwrap();

    let seeding = SyncBackend::new(test_config(), store.clone()).unwrap();
    seed_question(&seeding.connect(None)).await;
    drop(seeding);

    build_state(builder.migration("questions", Arc::new(RenameTitle)))
        .await
        .unwrap();

    let snapshot = store.get_snapshot(&DocKey::new("questions", "p1:q1")).await.unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.data.unwrap()["title"], json!("Which colour?"));
}

#[tokio::test]
async fn test_hooks_see_entity_changes() {
    let recorder = Arc::new(Recorder::default());
    let (builder, _store) = backend_builder(test_config());
    let backend = builder.hooks("questions", recorder.clone()).build().unwrap();

    let server = backend.connect(None);
    seed_question(&server).await;
    assert!(matches!(recorder.take().as_slice(), [EntityChange::Insert { domain: QUESTION, .. }]));

    let answer = json!({"id": "a3", "ownerRef": "u3", "text": "green"});
    let insert = json_op(json!([{"p": ["answers", 2], "li": answer}]));
    server.submit("questions", "p1:q1", 1, OpPayload::Edit(insert)).await.unwrap();
    assert_eq!(recorder.take(), vec![EntityChange::Insert { domain: ANSWER, entity: answer }]);

    let edit = json_op(json!([{"p": ["answers", 0, "text"], "od": "red", "oi": "scarlet"}]));
    server.submit("questions", "p1:q1", 2, OpPayload::Edit(edit)).await.unwrap();
    assert_eq!(
        recorder.take(),
        vec![EntityChange::Update {
            domain: ANSWER,
            entity: json!({"id": "a1", "ownerRef": "u1", "text": "scarlet"})
        }]
    );

    let remove = json_op(json!([{"p": ["answers", 1], "ld": {"id": "a2", "ownerRef": "u2", "text": "blue"}}]));
    server.submit("questions", "p1:q1", 3, OpPayload::Edit(remove)).await.unwrap();
    assert!(matches!(recorder.take().as_slice(), [EntityChange::Delete { domain: ANSWER, .. }]));
}
