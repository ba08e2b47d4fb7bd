//! Concurrent editing of one rich-text document
//!
//! Two clients race inserts at the same position against the same base
//! version. The later submission is transformed over the earlier commit and
//! both clients end on the same content.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::common::*;
use docsync::backend::sync::SyncBackend;
use docsync::client::{DocEvent, DocumentAdapter, RealtimeDoc};
use docsync::shared::document::{OpPayload, Snapshot};
use docsync::shared::ot::OtType;

fn text_of(snapshot: &Snapshot) -> String {
    snapshot
        .data
        .as_ref()
        .and_then(|data| data["ops"].as_array().cloned())
        .unwrap_or_default()
        .iter()
        .filter_map(|op| op["insert"].as_str())
        .collect()
}

fn insert_at(pos: usize, text: &str) -> docsync::shared::ot::DocOp {
    if pos == 0 {
        rich_op(json!([{"insert": text}]))
    } else {
        rich_op(json!([{"retain": pos}, {"insert": text}]))
    }
}

async fn create_text(backend: &SyncBackend, id: &str, content: &str) {
    let data: Value = json!({"ops": [{"insert": content}]});
    backend
        .connect(None)
        .create("texts", id, OtType::RichText, data)
        .await
        .unwrap();
}

async fn settle(doc: &RealtimeDoc, version: u64) {
    timeout(Duration::from_secs(5), async {
        loop {
            if doc.version() >= version && doc.pending_ops().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("document did not settle");
}

#[tokio::test]
async fn test_stale_insert_is_transformed_and_both_subscribers_converge() {
    let (backend, _store) = test_backend();
    create_text(&backend, "t1", "ab").await;

    let alice = backend.connect(Some("alice"));
    let bob = backend.connect(Some("bob"));
    let (_, mut alice_sub) = alice.subscribe("texts", "t1").await.unwrap();
    let (_, mut bob_sub) = bob.subscribe("texts", "t1").await.unwrap();

    let first = alice
        .submit("texts", "t1", 1, OpPayload::Edit(insert_at(1, "X")))
        .await
        .unwrap();
    let second = bob
        .submit("texts", "t1", 1, OpPayload::Edit(insert_at(1, "Y")))
        .await
        .unwrap();
    assert_eq!((first, second), (1, 2));

    // Each subscriber sees only the other's op, already in committed form
    let seen_by_bob = timeout(Duration::from_secs(1), bob_sub.next()).await.unwrap().unwrap().unwrap();
    let seen_by_alice = timeout(Duration::from_secs(1), alice_sub.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(seen_by_bob.version, 1);
    assert_eq!(seen_by_alice.version, 2);

    let server = backend.connect(None).fetch("texts", "t1").await.unwrap();
    assert_eq!(server.version, 3);
    // Incoming ops win insert ties against committed ones
    assert_eq!(text_of(&server), "aYXb");
}

#[tokio::test]
async fn test_realtime_docs_converge_on_concurrent_inserts() {
    let (backend, _store) = test_backend();
    create_text(&backend, "t1", "ab").await;

    let alice = RealtimeDoc::new(Arc::new(backend.connect(Some("alice"))), "texts", "t1");
    let bob = RealtimeDoc::new(Arc::new(backend.connect(Some("bob"))), "texts", "t1");
    assert_eq!(alice.subscribe().await.unwrap().version, 1);
    assert_eq!(bob.subscribe().await.unwrap().version, 1);

    let (a, b) = tokio::join!(
        alice.submit_op(insert_at(1, "X"), None),
        bob.submit_op(insert_at(1, "Y"), None)
    );
    a.unwrap();
    b.unwrap();

    settle(&alice, 3).await;
    settle(&bob, 3).await;

    let server = backend.connect(None).fetch("texts", "t1").await.unwrap();
    assert_eq!(text_of(&alice.snapshot()), text_of(&server));
    assert_eq!(text_of(&bob.snapshot()), text_of(&server));
    assert_eq!(text_of(&server).len(), 4);
}

#[tokio::test]
async fn test_queued_local_ops_survive_remote_edits() {
    let (backend, _store) = test_backend();
    create_text(&backend, "t1", "").await;

    let writer = RealtimeDoc::new(Arc::new(backend.connect(None)), "texts", "t1");
    let reader = RealtimeDoc::new(Arc::new(backend.connect(None)), "texts", "t1");
    writer.subscribe().await.unwrap();
    reader.subscribe().await.unwrap();

    let mut events = reader.events();
    for word in ["one ", "two ", "three "] {
        let at = text_of(&writer.snapshot()).len();
        writer.submit_op(insert_at(at, word), Some("typing".to_string())).await.unwrap();
    }
    reader.submit_op(insert_at(0, ">"), None).await.unwrap();

    settle(&writer, 5).await;
    settle(&reader, 5).await;
    assert_eq!(text_of(&writer.snapshot()), text_of(&reader.snapshot()));
    assert!(text_of(&reader.snapshot()).starts_with('>'));

    let mut remote_changes = 0;
    while remote_changes < 3 {
        match timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Ok(DocEvent::RemoteChange { .. })) => remote_changes += 1,
            Ok(Ok(_)) => {}
            _ => break,
        }
    }
    assert_eq!(remote_changes, 3);
}

#[tokio::test]
async fn test_remote_delete_rolls_back_pending_edit() {
    let (backend, _store) = test_backend();
    create_text(&backend, "t1", "abc").await;

    let doc = RealtimeDoc::new(Arc::new(backend.connect(None)), "texts", "t1");
    doc.subscribe().await.unwrap();

    backend.connect(None).delete("texts", "t1").await.unwrap();
    let result = doc.submit_op(insert_at(0, "z"), None).await;

    // The edit either loses to the delete on the server or on the client
    assert!(result.is_err());
    doc.idle().await;
    timeout(Duration::from_secs(5), async {
        while doc.snapshot().exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(doc.version(), 2);
}
