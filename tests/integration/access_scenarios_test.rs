//! Access rule scenarios over a live backend
//!
//! Sessions resolve their project roles from the `projects` collection the
//! same way handshake-built sessions do.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

use crate::common::*;
use crate::{assert_code, assert_ok};
use docsync::backend::auth::{ConnectSession, StoreRoleLoader};
use docsync::backend::error::types::{CODE_AUTHORIZATION, CODE_PROTOCOL};
use docsync::backend::store::DocQuery;
use docsync::backend::sync::{Connection, SyncBackend};
use docsync::shared::document::OpPayload;
use docsync::shared::rights::SystemRole;

fn user_connection(backend: &SyncBackend, user_id: &str) -> Connection {
    let loader = Arc::new(StoreRoleLoader::new(backend.store(), "projects"));
    backend.connect_as(ConnectSession::end_user(user_id, SystemRole::User, loader))
}

async fn setup(members: &[(&str, &str)]) -> SyncBackend {
    let (backend, _store) = test_backend();
    seed_project(&backend, members).await;
    seed_question(&backend.connect(None)).await;
    backend
}

#[tokio::test]
async fn test_edit_own_allows_owned_entity_only() {
    let backend = setup(&[("u1", "own")]).await;
    let u1 = user_connection(&backend, "u1");

    let own = json_op(json!([{"p": ["answers", 0, "text"], "od": "red", "oi": "crimson"}]));
    let v = assert_ok!(u1.submit("questions", "p1:q1", 1, OpPayload::Edit(own)).await);
    assert_eq!(v, 1);

    let other = json_op(json!([{"p": ["answers", 1, "text"], "od": "blue", "oi": "navy"}]));
    let denied = u1.submit("questions", "p1:q1", 2, OpPayload::Edit(other)).await;
    assert_code!(denied, CODE_AUTHORIZATION);

    let snapshot = backend.connect(None).fetch("questions", "p1:q1").await.unwrap();
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.data.unwrap()["answers"][1]["text"], json!("blue"));
}

#[tokio::test]
async fn test_owner_reassignment_denied() {
    let backend = setup(&[("u1", "own")]).await;
    let u1 = user_connection(&backend, "u1");

    let steal = json_op(json!([{"p": ["answers", 0, "ownerRef"], "od": "u1", "oi": "u3"}]));
    assert_code!(u1.submit("questions", "p1:q1", 1, OpPayload::Edit(steal)).await, CODE_AUTHORIZATION);
}

#[tokio::test]
async fn test_immutable_path_denied_even_for_owner() {
    let backend = setup(&[("u1", "own")]).await;
    let u1 = user_connection(&backend, "u1");

    let rename = json_op(json!([{"p": ["answers", 0, "id"], "od": "a1", "oi": "a9"}]));
    assert_code!(u1.submit("questions", "p1:q1", 1, OpPayload::Edit(rename)).await, CODE_AUTHORIZATION);
}

#[tokio::test]
async fn test_blanket_view_reads_others_entities() {
    let backend = setup(&[("u3", "viewer"), ("u4", "blind")]).await;

    let viewer = user_connection(&backend, "u3");
    let snapshot = assert_ok!(viewer.fetch("questions", "p1:q1").await);
    assert_eq!(snapshot.data.unwrap()["answers"].as_array().unwrap().len(), 2);

    let blind = user_connection(&backend, "u4");
    assert_code!(blind.fetch("questions", "p1:q1").await, CODE_AUTHORIZATION);
}

#[tokio::test]
async fn test_non_member_cannot_read_or_subscribe() {
    let backend = setup(&[("u1", "own")]).await;
    let outsider = user_connection(&backend, "u9");

    assert_code!(outsider.fetch("questions", "p1:q1").await, CODE_AUTHORIZATION);
    assert!(outsider.subscribe("questions", "p1:q1").await.is_err());
    assert_eq!(outsider.subscription_count(), 0);
}

#[tokio::test]
async fn test_query_omits_unreadable_documents() {
    let backend = setup(&[("u3", "viewer")]).await;
    let server = backend.connect(None);
    server
        .create("questions", "p2:q1", docsync::shared::ot::OtType::Json0, json!({"title": "Elsewhere", "answers": []}))
        .await
        .unwrap();

    let viewer = user_connection(&backend, "u3");
    let visible = viewer.query("questions", &DocQuery::all()).await.unwrap();
    let ids: Vec<_> = visible.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["p1:q1"]);
}

#[tokio::test]
async fn test_projection_rejects_writes() {
    let backend = setup(&[("u3", "viewer")]).await;
    let server = backend.connect(None);

    let op = json_op(json!([{"p": ["answers", 0, "text"], "od": "red", "oi": "pink"}]));
    assert_code!(server.submit("answer_list", "p1:q1", 1, OpPayload::Edit(op)).await, CODE_PROTOCOL);

    let projected = server.fetch("answer_list", "p1:q1").await.unwrap();
    let data = projected.data.unwrap();
    assert!(data.get("title").is_none());
    assert_eq!(data["answers"][0]["text"], json!("red"));
}

#[tokio::test]
async fn test_trusted_connection_bypasses_rules() {
    let backend = setup(&[]).await;
    let server = backend.connect(Some("importer"));

    let op = json_op(json!([{"p": ["title"], "od": "Which colour?", "oi": "Which shade?"}]));
    assert_eq!(server.submit("questions", "p1:q1", 1, OpPayload::Edit(op)).await.unwrap(), 1);
    assert_eq!(server.fetch("texts", "missing").await.unwrap().version, 0);
}
