//! Config and backend fixtures
//!
//! A small project setup used across the integration suites:
//!
//! - `projects` - project documents with a `userRoles` map
//! - `questions` - JSON0 project data; domain 100 is the question itself,
//!   domain 200 the entries under `answers`
//! - `texts` - rich-text documents open to trusted connections only
//! - `answer_list` - projection of `questions` exposing `answers` only

use serde_json::{json, Value};
use std::sync::Arc;

use docsync::backend::store::MemoryStore;
use docsync::backend::sync::{Connection, SyncBackend, SyncBackendBuilder};
use docsync::shared::config::{CollectionConfig, ProjectRoleConfig, ProjectionConfig, RuleKind, SyncConfig};
use docsync::shared::ot::OtType;
use docsync::shared::path_template::PathTemplate;
use docsync::shared::rights::{right_code, Operation};

pub const QUESTION: u32 = 100;
pub const ANSWER: u32 = 200;
pub const PROJECT: &str = "p1";

pub fn template(segments: Value, inherit: bool) -> PathTemplate {
    PathTemplate::from_json(segments, inherit).expect("valid template")
}

/// Project roles used by the scenarios
///
/// - `own` - may edit only answers it owns
/// - `viewer` - blanket view on every domain
/// - `blind` - may edit answers but view nothing
pub fn roles() -> Vec<ProjectRoleConfig> {
    vec![
        ProjectRoleConfig::new("own", [right_code(ANSWER, Operation::EditOwn)]),
        ProjectRoleConfig::new(
            "viewer",
            [right_code(QUESTION, Operation::View), right_code(ANSWER, Operation::View)],
        ),
        ProjectRoleConfig::new("blind", [right_code(ANSWER, Operation::Edit)]),
    ]
}

/// Configuration builder with the fixture collections registered
pub fn config_builder() -> docsync::shared::config::SyncConfigBuilder {
    let mut builder = SyncConfig::builder()
        .collection(CollectionConfig::new("projects", OtType::Json0).with_rules(RuleKind::Projects))
        .collection(
            CollectionConfig::new("questions", OtType::Json0)
                .with_rules(RuleKind::ProjectData)
                .with_domain(QUESTION, template(json!([]), true))
                .with_domain(ANSWER, template(json!(["answers", -1]), true))
                .with_immutable(template(json!(["answers", -1, "id"]), false)),
        )
        .collection(CollectionConfig::new("texts", OtType::RichText))
        .projection(ProjectionConfig {
            name: "answer_list".to_string(),
            collection: "questions".to_string(),
            fields: vec!["answers".to_string()],
        });
    for role in roles() {
        builder = builder.role(role);
    }
    builder
}

pub fn test_config() -> SyncConfig {
    config_builder().build().expect("valid fixture config")
}

/// Config that verifies tokens against the given JWKS URL
pub fn config_with_jwks(jwks_url: &str) -> SyncConfig {
    config_builder()
        .jwks_url(jwks_url)
        .algorithms(["HS256"])
        .build()
        .expect("valid fixture config")
}

pub fn backend_builder(config: SyncConfig) -> (SyncBackendBuilder, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (SyncBackend::builder(config, store.clone()), store)
}

pub fn test_backend() -> (SyncBackend, Arc<MemoryStore>) {
    let (builder, store) = backend_builder(test_config());
    (builder.build().expect("backend builds"), store)
}

/// Create project `p1` assigning the given user → role pairs
pub async fn seed_project(backend: &SyncBackend, members: &[(&str, &str)]) {
    let roles: serde_json::Map<String, Value> = members
        .iter()
        .map(|(user, role)| (user.to_string(), json!(role)))
        .collect();
    backend
        .connect(None)
        .create("projects", PROJECT, OtType::Json0, json!({"name": "Project", "userRoles": roles}))
        .await
        .expect("project created");
}

/// Create question `p1:q1` with answers owned by `u1` and `u2`
pub async fn seed_question(server: &Connection) {
    server
        .create(
            "questions",
            "p1:q1",
            OtType::Json0,
            json!({
                "title": "Which colour?",
                "ownerRef": "admin",
                "answers": [
                    {"id": "a1", "ownerRef": "u1", "text": "red"},
                    {"id": "a2", "ownerRef": "u2", "text": "blue"}
                ]
            }),
        )
        .await
        .expect("question created");
}

pub fn json_op(op: Value) -> docsync::shared::ot::DocOp {
    OtType::Json0.parse_op(op).expect("valid json0 op")
}

pub fn rich_op(op: Value) -> docsync::shared::ot::DocOp {
    OtType::RichText.parse_op(op).expect("valid rich-text op")
}
