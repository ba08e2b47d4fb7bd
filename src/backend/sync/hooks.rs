/**
 * Entity Hooks
 *
 * Callbacks fired after a commit for every entity the op inserted, updated
 * or deleted, classified with the same domain templates the rule engine
 * uses. Creating or deleting the whole document reports the root domain
 * (empty template) when the collection has one. Hooks run after the commit
 * is durable; a failing hook is logged and the commit stands.
 */

use async_trait::async_trait;
use serde_json::Value;
use std::slice;

use crate::backend::access::DomainClassifier;
use crate::backend::error::BackendResult;
use crate::shared::document::{OpPayload, Snapshot};
use crate::shared::ot::json0::{self, ComponentKind};
use crate::shared::ot::DocOp;

#[async_trait]
pub trait EntityHooks: Send + Sync {
    async fn on_insert(&self, _doc_id: &str, _domain: u32, _entity: &Value) -> BackendResult<()> {
        Ok(())
    }

    async fn on_update(&self, _doc_id: &str, _domain: u32, _entity: &Value) -> BackendResult<()> {
        Ok(())
    }

    async fn on_delete(&self, _doc_id: &str, _domain: u32, _entity: &Value) -> BackendResult<()> {
        Ok(())
    }
}

/// One entity-level change found in a committed op
#[derive(Debug, Clone, PartialEq)]
pub enum EntityChange {
    Insert { domain: u32, entity: Value },
    Update { domain: u32, entity: Value },
    Delete { domain: u32, entity: Value },
}

/// Classify the entity changes made by an op that took `before` to `after`
pub fn entity_changes(
    classifier: &DomainClassifier,
    before: &Snapshot,
    after: &Snapshot,
    payload: &OpPayload,
) -> Vec<EntityChange> {
    let root = classifier
        .classify(&[])
        .filter(|domain| domain.path_template.is_empty())
        .map(|domain| domain.domain);

    match payload {
        OpPayload::Create { .. } => match (root, &after.data) {
            (Some(domain), Some(entity)) => vec![EntityChange::Insert {
                domain,
                entity: entity.clone(),
            }],
            _ => Vec::new(),
        },
        OpPayload::Delete => match (root, &before.data) {
            (Some(domain), Some(entity)) => vec![EntityChange::Delete {
                domain,
                entity: entity.clone(),
            }],
            _ => Vec::new(),
        },
        OpPayload::Edit(DocOp::RichText(_)) => Vec::new(),
        OpPayload::Edit(DocOp::Json0(components)) => {
            let mut changes = Vec::new();
            let mut state = before.data.clone().unwrap_or(Value::Null);

            for component in components {
                let next = match json0::apply(&state, slice::from_ref(component)) {
                    Ok(next) => next,
                    Err(_) => break,
                };

                if let Some(domain) = classifier.classify(&component.path) {
                    let code = domain.domain;
                    let entity_len = domain.path_template.len();

                    if component.path.len() > entity_len {
                        if let Some(entity) = json0::get(&next, &component.path[..entity_len]) {
                            changes.push(EntityChange::Update {
                                domain: code,
                                entity: entity.clone(),
                            });
                        }
                    } else {
                        match &component.kind {
                            ComponentKind::ListInsert(entity) | ComponentKind::ObjectInsert(entity) => {
                                changes.push(EntityChange::Insert {
                                    domain: code,
                                    entity: entity.clone(),
                                })
                            }
                            ComponentKind::ListDelete(_) | ComponentKind::ObjectDelete(_) => {
                                if let Some(entity) = json0::get(&state, &component.path) {
                                    changes.push(EntityChange::Delete {
                                        domain: code,
                                        entity: entity.clone(),
                                    });
                                }
                            }
                            ComponentKind::ListReplace { before, after }
                            | ComponentKind::ObjectReplace { before, after } => {
                                changes.push(EntityChange::Delete {
                                    domain: code,
                                    entity: before.clone(),
                                });
                                changes.push(EntityChange::Insert {
                                    domain: code,
                                    entity: after.clone(),
                                });
                            }
                            ComponentKind::ListMove(_) => {}
                            ComponentKind::NumberAdd(_) | ComponentKind::Subtype(_) => {
                                if let Some(entity) = json0::get(&next, &component.path) {
                                    changes.push(EntityChange::Update {
                                        domain: code,
                                        entity: entity.clone(),
                                    });
                                }
                            }
                        }
                    }
                }
                state = next;
            }
            changes
        }
    }
}

/// Fire hooks for every entity change; failures are logged
pub async fn dispatch(
    hooks: &dyn EntityHooks,
    classifier: &DomainClassifier,
    collection: &str,
    doc_id: &str,
    before: &Snapshot,
    after: &Snapshot,
    payload: &OpPayload,
) {
    for change in entity_changes(classifier, before, after, payload) {
        let result = match &change {
            EntityChange::Insert { domain, entity } => hooks.on_insert(doc_id, *domain, entity).await,
            EntityChange::Update { domain, entity } => hooks.on_update(doc_id, *domain, entity).await,
            EntityChange::Delete { domain, entity } => hooks.on_delete(doc_id, *domain, entity).await,
        };
        if let Err(err) = result {
            tracing::error!("Entity hook failed on {}/{}: {}", collection, doc_id, err);
        }
    }
}
