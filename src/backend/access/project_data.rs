/**
 * Project Data Rules
 *
 * Guards project-scoped collections. The caller needs a role in the
 * document's project (id prefix before `:`), and that role's rights on the
 * domain each component touches.
 *
 * # Update Checks
 *
 * Components are checked one at a time against the state produced by the
 * components before them, so an op that inserts an entity and then edits it
 * is judged on the entity it created.
 *
 * - path deeper than the domain template: property edit of the entity at
 *   the template-length prefix → edit check
 * - insert at the template path → create check
 * - delete at the template path → delete check against the entity as stored
 * - replace at the template path → edit check between the stored entity
 *   and its replacement; an object insert over a present key counts as one
 * - anything else at the template path (move, number add, subtype) → edit check
 *
 * The edit check denies any change of `ownerRef`, then requires `Edit`, or
 * `EditOwn` when the caller owns the entity. Paths matching an immutable
 * template are always denied.
 */

use async_trait::async_trait;
use serde_json::Value;
use std::slice;
use std::sync::Arc;

use crate::backend::access::{owner_of, project_id, CollectionRules, DomainClassifier};
use crate::backend::auth::ConnectSession;
use crate::backend::error::BackendResult;
use crate::shared::config::CollectionConfig;
use crate::shared::document::Snapshot;
use crate::shared::ot::json0::{self, Component, ComponentKind};
use crate::shared::ot::DocOp;
use crate::shared::path_template::{match_template, PathTemplate};
use crate::shared::rights::{Operation, ProjectRights};

pub struct ProjectDataRules {
    rights: Arc<ProjectRights>,
    classifier: DomainClassifier,
    /// Domain checked for documents without path granularity (rich text)
    primary_domain: Option<u32>,
    domains: Vec<u32>,
    immutable: Vec<PathTemplate>,
}

/// Role plus caller, the inputs every right check needs
struct Caller<'a> {
    rights: &'a ProjectRights,
    role: &'a str,
    user_id: &'a str,
}

impl Caller<'_> {
    fn has(&self, domain: u32, operation: Operation) -> bool {
        self.rights.has_right(self.role, domain, operation)
    }

    fn owns(&self, entity: Option<&Value>) -> bool {
        owner_of(entity) == Some(self.user_id)
    }

    fn can_edit(&self, domain: u32, before: Option<&Value>, after: Option<&Value>) -> bool {
        if owner_of(before) != owner_of(after) {
            return false;
        }
        self.has(domain, Operation::Edit) || (self.has(domain, Operation::EditOwn) && self.owns(before))
    }

    fn can_create(&self, domain: u32, entity: &Value) -> bool {
        self.has(domain, Operation::Create) && self.owns(Some(entity))
    }

    fn can_delete(&self, domain: u32, entity: Option<&Value>) -> bool {
        self.has(domain, Operation::Delete) || (self.has(domain, Operation::DeleteOwn) && self.owns(entity))
    }

    fn can_view(&self, domain: u32, doc: Option<&Value>) -> bool {
        self.has(domain, Operation::View) || (self.has(domain, Operation::ViewOwn) && self.owns(doc))
    }
}

impl ProjectDataRules {
    pub fn new(collection: &CollectionConfig, rights: Arc<ProjectRights>) -> Self {
        Self {
            rights,
            classifier: DomainClassifier::from_collection(collection),
            primary_domain: collection.domains.first().map(|d| d.domain),
            domains: collection.domains.iter().map(|d| d.domain).collect(),
            immutable: collection.immutable.clone(),
        }
    }

    async fn caller_role(&self, doc_id: &str, session: &ConnectSession) -> BackendResult<Option<String>> {
        session.project_role(project_id(doc_id)).await
    }

    fn check_components(&self, caller: &Caller<'_>, data: &Value, components: &[Component]) -> BackendResult<bool> {
        let mut state = data.clone();

        for component in components {
            if match_template(&self.immutable, &component.path).is_some() {
                tracing::debug!("Component at {:?} touches an immutable path", component.path);
                return Ok(false);
            }

            let domain = match self.classifier.classify(&component.path) {
                Some(domain) => domain,
                None => {
                    tracing::debug!("Component at {:?} matches no domain", component.path);
                    return Ok(false);
                }
            };
            let code = domain.domain;
            let entity_len = domain.path_template.len();

            let next = json0::apply(&state, slice::from_ref(component))?;

            let allowed = if component.path.len() > entity_len {
                let prefix = &component.path[..entity_len];
                caller.can_edit(code, json0::get(&state, prefix), json0::get(&next, prefix))
            } else {
                let stored = json0::get(&state, &component.path);
                match &component.kind {
                    ComponentKind::ListInsert(entity) => caller.can_create(code, entity),
                    // An object insert over a present key overwrites it
                    ComponentKind::ObjectInsert(entity) => match stored {
                        Some(existing) => caller.can_edit(code, Some(existing), Some(entity)),
                        None => caller.can_create(code, entity),
                    },
                    ComponentKind::ListDelete(_) | ComponentKind::ObjectDelete(_) => caller.can_delete(code, stored),
                    ComponentKind::ListReplace { after, .. } | ComponentKind::ObjectReplace { after, .. } => {
                        stored.is_some() && caller.can_edit(code, stored, Some(after))
                    }
                    ComponentKind::ListMove(_) => caller.can_edit(code, stored, stored),
                    ComponentKind::NumberAdd(_) | ComponentKind::Subtype(_) => {
                        caller.can_edit(code, stored, json0::get(&next, &component.path))
                    }
                }
            };

            if !allowed {
                tracing::debug!("Component at {:?} denied for domain {}", component.path, code);
                return Ok(false);
            }
            state = next;
        }

        Ok(true)
    }
}

#[async_trait]
impl CollectionRules for ProjectDataRules {
    async fn allow_read(&self, doc_id: &str, doc: &Snapshot, session: &ConnectSession) -> BackendResult<bool> {
        if !doc.exists() {
            return Ok(true);
        }
        let (Some(role), Some(user_id)) = (self.caller_role(doc_id, session).await?, session.user_id()) else {
            return Ok(false);
        };
        let caller = Caller {
            rights: &self.rights,
            role: &role,
            user_id,
        };
        Ok(self.domains.iter().all(|domain| caller.can_view(*domain, doc.data.as_ref())))
    }

    async fn allow_update(
        &self,
        doc_id: &str,
        old: &Snapshot,
        _new: &Snapshot,
        op: &DocOp,
        session: &ConnectSession,
    ) -> BackendResult<bool> {
        let (Some(role), Some(user_id)) = (self.caller_role(doc_id, session).await?, session.user_id()) else {
            return Ok(false);
        };
        let caller = Caller {
            rights: &self.rights,
            role: &role,
            user_id,
        };

        match op {
            DocOp::RichText(_) => Ok(self
                .primary_domain
                .map(|domain| caller.has(domain, Operation::Edit))
                .unwrap_or(false)),
            DocOp::Json0(components) => {
                let data = old.data.clone().unwrap_or(Value::Null);
                self.check_components(&caller, &data, components)
            }
        }
    }
}
