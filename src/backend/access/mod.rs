//! Access Control Rule Engine
//!
//! Every configured collection is guarded by one `CollectionRules`
//! implementation exposing four predicates. The backend calls them through
//! `AccessControl` before anything is returned or committed.
//!
//! # Rule Sets
//!
//! - **`project_data`** - project-scoped documents, checked per component
//!   against the caller's project role and the collection's rights domains
//! - **`users`** - user profiles: own profile or system admin
//! - **`projects`** - project documents: members read, admins edit
//! - **`TrustedOnlyRules`** - collections without configured rules
//! - **`ProjectionRules`** - read-model projections: anyone may read
//!
//! # Failure Semantics
//!
//! Trusted sessions bypass every predicate. A predicate answering `false`
//! or failing (for example a role lookup hitting a dead store) rejects the
//! request with a generic authorization error; the reason is logged but
//! never sent to the client.

/// Path → rights domain classification
pub mod domains;

/// Project-scoped document rules
pub mod project_data;

/// User profile rules
pub mod users;

/// Project document rules
pub mod projects;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::auth::ConnectSession;
use crate::backend::error::{BackendError, BackendResult};
use crate::shared::config::{RuleKind, SyncConfig};
use crate::shared::document::Snapshot;
use crate::shared::ot::DocOp;

pub use domains::DomainClassifier;
pub use project_data::ProjectDataRules;
pub use projects::ProjectRules;
pub use users::UserRules;

/// The four predicates guarding one collection
///
/// Implementations never see trusted sessions; `AccessControl` lets those
/// through before calling in.
#[async_trait]
pub trait CollectionRules: Send + Sync {
    async fn allow_create(&self, _doc_id: &str, _doc: &Snapshot, _session: &ConnectSession) -> BackendResult<bool> {
        Ok(false)
    }

    async fn allow_delete(&self, _doc_id: &str, _doc: &Snapshot, _session: &ConnectSession) -> BackendResult<bool> {
        Ok(false)
    }

    async fn allow_read(&self, doc_id: &str, doc: &Snapshot, session: &ConnectSession) -> BackendResult<bool>;

    async fn allow_update(
        &self,
        doc_id: &str,
        old: &Snapshot,
        new: &Snapshot,
        op: &DocOp,
        session: &ConnectSession,
    ) -> BackendResult<bool>;
}

/// Rules for collections nobody configured: trusted sessions only
#[derive(Debug, Default)]
pub struct TrustedOnlyRules;

#[async_trait]
impl CollectionRules for TrustedOnlyRules {
    async fn allow_read(&self, _doc_id: &str, _doc: &Snapshot, _session: &ConnectSession) -> BackendResult<bool> {
        Ok(false)
    }

    async fn allow_update(
        &self,
        _doc_id: &str,
        _old: &Snapshot,
        _new: &Snapshot,
        _op: &DocOp,
        _session: &ConnectSession,
    ) -> BackendResult<bool> {
        Ok(false)
    }
}

/// Rules for projections: the field whitelist is the protection, so anyone
/// may read, nobody may write
#[derive(Debug, Default)]
pub struct ProjectionRules;

#[async_trait]
impl CollectionRules for ProjectionRules {
    async fn allow_read(&self, _doc_id: &str, _doc: &Snapshot, _session: &ConnectSession) -> BackendResult<bool> {
        Ok(true)
    }

    async fn allow_update(
        &self,
        _doc_id: &str,
        _old: &Snapshot,
        _new: &Snapshot,
        _op: &DocOp,
        _session: &ConnectSession,
    ) -> BackendResult<bool> {
        Ok(false)
    }
}

/// Project id of a project-scoped document: the id prefix before the first `:`
pub fn project_id(doc_id: &str) -> &str {
    doc_id.split(':').next().unwrap_or(doc_id)
}

/// `ownerRef` of an entity, if it has one
pub fn owner_of(entity: Option<&Value>) -> Option<&str> {
    entity.and_then(|e| e.get("ownerRef")).and_then(Value::as_str)
}

/// Rule registry for every collection and projection
pub struct AccessControl {
    rules: HashMap<String, Arc<dyn CollectionRules>>,
    fallback: Arc<dyn CollectionRules>,
}

impl AccessControl {
    /// Build the registry from configuration
    pub fn from_config(config: &SyncConfig) -> Self {
        let rights = Arc::new(config.project_rights());
        let mut rules: HashMap<String, Arc<dyn CollectionRules>> = HashMap::new();

        for collection in &config.collections {
            let guard: Arc<dyn CollectionRules> = match collection.rules {
                Some(RuleKind::ProjectData) => Arc::new(ProjectDataRules::new(collection, rights.clone())),
                Some(RuleKind::Users) => Arc::new(UserRules::new(collection)),
                Some(RuleKind::Projects) => Arc::new(ProjectRules::new(collection)),
                None => Arc::new(TrustedOnlyRules),
            };
            rules.insert(collection.name.clone(), guard);
        }

        for projection in &config.projections {
            rules.insert(projection.name.clone(), Arc::new(ProjectionRules));
        }

        Self {
            rules,
            fallback: Arc::new(TrustedOnlyRules),
        }
    }

    /// Replace the rules of one collection
    pub fn with_rules(mut self, collection: impl Into<String>, rules: Arc<dyn CollectionRules>) -> Self {
        self.rules.insert(collection.into(), rules);
        self
    }

    fn rules_for(&self, collection: &str) -> &Arc<dyn CollectionRules> {
        self.rules.get(collection).unwrap_or(&self.fallback)
    }

    pub async fn check_read(
        &self,
        collection: &str,
        doc_id: &str,
        doc: &Snapshot,
        session: &ConnectSession,
    ) -> BackendResult<()> {
        if session.is_trusted() {
            return Ok(());
        }
        let verdict = self.rules_for(collection).allow_read(doc_id, doc, session).await;
        decide("read", collection, doc_id, session, verdict)
    }

    pub async fn check_create(
        &self,
        collection: &str,
        doc_id: &str,
        doc: &Snapshot,
        session: &ConnectSession,
    ) -> BackendResult<()> {
        if session.is_trusted() {
            return Ok(());
        }
        let verdict = self.rules_for(collection).allow_create(doc_id, doc, session).await;
        decide("create", collection, doc_id, session, verdict)
    }

    pub async fn check_delete(
        &self,
        collection: &str,
        doc_id: &str,
        doc: &Snapshot,
        session: &ConnectSession,
    ) -> BackendResult<()> {
        if session.is_trusted() {
            return Ok(());
        }
        let verdict = self.rules_for(collection).allow_delete(doc_id, doc, session).await;
        decide("delete", collection, doc_id, session, verdict)
    }

    pub async fn check_update(
        &self,
        collection: &str,
        doc_id: &str,
        old: &Snapshot,
        new: &Snapshot,
        op: &DocOp,
        session: &ConnectSession,
    ) -> BackendResult<()> {
        if session.is_trusted() {
            return Ok(());
        }
        let verdict = self
            .rules_for(collection)
            .allow_update(doc_id, old, new, op, session)
            .await;
        decide("update", collection, doc_id, session, verdict)
    }
}

impl std::fmt::Debug for AccessControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControl")
            .field("collections", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn decide(
    action: &str,
    collection: &str,
    doc_id: &str,
    session: &ConnectSession,
    verdict: BackendResult<bool>,
) -> BackendResult<()> {
    let user = session.user_id().unwrap_or("-");
    match verdict {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!("Denied {} on {}/{} for user {}", action, collection, doc_id, user);
            Err(BackendError::authorization(format!(
                "{} denied on {}/{} for user {}",
                action, collection, doc_id, user
            )))
        }
        Err(err) => {
            tracing::warn!(
                "Rule check for {} on {}/{} failed for user {}: {}",
                action,
                collection,
                doc_id,
                user,
                err
            );
            Err(BackendError::authorization(format!("{} check failed: {}", action, err)))
        }
    }
}
