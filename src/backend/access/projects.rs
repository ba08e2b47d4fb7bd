/**
 * Project Document Rules
 *
 * Members of a project (anyone with an entry in its `userRoles`) may read
 * it. System admins may edit anything in it; holders of the collection's
 * admin role may edit everything except the immutable templates.
 */

use async_trait::async_trait;

use crate::backend::access::CollectionRules;
use crate::backend::auth::ConnectSession;
use crate::backend::error::BackendResult;
use crate::shared::config::CollectionConfig;
use crate::shared::document::Snapshot;
use crate::shared::ot::DocOp;
use crate::shared::path_template::{match_template, PathTemplate};

pub struct ProjectRules {
    admin_role: Option<String>,
    immutable: Vec<PathTemplate>,
}

impl ProjectRules {
    pub fn new(collection: &CollectionConfig) -> Self {
        Self {
            admin_role: collection.admin_role.clone(),
            immutable: collection.immutable.clone(),
        }
    }
}

#[async_trait]
impl CollectionRules for ProjectRules {
    async fn allow_read(&self, doc_id: &str, doc: &Snapshot, session: &ConnectSession) -> BackendResult<bool> {
        if !doc.exists() || session.system_role().is_system_admin() {
            return Ok(true);
        }
        Ok(session.project_role(doc_id).await?.is_some())
    }

    async fn allow_update(
        &self,
        doc_id: &str,
        _old: &Snapshot,
        _new: &Snapshot,
        op: &DocOp,
        session: &ConnectSession,
    ) -> BackendResult<bool> {
        if session.system_role().is_system_admin() {
            return Ok(true);
        }

        let Some(admin_role) = &self.admin_role else {
            return Ok(false);
        };
        if session.project_role(doc_id).await?.as_deref() != Some(admin_role.as_str()) {
            return Ok(false);
        }

        Ok(match op {
            DocOp::Json0(components) => components
                .iter()
                .all(|component| match_template(&self.immutable, &component.path).is_none()),
            DocOp::RichText(_) => true,
        })
    }
}
