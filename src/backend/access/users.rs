/**
 * User Profile Rules
 *
 * A user reads and edits their own profile; system admins read every
 * profile. Everyone else goes through the public profile projection.
 * Immutable templates cannot be touched by the profile owner.
 */

use async_trait::async_trait;

use crate::backend::access::CollectionRules;
use crate::backend::auth::ConnectSession;
use crate::backend::error::BackendResult;
use crate::shared::config::CollectionConfig;
use crate::shared::document::Snapshot;
use crate::shared::ot::DocOp;
use crate::shared::path_template::{match_template, PathTemplate};

pub struct UserRules {
    immutable: Vec<PathTemplate>,
}

impl UserRules {
    pub fn new(collection: &CollectionConfig) -> Self {
        Self {
            immutable: collection.immutable.clone(),
        }
    }
}

#[async_trait]
impl CollectionRules for UserRules {
    async fn allow_read(&self, doc_id: &str, doc: &Snapshot, session: &ConnectSession) -> BackendResult<bool> {
        Ok(!doc.exists() || session.system_role().is_system_admin() || session.user_id() == Some(doc_id))
    }

    async fn allow_update(
        &self,
        doc_id: &str,
        _old: &Snapshot,
        _new: &Snapshot,
        op: &DocOp,
        session: &ConnectSession,
    ) -> BackendResult<bool> {
        if session.user_id() != Some(doc_id) {
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
