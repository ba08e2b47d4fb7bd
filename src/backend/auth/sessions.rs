/**
 * Connection Security Context
 *
 * `ConnectSession` is the identity every rule check reads. Trusted server
 * connections bypass the rules entirely; end-user connections carry the
 * verified user id, the global role and a `ProjectRoleCache`.
 *
 * # Project Role Cache
 *
 * Owned by one connection and read-through: a lookup that misses reloads
 * the user's whole project-role map from the store and replaces the cache
 * (last writer wins). Staleness is tolerated until the next miss or an
 * explicit `invalidate`.
 */

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::backend::error::BackendResult;
use crate::backend::store::{DocQuery, DocStore};
use crate::path;
use crate::shared::rights::SystemRole;

/// Source of a user's project → role map
#[async_trait]
pub trait ProjectRoleLoader: Send + Sync {
    async fn load_roles(&self, user_id: &str) -> BackendResult<HashMap<String, String>>;
}

/// Loads roles from the `userRoles` map of every project document naming the user
pub struct StoreRoleLoader {
    store: Arc<dyn DocStore>,
    collection: String,
}

impl StoreRoleLoader {
    pub fn new(store: Arc<dyn DocStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl ProjectRoleLoader for StoreRoleLoader {
    async fn load_roles(&self, user_id: &str) -> BackendResult<HashMap<String, String>> {
        let query = DocQuery::all().exists(path!["userRoles", user_id]);
        let projects = self.store.query(&self.collection, &query).await?;

        let roles = projects
            .into_iter()
            .filter_map(|snapshot| {
                let role = snapshot
                    .data
                    .as_ref()
                    .and_then(|data| data.get("userRoles"))
                    .and_then(|roles| roles.get(user_id))
                    .and_then(Value::as_str)?
                    .to_string();
                Some((snapshot.id, role))
            })
            .collect();
        Ok(roles)
    }
}

/// Read-through project → role cache for one user
pub struct ProjectRoleCache {
    user_id: String,
    loader: Arc<dyn ProjectRoleLoader>,
    roles: RwLock<HashMap<String, String>>,
}

impl ProjectRoleCache {
    pub fn new(user_id: impl Into<String>, loader: Arc<dyn ProjectRoleLoader>) -> Self {
        Self {
            user_id: user_id.into(),
            loader,
            roles: RwLock::new(HashMap::new()),
        }
    }

    /// Reload the full map from the store
    pub async fn refresh(&self) -> BackendResult<()> {
        let roles = self.loader.load_roles(&self.user_id).await?;
        tracing::debug!("Loaded {} project roles for user {}", roles.len(), self.user_id);
        *self.roles.write().unwrap_or_else(|e| e.into_inner()) = roles;
        Ok(())
    }

    /// Role in a project, refreshing the whole map on a miss
    pub async fn get(&self, project_id: &str) -> BackendResult<Option<String>> {
        if let Some(role) = self.cached(project_id) {
            return Ok(Some(role));
        }
        self.refresh().await?;
        Ok(self.cached(project_id))
    }

    /// Cached role without touching the store
    pub fn cached(&self, project_id: &str) -> Option<String> {
        self.roles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(project_id)
            .cloned()
    }

    /// Drop every cached entry
    pub fn invalidate(&self) {
        self.roles.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.roles.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ProjectRoleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectRoleCache")
            .field("user_id", &self.user_id)
            .field("entries", &self.len())
            .finish()
    }
}

/// Verified end user
#[derive(Debug)]
pub struct UserSession {
    pub user_id: String,
    pub role: SystemRole,
    pub project_roles: ProjectRoleCache,
}

/// Security context of one connection
#[derive(Debug, Clone)]
pub enum ConnectSession {
    /// Server-side connection; bypasses every rule check
    Trusted { user_id: Option<String> },
    EndUser(Arc<UserSession>),
}

impl ConnectSession {
    pub fn trusted() -> Self {
        ConnectSession::Trusted { user_id: None }
    }

    pub fn end_user(user_id: impl Into<String>, role: SystemRole, loader: Arc<dyn ProjectRoleLoader>) -> Self {
        let user_id = user_id.into();
        ConnectSession::EndUser(Arc::new(UserSession {
            project_roles: ProjectRoleCache::new(user_id.clone(), loader),
            user_id,
            role,
        }))
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, ConnectSession::Trusted { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            ConnectSession::Trusted { user_id } => user_id.as_deref(),
            ConnectSession::EndUser(user) => Some(&user.user_id),
        }
    }

    pub fn system_role(&self) -> SystemRole {
        match self {
            ConnectSession::Trusted { .. } => SystemRole::None,
            ConnectSession::EndUser(user) => user.role.clone(),
        }
    }

    /// Caller's role in a project; trusted sessions have none
    pub async fn project_role(&self, project_id: &str) -> BackendResult<Option<String>> {
        match self {
            ConnectSession::Trusted { .. } => Ok(None),
            ConnectSession::EndUser(user) => user.project_roles.get(project_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
        roles: HashMap<String, String>,
    }

    #[async_trait]
    impl ProjectRoleLoader for CountingLoader {
        async fn load_roles(&self, _user_id: &str) -> BackendResult<HashMap<String, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.roles.clone())
        }
    }

    fn loader() -> Arc<CountingLoader> {
        Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            roles: HashMap::from([("p1".to_string(), "admin".to_string())]),
        })
    }

    #[tokio::test]
    async fn test_miss_refreshes_whole_map() {
        let loader = loader();
        let cache = ProjectRoleCache::new("u1", loader.clone());

        assert_eq!(cache.get("p1").await.unwrap().as_deref(), Some("admin"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.get("p1").await.unwrap().as_deref(), Some("admin"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.get("p9").await.unwrap(), None);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let loader = loader();
        let cache = ProjectRoleCache::new("u1", loader.clone());
        cache.refresh().await.unwrap();
        cache.invalidate();
        assert!(cache.is_empty());
        cache.get("p1").await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_trusted_session_has_no_project_role() {
        let session = ConnectSession::trusted();
        assert!(session.is_trusted());
        assert_eq!(session.project_role("p1").await.unwrap(), None);
        assert_eq!(session.user_id(), None);
    }
}
