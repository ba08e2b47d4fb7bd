/**
 * Connect Manager
 *
 * Runs the authentication half of the connection handshake and produces a
 * `ConnectSession`. Loopback peers that present no token are trusted server
 * links; every other connection must carry a valid access token. After a
 * token verifies, the user's project roles are loaded before the session is
 * returned, so a role-store outage refuses the connection instead of
 * producing a session that denies everything.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use crate::backend::auth::{AuthError, ConnectSession, ProjectRoleLoader, TokenVerifier};
use crate::backend::error::BackendResult;
use crate::shared::config::SyncConfig;
use crate::shared::error::SharedResult;

pub struct ConnectManager {
    verifier: TokenVerifier,
    loader: Arc<dyn ProjectRoleLoader>,
    trust_loopback: bool,
}

impl ConnectManager {
    pub fn new(config: &SyncConfig, loader: Arc<dyn ProjectRoleLoader>) -> SharedResult<Self> {
        Ok(Self {
            verifier: TokenVerifier::new(&config.auth)?,
            loader,
            trust_loopback: config.server.trust_loopback,
        })
    }

    /// Authenticate one inbound connection
    pub async fn authenticate(&self, peer: SocketAddr, token: Option<&str>) -> BackendResult<ConnectSession> {
        let token = match token {
            Some(token) => token,
            None if self.trust_loopback && peer.ip().is_loopback() => {
                tracing::debug!("Trusted server connection from {}", peer);
                return Ok(ConnectSession::trusted());
            }
            None => {
                tracing::warn!("Connection from {} without access token", peer);
                return Err(AuthError::MissingToken.into());
            }
        };

        let claims = self.verifier.verify(token).await.map_err(|e| {
            tracing::warn!("Rejected token from {}: {}", peer, e);
            e
        })?;

        let session = ConnectSession::end_user(claims.user_id, claims.role, self.loader.clone());
        if let ConnectSession::EndUser(user) = &session {
            user.project_roles.refresh().await?;
            tracing::info!(
                "User {} connected from {} with {} project roles",
                user.user_id,
                peer,
                user.project_roles.len()
            );
        }
        Ok(session)
    }
}

impl std::fmt::Debug for ConnectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectManager")
            .field("trust_loopback", &self.trust_loopback)
            .finish()
    }
}
