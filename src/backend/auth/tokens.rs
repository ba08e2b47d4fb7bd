/**
 * Token Verification
 *
 * Verifies end-user access tokens: signature against the JWKS key named by
 * the header's `kid`, algorithm against the configured allow-list, audience,
 * expiry (with the library's default leeway), and presence of the required
 * scope. The user id and global role are read from configurable claims.
 */

use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::auth::{AuthError, AuthResult, JwksCache};
use crate::shared::config::AuthConfig;
use crate::shared::error::{SharedError, SharedResult};
use crate::shared::rights::SystemRole;

/// Identity extracted from a verified token
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    pub user_id: String,
    pub role: SystemRole,
}

/// Pull a bearer token from the `access_token` query parameter or the
/// `Authorization` header, in that order
pub fn extract_token(headers: &HeaderMap, access_token: Option<&str>) -> Option<String> {
    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Access token verifier
#[derive(Debug)]
pub struct TokenVerifier {
    jwks: Option<JwksCache>,
    algorithms: Vec<Algorithm>,
    config: AuthConfig,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> SharedResult<Self> {
        let algorithms = config
            .algorithms
            .iter()
            .map(|name| {
                Algorithm::from_str(name)
                    .map_err(|_| SharedError::config(format!("Unsupported token algorithm '{}'", name)))
            })
            .collect::<SharedResult<Vec<_>>>()?;

        let jwks = config
            .jwks_url
            .as_ref()
            .map(|url| JwksCache::new(url.clone(), Duration::from_secs(config.jwks_refresh_min_secs)));

        Ok(Self {
            jwks,
            algorithms,
            config: config.clone(),
        })
    }

    pub async fn verify(&self, token: &str) -> AuthResult<VerifiedClaims> {
        let jwks = self
            .jwks
            .as_ref()
            .ok_or_else(|| AuthError::invalid_token("no identity provider configured"))?;

        let header = decode_header(token)?;
        if !self.algorithms.contains(&header.alg) {
            return Err(AuthError::invalid_token(format!("algorithm {:?} not accepted", header.alg)));
        }

        let jwk = jwks.key(header.kid.as_deref()).await?;
        let key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.config.audience.as_str()]);

        let data = decode::<HashMap<String, Value>>(token, &key, &validation)?;
        let claims = data.claims;

        if !has_scope(claims.get(&self.config.scope_claim), &self.config.scope) {
            return Err(AuthError::MissingScope {
                scope: self.config.scope.clone(),
            });
        }

        let user_id = match claims.get(&self.config.user_id_claim) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(AuthError::MissingClaim {
                    claim: self.config.user_id_claim.clone(),
                })
            }
        };

        let role = claims
            .get(&self.config.role_claim)
            .and_then(Value::as_str)
            .map(SystemRole::from_claim)
            .unwrap_or(SystemRole::None);

        Ok(VerifiedClaims { user_id, role })
    }
}

/// Scope claims are either space-separated strings or arrays
fn has_scope(claim: Option<&Value>, required: &str) -> bool {
    match claim {
        Some(Value::String(scopes)) => scopes.split_whitespace().any(|s| s == required),
        Some(Value::Array(scopes)) => scopes.iter().any(|s| s.as_str() == Some(required)),
        _ => false,
    }
}
