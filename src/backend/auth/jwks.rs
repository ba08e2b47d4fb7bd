/**
 * JWKS Cache
 *
 * Signing keys fetched from the identity provider's JWKS endpoint, cached
 * by key id. A token naming an unknown key id triggers one refetch of the
 * whole set; refetches are serialized and throttled so a flood of tokens
 * with bogus key ids cannot hammer the provider.
 */

use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::backend::auth::{AuthError, AuthResult};

/// Key-id indexed cache over one JWKS endpoint
#[derive(Debug)]
pub struct JwksCache {
    url: String,
    client: reqwest::Client,
    keys: RwLock<HashMap<String, Jwk>>,
    /// Time of the last successful fetch; the lock also serializes fetches
    last_fetch: Mutex<Option<Instant>>,
    min_refresh: Duration,
}

impl JwksCache {
    pub fn new(url: impl Into<String>, min_refresh: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            keys: RwLock::new(HashMap::new()),
            last_fetch: Mutex::new(None),
            min_refresh,
        }
    }

    /// Resolve the key for a token header's `kid`
    ///
    /// A token without `kid` is accepted only while the set holds exactly one key.
    pub async fn key(&self, kid: Option<&str>) -> AuthResult<Jwk> {
        if let Some(jwk) = self.lookup(kid).await {
            return Ok(jwk);
        }

        let mut last_fetch = self.last_fetch.lock().await;

        // Another task may have refreshed while we waited
        if let Some(jwk) = self.lookup(kid).await {
            return Ok(jwk);
        }

        if let Some(at) = *last_fetch {
            if at.elapsed() < self.min_refresh {
                return Err(unknown(kid));
            }
        }

        let set = self.fetch().await?;
        *last_fetch = Some(Instant::now());

        let mut keys = self.keys.write().await;
        keys.clear();
        for (index, jwk) in set.keys.into_iter().enumerate() {
            let id = jwk.common.key_id.clone().unwrap_or_else(|| format!("#{}", index));
            keys.insert(id, jwk);
        }
        tracing::debug!("Loaded {} signing keys from {}", keys.len(), self.url);
        drop(keys);

        self.lookup(kid).await.ok_or_else(|| unknown(kid))
    }

    /// Number of cached keys
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    async fn lookup(&self, kid: Option<&str>) -> Option<Jwk> {
        let keys = self.keys.read().await;
        match kid {
            Some(kid) => keys.get(kid).cloned(),
            None if keys.len() == 1 => keys.values().next().cloned(),
            None => None,
        }
    }

    async fn fetch(&self) -> AuthResult<JwkSet> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AuthError::jwks_unavailable(format!("Failed to fetch {}: {}", self.url, e)))?;

        if !response.status().is_success() {
            return Err(AuthError::jwks_unavailable(format!(
                "{} answered {}",
                self.url,
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::jwks_unavailable(format!("Malformed key set from {}: {}", self.url, e)))
    }
}

fn unknown(kid: Option<&str>) -> AuthError {
    AuthError::UnknownKey {
        kid: kid.unwrap_or("<none>").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key_set() -> serde_json::Value {
        json!({"keys": [{"kty": "oct", "kid": "k1", "alg": "HS256", "k": "ZG9jc3luYy10ZXN0LXNpZ25pbmctc2VjcmV0LTAwMDAx"}]})
    }

    #[tokio::test]
    async fn test_fetches_on_first_use() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key_set()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = JwksCache::new(format!("{}/jwks", server.uri()), Duration::from_secs(30));
        assert!(cache.key(Some("k1")).await.is_ok());
        assert!(cache.key(Some("k1")).await.is_ok());
        assert!(cache.key(None).await.is_ok());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_refetch_is_throttled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key_set()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = JwksCache::new(format!("{}/jwks", server.uri()), Duration::from_secs(30));
        assert!(matches!(cache.key(Some("nope")).await, Err(AuthError::UnknownKey { .. })));
        assert!(matches!(cache.key(Some("nope")).await, Err(AuthError::UnknownKey { .. })));
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cache = JwksCache::new(format!("{}/jwks", server.uri()), Duration::from_secs(30));
        assert!(matches!(cache.key(Some("k1")).await, Err(AuthError::JwksUnavailable { .. })));
    }
}
