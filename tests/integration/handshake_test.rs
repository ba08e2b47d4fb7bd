//! Connection handshake against a mocked identity provider

use std::net::SocketAddr;

use crate::common::*;
use crate::assert_code;
use docsync::backend::error::types::CODE_AUTHENTICATION;
use docsync::backend::server::build_state;
use docsync::backend::server::AppState;

fn remote_peer() -> SocketAddr {
    "203.0.113.7:51000".parse().unwrap()
}

async fn state_with_idp(jwks_url: &str) -> (AppState, std::sync::Arc<docsync::backend::store::MemoryStore>) {
    let (builder, store) = backend_builder(config_with_jwks(jwks_url));
    let state = build_state(builder).await.expect("state builds");
    (state, store)
}

#[tokio::test]
async fn test_expired_token_refused_before_any_role_query() {
    let (_idp, jwks_url) = start_jwks_server().await;
    let (state, store) = state_with_idp(&jwks_url).await;
    seed_project(&state.backend, &[("u1", "own")]).await;
    let queries_before = store.query_count();

    let result = state
        .connect
        .authenticate(remote_peer(), Some(&expired_token("u1")))
        .await;

    assert_code!(result, CODE_AUTHENTICATION);
    assert_eq!(store.query_count(), queries_before);
}

#[tokio::test]
async fn test_valid_token_loads_project_roles() {
    let (_idp, jwks_url) = start_jwks_server().await;
    let (state, store) = state_with_idp(&jwks_url).await;
    seed_project(&state.backend, &[("u1", "own")]).await;
    let queries_before = store.query_count();

    let session = state
        .connect
        .authenticate(remote_peer(), Some(&user_token("u1")))
        .await
        .unwrap();

    assert!(!session.is_trusted());
    assert_eq!(session.user_id(), Some("u1"));
    assert_eq!(store.query_count(), queries_before + 1);
    assert_eq!(session.project_role(PROJECT).await.unwrap().as_deref(), Some("own"));
    assert_eq!(store.query_count(), queries_before + 1);
}

#[tokio::test]
async fn test_token_without_data_scope_refused() {
    let (_idp, jwks_url) = start_jwks_server().await;
    let (state, _store) = state_with_idp(&jwks_url).await;

    let result = state
        .connect
        .authenticate(remote_peer(), Some(&unscoped_token("u1")))
        .await;
    assert_code!(result, CODE_AUTHENTICATION);
}

#[tokio::test]
async fn test_forged_signature_refused() {
    let (_idp, jwks_url) = start_jwks_server().await;
    let (state, _store) = state_with_idp(&jwks_url).await;

    let token = user_token("u1");
    let (head, _signature) = token.rsplit_once('.').unwrap();
    let forged = format!("{}.{}", head, "c2lnbmF0dXJlLWZyb20tc29tZXdoZXJlLWVsc2U");

    let result = state.connect.authenticate(remote_peer(), Some(&forged)).await;
    assert_code!(result, CODE_AUTHENTICATION);
}

#[tokio::test]
async fn test_loopback_token_is_still_verified() {
    let (_idp, jwks_url) = start_jwks_server().await;
    let (state, _store) = state_with_idp(&jwks_url).await;
    let loopback: SocketAddr = "127.0.0.1:40000".parse().unwrap();

    assert!(state.connect.authenticate(loopback, None).await.unwrap().is_trusted());
    assert_code!(
        state.connect.authenticate(loopback, Some(&expired_token("u1"))).await,
        CODE_AUTHENTICATION
    );
}
