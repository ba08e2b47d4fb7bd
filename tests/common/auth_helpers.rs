//! Authentication test helpers
//!
//! A wiremock JWKS endpoint serving one HS256 key, and helpers that mint
//! access tokens signed with it.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Key id of the test signing key
pub const TEST_KID: &str = "k1";

/// Raw HS256 secret behind the served key
pub const TEST_SECRET: &[u8] = b"docsync-test-signing-secret-00001";

/// Base64url form of `TEST_SECRET`
const TEST_SECRET_B64: &str = "ZG9jc3luYy10ZXN0LXNpZ25pbmctc2VjcmV0LTAwMDAx";

pub const TEST_AUDIENCE: &str = "docsync";
pub const TEST_SCOPE: &str = "docsync:data";

pub fn key_set() -> Value {
    json!({"keys": [{"kty": "oct", "kid": TEST_KID, "alg": "HS256", "k": TEST_SECRET_B64}]})
}

/// Start a JWKS endpoint; returns the server and its key set URL
pub async fn start_jwks_server() -> (MockServer, String) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(key_set()))
        .mount(&server)
        .await;
    let url = format!("{}/.well-known/jwks.json", server.uri());
    (server, url)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Sign arbitrary claims with the test key
pub fn sign(claims: &Value) -> String {
    let mut header = Header::new(jsonwebtoken::Algorithm::HS256);
    header.kid = Some(TEST_KID.to_string());
    encode(&header, claims, &EncodingKey::from_secret(TEST_SECRET)).expect("Failed to sign test token")
}

/// A valid token for `user_id`
pub fn user_token(user_id: &str) -> String {
    sign(&json!({
        "sub": user_id,
        "aud": TEST_AUDIENCE,
        "scope": TEST_SCOPE,
        "role": "user",
        "iat": now(),
        "exp": now() + 3600,
    }))
}

/// A token that expired an hour ago, well outside the validation leeway
pub fn expired_token(user_id: &str) -> String {
    sign(&json!({
        "sub": user_id,
        "aud": TEST_AUDIENCE,
        "scope": TEST_SCOPE,
        "iat": now() - 7200,
        "exp": now() - 3600,
    }))
}

/// A valid token lacking the data scope
pub fn unscoped_token(user_id: &str) -> String {
    sign(&json!({
        "sub": user_id,
        "aud": TEST_AUDIENCE,
        "scope": "openid profile",
        "exp": now() + 3600,
    }))
}

/// Create authorization header value
pub fn auth_header(token: &str) -> String {
    format!("Bearer {}", token)
}
