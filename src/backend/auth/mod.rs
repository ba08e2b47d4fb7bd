//! Authentication Module
//!
//! This module authenticates inbound connections and builds the security
//! context every later rule check reads.
//!
//! # Architecture
//!
//! - **`jwks`** - JSON Web Key Set fetch and cache, keyed by key id
//! - **`tokens`** - bearer token extraction and verification
//! - **`sessions`** - per-connection security context and project-role cache
//! - **`connect`** - handshake: trusted peer detection, verification, eager role load
//!
//! # Module Structure
//!
//! ```text
//! auth/
//! ├── mod.rs      - Module exports and error type
//! ├── jwks.rs     - JWKS cache
//! ├── tokens.rs   - Token verification
//! ├── sessions.rs - ConnectSession and ProjectRoleCache
//! └── connect.rs  - ConnectManager
//! ```
//!
//! # Authentication Flow
//!
//! 1. **Trusted peer**: loopback peer without a token → trusted server session
//! 2. **End user**: `?access_token=` (or `Authorization: Bearer`) → signature
//!    checked against the JWKS key named by `kid` → audience, expiry and
//!    scope validated → user id and role claims extracted
//! 3. **Roles**: every project naming the user in `userRoles` is loaded into
//!    the session's role cache before the connection is accepted
//!
//! Any failure refuses the connection with 401; no partial session exists.

/// JSON Web Key Set cache
pub mod jwks;

/// Bearer token verification
pub mod tokens;

/// Connection security context
pub mod sessions;

/// Connection handshake
pub mod connect;

use thiserror::Error;

pub use connect::ConnectManager;
pub use jwks::JwksCache;
pub use sessions::{ConnectSession, ProjectRoleCache, ProjectRoleLoader, StoreRoleLoader, UserSession};
pub use tokens::{extract_token, TokenVerifier, VerifiedClaims};

/// Authentication failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing access token")]
    MissingToken,

    #[error("invalid token: {message}")]
    InvalidToken { message: String },

    #[error("token expired")]
    Expired,

    #[error("token lacks required scope '{scope}'")]
    MissingScope { scope: String },

    #[error("token lacks claim '{claim}'")]
    MissingClaim { claim: String },

    #[error("no signing key with id '{kid}'")]
    UnknownKey { kid: String },

    /// The identity provider could not be reached
    #[error("JWKS unavailable: {message}")]
    JwksUnavailable { message: String },
}

impl AuthError {
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    pub fn jwks_unavailable(message: impl Into<String>) -> Self {
        Self::JwksUnavailable {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::invalid_token(err.to_string()),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
