/**
 * Backend Error Types
 *
 * This module defines error types specific to the backend server.
 * Every error maps to a wire code (sent in `{ code, message }` error
 * objects over the WebSocket) and an HTTP status (used for the handshake
 * and the health route).
 *
 * # Error Categories
 *
 * ## Authentication Errors (4001 / 401)
 *
 * - Missing, malformed or expired token
 * - Bad signature or unknown key id
 * - Missing required scope
 *
 * ## Authorization Errors (4003 / 403)
 *
 * A rule predicate denied the request. The wire message never carries the
 * internal reason.
 *
 * ## Conflict Errors (4009 / 409)
 *
 * The submit retry budget ran out, or a create/delete raced another one.
 *
 * ## Infrastructure Errors (5003 / 503)
 *
 * Store or JWKS endpoint unavailable. Transient; callers retry.
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::auth::AuthError;
use crate::backend::store::StoreError;
use crate::shared::protocol::ErrorObject;
use crate::shared::SharedError;

/// Wire code for malformed requests and invalid operations
pub const CODE_PROTOCOL: u16 = 4000;
/// Wire code for authentication failures
pub const CODE_AUTHENTICATION: u16 = 4001;
/// Wire code for authorization failures
pub const CODE_AUTHORIZATION: u16 = 4003;
/// Wire code for missing documents or collections
pub const CODE_NOT_FOUND: u16 = 4004;
/// Wire code for exhausted submit retries and lifecycle races
pub const CODE_CONFLICT: u16 = 4009;
/// Wire code for transient infrastructure failures
pub const CODE_INFRASTRUCTURE: u16 = 5003;

/// Backend-specific error types
///
/// # Usage
///
/// ```rust
/// use docsync::backend::error::BackendError;
///
/// let err = BackendError::authorization("answer a1 is owned by u2");
/// assert_eq!(err.code(), 4003);
/// assert_eq!(err.wire_message(), "Not authorized");
/// ```
#[derive(Debug, Error)]
pub enum BackendError {
    /// Token missing or rejected
    #[error("Authentication failed: {message}")]
    AuthenticationError {
        /// Human-readable error message
        message: String,
    },

    /// A rule predicate denied the request
    #[error("Not authorized: {message}")]
    AuthorizationError {
        /// Internal reason, logged but never sent to clients
        message: String,
    },

    /// Submit could not be rebased onto the current version
    #[error("Conflict: {message}")]
    ConflictError {
        /// Human-readable error message
        message: String,
    },

    /// Store or identity provider unavailable
    #[error("Infrastructure error: {message}")]
    InfrastructureError {
        /// Internal reason, logged but never sent to clients
        message: String,
    },

    /// Malformed request or operation
    #[error("Protocol error: {message}")]
    ProtocolError {
        /// Human-readable error message
        message: String,
    },

    /// Unknown collection or document
    #[error("Not found: {message}")]
    NotFoundError {
        /// Human-readable error message
        message: String,
    },

    /// Shared error (from shared module)
    #[error(transparent)]
    SharedError(#[from] SharedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a new authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::AuthenticationError {
            message: message.into(),
        }
    }

    /// Create a new authorization error
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::AuthorizationError {
            message: message.into(),
        }
    }

    /// Create a new conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ConflictError {
            message: message.into(),
        }
    }

    /// Create a new infrastructure error
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::InfrastructureError {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFoundError {
            message: message.into(),
        }
    }

    /// Wire error code
    pub fn code(&self) -> u16 {
        match self {
            Self::AuthenticationError { .. } => CODE_AUTHENTICATION,
            Self::AuthorizationError { .. } => CODE_AUTHORIZATION,
            Self::ConflictError { .. } => CODE_CONFLICT,
            Self::InfrastructureError { .. } => CODE_INFRASTRUCTURE,
            Self::ProtocolError { .. } => CODE_PROTOCOL,
            Self::NotFoundError { .. } => CODE_NOT_FOUND,
            Self::SharedError(err) => match err {
                SharedError::ConfigError { .. } => CODE_INFRASTRUCTURE,
                _ => CODE_PROTOCOL,
            },
            Self::SerializationError(_) => CODE_PROTOCOL,
        }
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - `AuthenticationError` - 401 Unauthorized
    /// - `AuthorizationError` - 403 Forbidden
    /// - `ConflictError` - 409 Conflict
    /// - `InfrastructureError` - 503 Service Unavailable
    /// - `ProtocolError` - 400 Bad Request
    /// - `NotFoundError` - 404 Not Found
    /// - `SharedError` - Depends on the shared error type
    /// - `SerializationError` - 400 Bad Request
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationError { .. } => StatusCode::UNAUTHORIZED,
            Self::AuthorizationError { .. } => StatusCode::FORBIDDEN,
            Self::ConflictError { .. } => StatusCode::CONFLICT,
            Self::InfrastructureError { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProtocolError { .. } => StatusCode::BAD_REQUEST,
            Self::NotFoundError { .. } => StatusCode::NOT_FOUND,
            Self::SharedError(err) => match err {
                SharedError::ConfigError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            Self::SerializationError(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the full error message, for logs
    pub fn message(&self) -> String {
        match self {
            Self::AuthenticationError { message }
            | Self::AuthorizationError { message }
            | Self::ConflictError { message }
            | Self::InfrastructureError { message }
            | Self::ProtocolError { message }
            | Self::NotFoundError { message } => message.clone(),
            Self::SharedError(err) => err.to_string(),
            Self::SerializationError(err) => err.to_string(),
        }
    }

    /// Message safe to send to clients
    pub fn wire_message(&self) -> String {
        match self {
            Self::AuthorizationError { .. } => "Not authorized".to_string(),
            Self::InfrastructureError { .. } => "Service temporarily unavailable".to_string(),
            Self::SharedError(SharedError::ConfigError { .. }) => "Service temporarily unavailable".to_string(),
            _ => self.message(),
        }
    }

    /// `{ code, message }` object for the wire
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code(),
            message: self.wire_message(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.code() == CODE_INFRASTRUCTURE
    }
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => Self::conflict(err.to_string()),
            StoreError::Corrupt { .. } => Self::infrastructure(err.to_string()),
            StoreError::Unavailable { .. } => Self::infrastructure(err.to_string()),
            StoreError::Database(_) => Self::infrastructure(err.to_string()),
        }
    }
}

impl From<AuthError> for BackendError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::JwksUnavailable { .. } => Self::infrastructure(err.to_string()),
            _ => Self::authentication(err.to_string()),
        }
    }
}
