//! Shared Error Types
//!
//! This module defines error types that are shared between the backend and the
//! document adapters. These errors represent failures that can occur wherever
//! operations are parsed, applied or transformed, and wherever configuration is
//! loaded.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON serialization/deserialization failures
//! - `ValidationError` - Data validation failures
//! - `InvalidOp` - An operation that cannot be applied or transformed
//! - `ConfigError` - Configuration that failed to load or validate
//!
//! # Usage
//!
//! ```rust
//! use docsync::shared::error::SharedError;
//!
//! let error = SharedError::invalid_op("list index 4 out of bounds");
//! assert!(error.to_string().contains("out of bounds"));
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely shared across thread boundaries.
use thiserror::Error;

/// Shared error types that can occur in both the backend and the adapters
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// Operation could not be parsed, applied or transformed
    #[error("Invalid op: {message}")]
    InvalidOp {
        /// Human-readable error message
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {message}")]
    ConfigError {
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid operation error
    pub fn invalid_op(message: impl Into<String>) -> Self {
        Self::InvalidOp {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

/// Helper trait for converting serialization errors
impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

/// Result alias used by the shared algorithms
pub type SharedResult<T> = Result<T, SharedError>;
