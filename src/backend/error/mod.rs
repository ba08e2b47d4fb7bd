//! Backend Error Module
//!
//! This module defines error types specific to the backend server.
//! Errors travel to clients in two ways: as `{ code, message }` objects in
//! WebSocket `error` messages, and as JSON HTTP responses when the
//! handshake is refused.
//!
//! # Architecture
//!
//! - **`types`** - Error type definitions, constructors and code mapping
//! - **`conversion`** - `IntoResponse` implementation
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error type definitions
//! └── conversion.rs - Error conversion implementations
//! ```
//!
//! # Propagation
//!
//! Authorization and validation failures are reported to the originating
//! request only and never close the connection. Infrastructure failures are
//! reported as transient and never affect other connections.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

// Re-export commonly used types
pub use types::BackendError;

/// Result alias used throughout the backend
pub type BackendResult<T> = Result<T, BackendError>;
