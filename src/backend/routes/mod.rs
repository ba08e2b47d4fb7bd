//! Route Configuration Module
//!
//! This module configures the HTTP routes of the backend server.
//!
//! # Module Structure
//!
//! ```text
//! routes/
//! ├── mod.rs    - Module exports and documentation
//! ├── router.rs - Router creation
//! └── health.rs - Health endpoint
//! ```
//!
//! # Routes
//!
//! - `GET /health` - JSON status with connection and channel counts
//! - `GET /ws` - WebSocket upgrade; the token is checked before upgrading
//!   and a refused handshake answers `401` with a JSON error body

/// Router creation
pub mod router;

/// Health endpoint
pub mod health;

pub use router::create_router;
