//! Test suite for docsync
//!
//! - `common` - JWKS mocks, token minting, fixtures and assertion macros
//! - `integration` - end-to-end flows through the backend and the WebSocket route
//! - `property` - proptest suites for the rights model, path templates and OT types

pub mod common;
#[cfg(feature = "ssr")]
pub mod integration;
pub mod property;
