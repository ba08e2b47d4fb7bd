//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Config and backend fixtures
//! - JWKS mock server and token minting
//! - Custom assertion macros

pub mod assertions;
#[cfg(feature = "ssr")]
pub mod auth_helpers;
#[cfg(feature = "ssr")]
pub mod fixtures;

#[cfg(feature = "ssr")]
pub use auth_helpers::*;
#[cfg(feature = "ssr")]
pub use fixtures::*;
