//! Shared Module
//!
//! This module contains the types and algorithms shared between the backend
//! and the document adapters. Nothing in here performs I/O; everything is
//! safe to call concurrently from many requests.
//!
//! # Overview
//!
//! - **`rights`** - project role → right code tables
//! - **`path_template`** - operation paths and the templates that classify them
//! - **`ot`** - JSON0 and rich-text operational transform types
//! - **`document`** - snapshots, op payloads and op log entries
//! - **`protocol`** - WebSocket request and response messages
//! - **`config`** - process-wide configuration
//! - **`error`** - shared error types

/// Shared error types
pub mod error;

/// Project rights model
pub mod rights;

/// Path template matching
pub mod path_template;

/// OT types
pub mod ot;

/// Documents and operations
pub mod document;

/// Wire protocol messages
pub mod protocol;

/// Sync engine configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::SyncConfig;
pub use document::{CommittedOp, DocKey, OpMetadata, OpPayload, RawOp, Snapshot};
pub use error::{SharedError, SharedResult};
pub use ot::{DocOp, OtType, Side};
pub use path_template::{match_template, Path, PathKey, PathTemplate};
pub use protocol::{ClientRequest, ErrorObject, ServerMessage};
pub use rights::{Operation, ProjectRights, SystemRole};
