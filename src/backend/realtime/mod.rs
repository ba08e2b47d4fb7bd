//! Real-time Transport Module
//!
//! This module carries committed operations from the submit pipeline to
//! every subscriber, and bridges WebSocket peers onto logical connections.
//!
//! # Architecture
//!
//! - **`broadcast`** - `PubSub`, one `tokio::sync::broadcast` channel per
//!   document
//! - **`ws`** - `GET /ws` handshake, authentication and socket tasks
//!
//! # Module Structure
//!
//! ```text
//! realtime/
//! ├── mod.rs       - Module exports and documentation
//! ├── broadcast.rs - Per-document op channels
//! └── ws.rs        - WebSocket handler
//! ```
//!
//! # Delivery
//!
//! Ops are published in commit order. A subscriber that falls behind the
//! channel capacity does not lose ops; its `Subscription` rereads the gap
//! from the store. A subscriber never receives an op that was rejected.

/// Per-document op broadcasting
pub mod broadcast;

/// WebSocket handler
pub mod ws;

pub use broadcast::{OpEvent, PubSub, DEFAULT_CHANNEL_CAPACITY};
pub use ws::ws_handler;
