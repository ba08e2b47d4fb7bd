//! Server Module
//!
//! This module contains the server-side code for initializing and
//! configuring the Axum HTTP server.
//!
//! # Architecture
//!
//! - **`state`** - Application state structure and `FromRef` implementations
//! - **`config`** - Store selection from configuration
//! - **`init`** - Server initialization and app creation
//!
//! # Module Structure
//!
//! ```text
//! server/
//! ├── mod.rs    - Module exports and documentation
//! ├── state.rs  - AppState and FromRef implementations
//! ├── config.rs - Store loading (PostgreSQL or in-memory)
//! └── init.rs   - Server initialization and app creation
//! ```
//!
//! # Initialization Flow
//!
//! 1. **Store**: connect to PostgreSQL and migrate, or use the in-memory store
//! 2. **Backend**: rules from configuration plus registered hooks and migrations
//! 3. **Sessions**: `ConnectManager` over the projects collection
//! 4. **Schema**: run pending document migrations
//! 5. **Background Tasks**: resource monitor and channel cleanup
//! 6. **Router**: `/health` and `/ws`
//!
//! # Example
//!
//! ```rust,no_run
//! use docsync::backend::server::create_app;
//! use docsync::shared::SyncConfig;
//! use std::net::SocketAddr;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = create_app(SyncConfig::load()?).await?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5003").await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```

/// Application state
pub mod state;

/// Store loading
pub mod config;

/// Server initialization
pub mod init;

pub use init::{build_state, create_app, create_app_with};
pub use state::AppState;
