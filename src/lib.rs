//! # gatekeep
//!
//! The request-processing pipeline of an Axum API server:
//!
//! - **Recovery**: Handler panics become `500` and the connection is closed
//! - **Rate limiting**: Per-client token buckets with idle eviction
//! - **Authentication**: Bearer tokens resolved to a typed [`Identity`]
//! - **Authorization**: Authenticated / activated / permission gates per route
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Recovery → Rate Limit → Authenticate → Gates               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers                                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UserLookup / PermissionLookup (MemoryStore or your own)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! use gatekeep::{AppState, Config, MemoryStore, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(MemoryStore::new());
//!     let state = AppState::new(config, store.clone(), store);
//!     state.spawn_background_tasks();
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:4000").await?;
//!     let app = build_router(state.clone());
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//!
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! The router must be served with connect info so the rate limiter can see
//! each client's address.

pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

// Re-exports for convenience
pub use config::{Config, LimiterConfig};
pub use error::{AppError, AppResult, StoreError};
pub use identity::{Identity, Permissions, User};
pub use routes::{build_router, compose};
pub use state::AppState;
pub use store::{MemoryStore, PermissionLookup, UserLookup};
