//! Shoptalk Server Library
//!
//! Server side of the real-time support chat subsystem: the conversation
//! store (single writer of durable chat state), identity registry, presence
//! tracker, and the WebSocket routing/fan-out layer, plus the REST boundary
//! the operator console and the customer bootstrap consume.

pub mod config;
pub mod error;
pub mod identity;
pub mod presence;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
