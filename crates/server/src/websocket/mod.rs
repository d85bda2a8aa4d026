//! WebSocket support for real-time chat
//!
//! Provides the transport layer for the chat subsystem:
//! - **Connection**: one active transport session (customer or operator)
//! - **Room**: per-conversation pub/sub for broadcasting events
//! - **State**: global connection registry plus the operator console feed
//! - **Handler**: Axum WebSocket route handlers and event dispatch

pub mod connection;
pub mod handler;
pub mod room;
pub mod state;

pub use handler::{customer_ws_handler, operator_ws_handler};
pub use state::ChatState;
