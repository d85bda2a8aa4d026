//! Shoptalk Shared Types
//!
//! This crate contains the chat data model, the client/server event
//! vocabulary, and the error taxonomy shared across the Shoptalk platform.

pub mod error;
pub mod events;
pub mod types;

pub use error::*;
pub use events::*;
pub use types::*;
