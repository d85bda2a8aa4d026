//! Client-side error types

use thiserror::Error;

/// Errors surfaced by the chat client.
///
/// Transport failures during a live session never reach the caller as
/// values; the session state machine absorbs them and the UI observes state
/// changes instead. These variants cover the request/response surfaces
/// (identity issuance, connect attempts, payload handling).
#[derive(Debug, Error)]
pub enum ChatClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Identity not resolved; chat is unavailable until it is")]
    IdentityUnresolved,

    /// The server rejected the handshake outright (operator token refused).
    /// Fatal for the session: retrying the same credentials cannot succeed.
    #[error("Not authorized")]
    NotAuthorized,

    #[error("Identity is already durable")]
    AlreadyDurable,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for client operations
pub type ChatClientResult<T> = Result<T, ChatClientError>;
