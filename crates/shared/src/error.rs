//! Error taxonomy for the chat subsystem

use thiserror::Error;

/// Chat-level errors shared by the server store/router and the client.
///
/// Transport errors never escape the session state machine as values; they
/// surface as observable state changes. The remaining variants travel the
/// wire as `error { code, message }` events scoped to a single request.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Identity not resolved; chat actions are refused until it is")]
    IdentityUnresolved,

    #[error("Conversation is closed")]
    ConversationClosed,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("Identity not found")]
    IdentityNotFound,
}

impl ChatError {
    /// Stable wire code for `error` events
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::IdentityUnresolved => "IDENTITY_UNRESOLVED",
            Self::ConversationClosed => "CONVERSATION_CLOSED",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotAuthorized => "NOT_AUTHORIZED",
            Self::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            Self::IdentityNotFound => "IDENTITY_NOT_FOUND",
        }
    }
}

/// Result type alias for chat operations
pub type ChatResult<T> = Result<T, ChatError>;
