//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shoptalk_shared::ChatError;

/// Application error type for the REST boundary
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Resource not found")]
    NotFound,
    #[error("Conversation is closed")]
    ConversationClosed,
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::ConversationClosed => {
                (StatusCode::CONFLICT, "CONVERSATION_CLOSED", self.to_string())
            }
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::ConversationClosed => ApiError::ConversationClosed,
            ChatError::ConversationNotFound | ChatError::IdentityNotFound => ApiError::NotFound,
            ChatError::Validation(msg) => ApiError::Validation(msg),
            ChatError::NotAuthorized => ApiError::Unauthorized,
            ChatError::IdentityUnresolved => {
                ApiError::Validation("identity not resolved".to_string())
            }
            ChatError::Transport(msg) => {
                tracing::error!(error = %msg, "Transport error surfaced at REST boundary");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
