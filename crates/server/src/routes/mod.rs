//! REST routes
//!
//! The thin request/response boundary around the chat subsystem: identity
//! issuance/promotion consumed by the customer bootstrap, the conversation
//! snapshot the operator console loads on mount, and health.

pub mod conversations;
pub mod health;
pub mod identities;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::websocket::{customer_ws_handler, operator_ws_handler};

/// Build the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/identities", post(identities::issue_identity))
        .route("/identities/:id/promote", post(identities::promote_identity))
        .route("/conversations", get(conversations::list_conversations))
        .route(
            "/conversations/:id/messages",
            get(conversations::list_messages),
        )
        .route("/ws/customer", get(customer_ws_handler))
        .route("/ws/operator", get(operator_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
