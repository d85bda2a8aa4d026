//! Conversation snapshot routes
//!
//! The operator console loads a full directory snapshot on mount and keeps it
//! consistent from the WebSocket broadcast stream afterwards.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shoptalk_shared::{Conversation, ConversationFilter, ConversationId, Message, OperatorId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub operator_id: Option<Uuid>,
    #[serde(default)]
    pub filter: ConversationFilter,
}

/// GET /conversations?operator_id=&filter=
pub async fn list_conversations(
    State(app_state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = app_state
        .store
        .list_conversations(query.filter, query.operator_id.map(OperatorId::from))
        .await;
    Ok(Json(conversations))
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub since_sequence: Option<u64>,
}

/// GET /conversations/:id/messages?since_sequence=
pub async fn list_messages(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = app_state
        .store
        .list_messages(&ConversationId::from(id), query.since_sequence)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(messages))
}
