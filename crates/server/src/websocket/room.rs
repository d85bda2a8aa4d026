//! Conversation room management for pub/sub
//!
//! Manages conversation "rooms" for broadcasting events to all subscribed
//! transports. Echo suppression is a per-event choice made by the caller:
//! message sends pass no exclusion (the sender's other tabs must see them),
//! typing indicators exclude the originating session.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use shoptalk_shared::{ConversationId, ServerEvent, SessionId};

use super::connection::Connection;

/// Manages conversation rooms for broadcasting events
pub struct RoomManager {
    /// Map of conversation_id -> list of connections
    rooms: Arc<RwLock<HashMap<ConversationId, Vec<Arc<Connection>>>>>,
}

impl RoomManager {
    /// Create a new room manager
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a conversation room
    pub async fn join(&self, conversation_id: ConversationId, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let conns = rooms.entry(conversation_id).or_insert_with(Vec::new);
        if !conns.iter().any(|c| c.session_id == conn.session_id) {
            conns.push(Arc::clone(&conn));
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            session_id = %conn.session_id,
            room_size = conns.len(),
            "Connection joined conversation room"
        );
    }

    /// Remove a connection from a conversation room
    pub async fn leave(&self, conversation_id: &ConversationId, session_id: &SessionId) {
        let mut rooms = self.rooms.write().await;
        if let Some(conns) = rooms.get_mut(conversation_id) {
            conns.retain(|c| c.session_id != *session_id);

            // Clean up empty rooms
            if conns.is_empty() {
                rooms.remove(conversation_id);
                tracing::debug!(
                    conversation_id = %conversation_id,
                    "Removed empty conversation room"
                );
            }
        }
    }

    /// Broadcast an event to all connections in a conversation room, except
    /// the excluded session when echo suppression is requested.
    ///
    /// Broadcasting to a conversation with zero subscribers is a legal no-op;
    /// durable state already lives in the store and surfaces on the next
    /// history fetch. Send errors are ignored (closed connections are cleaned
    /// up on disconnect). Returns how many transports received the event.
    pub async fn broadcast(
        &self,
        conversation_id: &ConversationId,
        event: ServerEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conns) = rooms.get(conversation_id) else {
            tracing::debug!(
                conversation_id = %conversation_id,
                "No subscribers for conversation; event dropped from fan-out"
            );
            return 0;
        };

        let mut delivered = 0;
        for conn in conns {
            if exclude == Some(conn.session_id) {
                continue;
            }
            match conn.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            recipients = delivered,
            "Broadcast event to conversation room"
        );
        delivered
    }

    /// Sessions currently subscribed to a conversation
    pub async fn subscribers(&self, conversation_id: &ConversationId) -> Vec<SessionId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(conversation_id)
            .map(|conns| conns.iter().map(|c| c.session_id).collect())
            .unwrap_or_default()
    }

    /// Remove a connection from all rooms (implicit unsubscribe on disconnect)
    pub async fn remove_connection(&self, session_id: &SessionId) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0;

        for conns in rooms.values_mut() {
            let before_len = conns.len();
            conns.retain(|c| c.session_id != *session_id);
            if conns.len() < before_len {
                removed_from += 1;
            }
        }

        // Clean up empty rooms
        rooms.retain(|_, conns| !conns.is_empty());

        if removed_from > 0 {
            tracing::debug!(
                session_id = %session_id,
                conversation_count = removed_from,
                "Removed connection from rooms"
            );
        }
    }

    /// Get room size (number of connections) for a conversation
    pub async fn room_size(&self, conversation_id: &ConversationId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(conversation_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Get total number of active rooms
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
