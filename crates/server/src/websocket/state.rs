//! Global WebSocket state management
//!
//! Maintains global state for all chat connections and conversation rooms,
//! shared by the customer and operator namespaces.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use shoptalk_shared::{ConversationId, ParticipantRole, ServerEvent, SessionId};

use super::connection::Connection;
use super::room::RoomManager;

/// Global chat transport state shared across all connections
#[derive(Clone)]
pub struct ChatState {
    /// All active connections indexed by session_id
    pub connections: Arc<RwLock<HashMap<SessionId, Arc<Connection>>>>,

    /// Room manager for conversation subscriptions
    pub rooms: Arc<RoomManager>,
}

impl ChatState {
    /// Create new chat transport state
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
        }
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            role = ?conn.role,
            total_connections = connections.len(),
            "Chat connection added"
        );

        conn
    }

    /// Remove a connection and its room subscriptions
    pub async fn remove_connection(&self, session_id: &SessionId) {
        let mut connections = self.connections.write().await;
        if connections.remove(session_id).is_some() {
            self.rooms.remove_connection(session_id).await;

            tracing::info!(
                session_id = %session_id,
                remaining_connections = connections.len(),
                "Chat connection removed"
            );
        }
    }

    /// Get a connection by session ID
    pub async fn get_connection(&self, session_id: &SessionId) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(session_id).cloned()
    }

    /// Deliver a directory event to every operator console.
    ///
    /// Operators watching the conversation list must see message/closure
    /// activity even for rooms they never subscribed to. When the same event
    /// was already fanned out to a room, pass that conversation so operators
    /// inside it are not delivered twice. Returns the number of recipients.
    pub async fn broadcast_to_operators(
        &self,
        event: ServerEvent,
        already_in_room: Option<&ConversationId>,
    ) -> usize {
        let operators: Vec<Arc<Connection>> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .filter(|c| c.role == ParticipantRole::Operator)
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        for conn in operators {
            if let Some(conversation_id) = already_in_room {
                if conn.is_subscribed(conversation_id).await {
                    continue;
                }
            }
            if conn.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Get statistics about the chat transport state
    pub async fn stats(&self) -> ChatStats {
        ChatStats {
            active_connections: self.connection_count().await,
            active_rooms: self.rooms.room_count().await,
        }
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about chat connections
#[derive(Debug, Clone)]
pub struct ChatStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Number of active conversation rooms
    pub active_rooms: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoptalk_shared::OperatorId;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let state = ChatState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = Connection::customer(tx);
        let session_id = conn.session_id;

        state.add_connection(conn).await;
        assert_eq!(state.connection_count().await, 1);

        state.remove_connection(&session_id).await;
        assert_eq!(state.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_operator_broadcast_skips_room_members() {
        let state = ChatState::new();
        let conversation_id = ConversationId::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        // Operator in the room, operator outside it, and a customer
        let inside = state
            .add_connection(Connection::operator(OperatorId::new(), tx1))
            .await;
        state
            .add_connection(Connection::operator(OperatorId::new(), tx2))
            .await;
        state.add_connection(Connection::customer(tx3)).await;

        inside.subscribe(conversation_id).await;

        let delivered = state
            .broadcast_to_operators(
                ServerEvent::ConversationClosed { conversation_id },
                Some(&conversation_id),
            )
            .await;

        assert_eq!(delivered, 1);
        assert!(rx1.try_recv().is_err()); // already covered by the room
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err()); // customers never get directory events
    }

    #[tokio::test]
    async fn test_stats() {
        let state = ChatState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        state.add_connection(Connection::customer(tx)).await;

        let stats = state.stats().await;
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.active_rooms, 0);
    }
}
