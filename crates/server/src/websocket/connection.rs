//! WebSocket connection management
//!
//! Represents an active transport connection (one Session in the data model)
//! with its role, resolved identity, and subscription tracking. A session is
//! created on connect and destroyed on disconnect; a reconnect always creates
//! a new one bound to the same identity.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use shoptalk_shared::{
    ConversationId, IdentityId, OperatorId, Participant, ParticipantRole, ServerEvent, SessionId,
};

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: SessionId,

    /// Which namespace this transport belongs to
    pub role: ParticipantRole,

    /// Operator id, present on operator-namespace connections only
    pub operator_id: Option<OperatorId>,

    /// Customer identity, resolved after `register_identity`
    identity: RwLock<Option<IdentityId>>,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Set of conversation IDs this connection is subscribed to
    pub subscriptions: Arc<RwLock<HashSet<ConversationId>>>,
}

impl Connection {
    /// Create a customer-namespace connection (identity arrives later)
    pub fn customer(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: SessionId::new(),
            role: ParticipantRole::Customer,
            operator_id: None,
            identity: RwLock::new(None),
            sender,
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Create an operator-namespace connection
    pub fn operator(operator_id: OperatorId, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: SessionId::new(),
            role: ParticipantRole::Operator,
            operator_id: Some(operator_id),
            identity: RwLock::new(None),
            sender,
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Resolved customer identity, if any
    pub async fn identity(&self) -> Option<IdentityId> {
        let identity = self.identity.read().await;
        identity.clone()
    }

    /// Bind the resolved identity to this transport
    pub async fn set_identity(&self, id: IdentityId) {
        let mut identity = self.identity.write().await;
        *identity = Some(id);
    }

    /// The typing/presence participant this connection speaks for
    pub async fn participant(&self) -> Option<Participant> {
        match self.role {
            ParticipantRole::Operator => self
                .operator_id
                .map(|operator_id| Participant::Operator { operator_id }),
            ParticipantRole::Customer => self
                .identity()
                .await
                .map(|identity_id| Participant::Customer { identity_id }),
        }
    }

    /// Subscribe to a conversation
    pub async fn subscribe(&self, conversation_id: ConversationId) {
        let mut subs = self.subscriptions.write().await;
        subs.insert(conversation_id);
        tracing::debug!(
            session_id = %self.session_id,
            conversation_id = %conversation_id,
            "Subscribed to conversation"
        );
    }

    /// Unsubscribe from a conversation
    pub async fn unsubscribe(&self, conversation_id: ConversationId) {
        let mut subs = self.subscriptions.write().await;
        subs.remove(&conversation_id);
        tracing::debug!(
            session_id = %self.session_id,
            conversation_id = %conversation_id,
            "Unsubscribed from conversation"
        );
    }

    /// Check if subscribed to a conversation
    pub async fn is_subscribed(&self, conversation_id: &ConversationId) -> bool {
        let subs = self.subscriptions.read().await;
        subs.contains(conversation_id)
    }
}
