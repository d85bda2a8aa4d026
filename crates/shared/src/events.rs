//! Chat wire events and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Both the customer and the operator
//! namespaces speak this vocabulary over a single WebSocket connection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{
    Conversation, ConversationId, CustomerProfile, IdentityId, Message, Participant,
    SessionId,
};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Register or re-validate the customer identity for this transport
    RegisterIdentity {
        #[serde(skip_serializing_if = "Option::is_none")]
        temporary_id: Option<IdentityId>,
        #[serde(default)]
        profile: CustomerProfile,
    },

    /// Subscribe to a conversation; `since_sequence` requests incremental
    /// backfill instead of full history
    SubscribeConversation {
        conversation_id: ConversationId,
        #[serde(skip_serializing_if = "Option::is_none")]
        since_sequence: Option<u64>,
    },

    /// Send a message. `conversation_id` is omitted on the very first send,
    /// which auto-creates the conversation. `client_ref` ties the server's
    /// echo back to the optimistic pending entry in the sender's UI.
    SendMessage {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_ref: Option<Uuid>,
    },

    /// Start or stop the typing indicator for a conversation
    SetTyping {
        conversation_id: ConversationId,
        is_typing: bool,
    },

    /// Close a conversation (idempotent)
    CloseConversation { conversation_id: ConversationId },

    /// Request the operator conversation directory
    ListConversations {
        #[serde(default)]
        filter: ConversationFilter,
    },
}

/// Directory filter for `list_conversations`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationFilter {
    #[default]
    All,
    Assigned,
    Unassigned,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected { session_id: SessionId },

    /// The server does not know an identity for this transport; the client
    /// must (re)send `register_identity` before any chat action
    RequireInfo { reason: String },

    /// Identity registration accepted; `conversation_id` is the customer's
    /// open conversation when one already exists
    RegistrationAck {
        identity_id: IdentityId,
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },

    /// Ordered message history, full or incremental from `from_sequence`
    History {
        conversation_id: ConversationId,
        messages: Vec<Message>,
        from_sequence: u64,
    },

    /// New message appended to a conversation
    Message {
        conversation_id: ConversationId,
        message: Message,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_ref: Option<Uuid>,
    },

    /// Typing indicator changed
    Typing {
        conversation_id: ConversationId,
        participant: Participant,
        is_typing: bool,
    },

    /// Conversation transitioned to closed
    ConversationClosed { conversation_id: ConversationId },

    /// A conversation entered the operator directory (first customer message)
    NewConversationRequest { conversation: Conversation },

    /// Directory snapshot in `last_message_at` descending order
    ConversationList { conversations: Vec<Conversation> },

    /// Error scoped to the one request that caused it, never broadcast
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"type":"subscribe_conversation","conversation_id":"550e8400-e29b-41d4-a716-446655440000","since_sequence":7}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SubscribeConversation {
                conversation_id,
                since_sequence,
            } => {
                assert_eq!(
                    conversation_id.to_string(),
                    "550e8400-e29b-41d4-a716-446655440000"
                );
                assert_eq!(since_sequence, Some(7));
            }
            _ => panic!("Expected SubscribeConversation event"),
        }
    }

    #[test]
    fn test_send_message_without_conversation() {
        // First message of a visit carries no conversation id
        let json = r#"{"type":"send_message","content":"Hello"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage {
                conversation_id,
                content,
                client_ref,
            } => {
                assert!(conversation_id.is_none());
                assert!(client_ref.is_none());
                assert_eq!(content, "Hello");
            }
            _ => panic!("Expected SendMessage event"),
        }
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::RequireInfo {
            reason: "identity_required".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"type":"require_info","reason":"identity_required"}"#
        );
    }

    #[test]
    fn test_error_event_serialization() {
        let event = ServerEvent::Error {
            code: "CONVERSATION_CLOSED".to_string(),
            message: "Conversation is closed".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("CONVERSATION_CLOSED"));
        assert!(json.contains(r#""type":"error""#));
    }

    #[test]
    fn test_conversation_filter_default() {
        let json = r#"{"type":"list_conversations"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::ListConversations { filter } => {
                assert_eq!(filter, ConversationFilter::All);
            }
            _ => panic!("Expected ListConversations event"),
        }
    }
}
