//! Common chat types used across Shoptalk

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Conversation ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConversationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Message ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Session ID wrapper (one per open transport connection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Operator ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(pub Uuid);

impl OperatorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperatorId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OperatorId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Customer identity ID.
///
/// Temporary ids are generated client-side (`tmp-<millis>-<rand>`) before the
/// server has issued anything; durable ids are server-issued UUIDs. A string
/// id lets a conversation reference either form through promotion, which
/// rewrites the reference rather than creating a second identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    /// Generate a client-side temporary id (time + random suffix)
    pub fn temporary() -> Self {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let suffix: u32 = rand::random();
        Self(format!("tmp-{}-{:08x}", millis, suffix))
    }

    /// Issue a server-side durable id
    pub fn durable() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with("tmp-")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Whether an identity is still anonymous or has been registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Temporary,
    Durable,
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Operator,
    System,
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Operator => write!(f, "operator"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Conversation lifecycle status. The `Open -> Closed` transition is
/// irreversible; a new conversation must be created to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Closed,
}

/// Message delivery state as tracked by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Sent,
    Delivered,
}

/// Role of a connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Customer,
    Operator,
}

/// A typing/presence participant, keyed by whichever id space they live in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Participant {
    Customer { identity_id: IdentityId },
    Operator { operator_id: OperatorId },
}

// =============================================================================
// Models
// =============================================================================

/// Profile captured when a visitor registers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Customer identity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub kind: IdentityKind,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Identity {
    pub fn is_durable(&self) -> bool {
        self.kind == IdentityKind::Durable
    }
}

/// Conversation between one customer and (at most) one assigned operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub customer_identity_id: IdentityId,
    /// Advisory assignment, not an exclusive lock
    pub operator_id: Option<OperatorId>,
    pub status: ConversationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_message_at: OffsetDateTime,
    pub last_message_preview: Option<String>,
    pub unread_for_operator: u32,
    pub unread_for_customer: u32,
}

impl Conversation {
    pub fn is_closed(&self) -> bool {
        self.status == ConversationStatus::Closed
    }
}

/// A single chat message. Append-only once accepted by the store; `sequence`
/// is server-assigned, strictly increasing within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sequence: u64,
    pub sender: SenderType,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub delivery_state: DeliveryState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_id_shape() {
        let id = IdentityId::temporary();
        assert!(id.is_temporary());
        assert!(id.as_str().starts_with("tmp-"));

        let other = IdentityId::temporary();
        assert_ne!(id, other); // Random suffix keeps concurrent tabs apart
    }

    #[test]
    fn test_durable_id_is_not_temporary() {
        let id = IdentityId::durable();
        assert!(!id.is_temporary());
    }

    #[test]
    fn test_participant_serialization() {
        let p = Participant::Operator {
            operator_id: OperatorId::new(),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains(r#""role":"operator""#));
    }

    #[test]
    fn test_conversation_id_unique() {
        assert_ne!(ConversationId::new(), ConversationId::new());
    }
}
