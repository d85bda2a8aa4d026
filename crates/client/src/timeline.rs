//! Conversation timeline with optimistic pending messages
//!
//! Confirmed messages are ordered and deduplicated by their server-assigned
//! sequence, so replays after reconnect (`history { from_sequence }`) merge
//! without duplicates or gaps. Outgoing messages sit in a pending list keyed
//! by `client_ref` until the server's `message` event echoes the ref back.

use time::OffsetDateTime;
use uuid::Uuid;

use shoptalk_shared::{ClientEvent, ConversationId, Message};

/// An optimistic message awaiting server confirmation.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub client_ref: Uuid,
    pub content: String,
    pub queued_at: OffsetDateTime,
}

/// Client-side view of one conversation's message log.
#[derive(Debug)]
pub struct ConversationTimeline {
    conversation_id: ConversationId,
    messages: Vec<Message>,
    pending: Vec<PendingMessage>,
}

impl ConversationTimeline {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    /// Highest confirmed sequence, for `subscribe_conversation { since_sequence }`.
    pub fn last_seen_sequence(&self) -> u64 {
        self.messages.last().map(|m| m.sequence).unwrap_or(0)
    }

    /// True when every confirmed sequence from 1 to the newest is present.
    pub fn is_contiguous(&self) -> bool {
        self.messages
            .iter()
            .enumerate()
            .all(|(i, m)| m.sequence == i as u64 + 1)
    }

    /// Stage an outgoing message and build the send event for it.
    pub fn stage(&mut self, content: impl Into<String>) -> ClientEvent {
        let content = content.into();
        let client_ref = Uuid::new_v4();
        self.pending.push(PendingMessage {
            client_ref,
            content: content.clone(),
            queued_at: OffsetDateTime::now_utc(),
        });
        ClientEvent::SendMessage {
            conversation_id: Some(self.conversation_id),
            content,
            client_ref: Some(client_ref),
        }
    }

    /// Merge a history backfill. Duplicates of already-confirmed sequences
    /// are dropped.
    pub fn apply_history(&mut self, messages: Vec<Message>) {
        for message in messages {
            self.insert(message);
        }
    }

    /// Apply a live `message` event. When the echoed `client_ref` matches a
    /// pending entry, that entry is confirmed and removed.
    pub fn apply_message(&mut self, message: Message, client_ref: Option<Uuid>) {
        if let Some(client_ref) = client_ref {
            self.pending.retain(|p| p.client_ref != client_ref);
        }
        self.insert(message);
    }

    fn insert(&mut self, message: Message) {
        if message.conversation_id != self.conversation_id {
            tracing::warn!(
                conversation_id = %message.conversation_id,
                "dropping message for another conversation"
            );
            return;
        }
        match self
            .messages
            .binary_search_by_key(&message.sequence, |m| m.sequence)
        {
            // Duplicate delivery (reconnect overlap); first copy wins
            Ok(_) => {}
            Err(pos) => self.messages.insert(pos, message),
        }
    }
}
