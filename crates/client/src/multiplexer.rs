//! Operator console directory
//!
//! [`OperatorDirectory`] is a pure reducer over the operator's event stream:
//! the console loads a snapshot, then folds in `message`,
//! `new_conversation_request` and `conversation_closed` events. State here is
//! derivable and disposable; dropping it and reloading the snapshot is always
//! safe.

use shoptalk_shared::{
    Conversation, ConversationId, ConversationStatus, SenderType, ServerEvent,
};

const PREVIEW_CHARS: usize = 80;

/// One directory row as the console renders it.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    /// Unread count from this console's perspective, reset by `open`.
    pub unread: u32,
    /// Highest sequence this console has observed, for backfill subscribes.
    pub last_seen_sequence: u64,
}

#[derive(Debug, Default)]
pub struct OperatorDirectory {
    entries: Vec<ConversationSummary>,
    active: Option<ConversationId>,
}

impl OperatorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ConversationSummary] {
        &self.entries
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    pub fn get(&self, id: ConversationId) -> Option<&ConversationSummary> {
        self.entries.iter().find(|e| e.conversation.id == id)
    }

    /// Replace the directory with a REST snapshot (already ordered by
    /// `last_message_at` descending). Unread counters carry over from the
    /// server's operator-side counts.
    pub fn load_snapshot(&mut self, conversations: Vec<Conversation>) {
        self.entries = conversations
            .into_iter()
            .map(|conversation| ConversationSummary {
                unread: conversation.unread_for_operator,
                last_seen_sequence: 0,
                conversation,
            })
            .collect();
        self.sort();
    }

    /// Fold one server event into the directory.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Message {
                conversation_id,
                message,
                ..
            } => {
                let active = self.active;
                let Some(entry) = self.entry_mut(*conversation_id) else {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        "message for unknown conversation ignored"
                    );
                    return;
                };
                entry.conversation.last_message_at = message.sent_at;
                entry.conversation.last_message_preview =
                    Some(message.content.chars().take(PREVIEW_CHARS).collect());
                entry.last_seen_sequence = entry.last_seen_sequence.max(message.sequence);
                // Only customer messages on background conversations count
                // as unread; the active conversation is on screen.
                if message.sender == SenderType::Customer && active != Some(*conversation_id) {
                    entry.unread += 1;
                }
                self.sort();
            }
            ServerEvent::NewConversationRequest { conversation } => {
                if self.get(conversation.id).is_some() {
                    return;
                }
                self.entries.insert(
                    0,
                    ConversationSummary {
                        unread: conversation.unread_for_operator,
                        last_seen_sequence: 0,
                        conversation: conversation.clone(),
                    },
                );
            }
            ServerEvent::ConversationClosed { conversation_id } => {
                // Entry stays visible so the console can show the outcome
                if let Some(entry) = self.entry_mut(*conversation_id) {
                    entry.conversation.status = ConversationStatus::Closed;
                }
            }
            ServerEvent::ConversationList { conversations } => {
                self.load_snapshot(conversations.clone());
            }
            _ => {}
        }
    }

    /// Make a conversation active: zeroes its unread count and returns the
    /// subscribe command (with `since_sequence` for backfill) to send.
    pub fn open(&mut self, id: ConversationId) -> Option<shoptalk_shared::ClientEvent> {
        let entry = self.entry_mut(id)?;
        entry.unread = 0;
        let since_sequence = entry.last_seen_sequence;
        self.active = Some(id);
        Some(shoptalk_shared::ClientEvent::SubscribeConversation {
            conversation_id: id,
            since_sequence: Some(since_sequence),
        })
    }

    fn entry_mut(&mut self, id: ConversationId) -> Option<&mut ConversationSummary> {
        self.entries.iter_mut().find(|e| e.conversation.id == id)
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| b.conversation.last_message_at.cmp(&a.conversation.last_message_at));
    }
}
