//! Presence and typing tracker
//!
//! Ephemeral per-conversation typing signals. Nothing here touches the
//! conversation store; entries are latest-wins, overwritten by each signal,
//! and auto-expire after a short fixed timeout so a lost stop-event (e.g. a
//! sender disconnecting mid-keystroke) cannot leave a stuck indicator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use shoptalk_shared::{ConversationId, Participant, ServerEvent, SessionId};

use crate::websocket::room::RoomManager;

/// Fixed expiry for a typing signal with no follow-up. Not user-configurable.
pub const TYPING_TTL: Duration = Duration::from_secs(4);

struct TypingEntry {
    /// Bumped on every signal; an expiry task only fires for its own generation
    generation: u64,
}

/// Tracks who is typing in which conversation
pub struct PresenceTracker {
    entries: RwLock<HashMap<(ConversationId, Participant), TypingEntry>>,
    rooms: Arc<RoomManager>,
    ttl: Duration,
    next_generation: RwLock<u64>,
}

impl PresenceTracker {
    pub fn new(rooms: Arc<RoomManager>) -> Self {
        Self::with_ttl(rooms, TYPING_TTL)
    }

    /// Tracker with a custom expiry window (tests only; production uses the
    /// fixed TTL)
    pub fn with_ttl(rooms: Arc<RoomManager>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            rooms,
            ttl,
            next_generation: RwLock::new(0),
        }
    }

    /// Record a typing signal and fan it out to the conversation room,
    /// excluding the originating session (typing is never echoed to self).
    ///
    /// A `true` signal (re)arms the expiry: if no newer signal lands within
    /// the window, the entry is cleared and a synthetic stop is broadcast.
    pub async fn set_typing(
        self: &Arc<Self>,
        conversation_id: ConversationId,
        participant: Participant,
        is_typing: bool,
        originator: Option<SessionId>,
    ) {
        let generation = {
            let mut next = self.next_generation.write().await;
            *next += 1;
            *next
        };

        {
            let mut entries = self.entries.write().await;
            let key = (conversation_id, participant.clone());
            if is_typing {
                entries.insert(key, TypingEntry { generation });
            } else {
                entries.remove(&key);
            }
        }

        self.rooms
            .broadcast(
                &conversation_id,
                ServerEvent::Typing {
                    conversation_id,
                    participant: participant.clone(),
                    is_typing,
                },
                originator,
            )
            .await;

        if is_typing {
            let tracker = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(tracker.ttl).await;
                tracker
                    .expire(conversation_id, participant, generation)
                    .await;
            });
        }
    }

    /// Clear an expired signal and broadcast the synthetic stop, unless a
    /// newer signal superseded this generation in the meantime.
    async fn expire(
        &self,
        conversation_id: ConversationId,
        participant: Participant,
        generation: u64,
    ) {
        {
            let mut entries = self.entries.write().await;
            let key = (conversation_id, participant.clone());
            match entries.get(&key) {
                Some(entry) if entry.generation == generation => {
                    entries.remove(&key);
                }
                _ => return, // superseded or already stopped
            }
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            "Typing signal expired without stop-event; broadcasting synthetic stop"
        );
        self.rooms
            .broadcast(
                &conversation_id,
                ServerEvent::Typing {
                    conversation_id,
                    participant,
                    is_typing: false,
                },
                None,
            )
            .await;
    }

    /// Whether a participant currently shows as typing
    pub async fn is_typing(&self, conversation_id: &ConversationId, participant: &Participant) -> bool {
        let entries = self.entries.read().await;
        entries.contains_key(&(*conversation_id, participant.clone()))
    }
}
