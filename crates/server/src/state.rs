//! Shared application state

use std::sync::Arc;

use crate::config::Config;
use crate::identity::IdentityRegistry;
use crate::presence::PresenceTracker;
use crate::store::ConversationStore;
use crate::websocket::ChatState;

/// Application state shared across REST handlers and WebSocket sessions
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ConversationStore>,
    pub identities: Arc<IdentityRegistry>,
    pub chat: ChatState,
    pub presence: Arc<PresenceTracker>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let chat = ChatState::new();
        let presence = Arc::new(PresenceTracker::new(Arc::clone(&chat.rooms)));
        Self {
            config: Arc::new(config),
            store: Arc::new(ConversationStore::new()),
            identities: Arc::new(IdentityRegistry::new()),
            chat,
            presence,
        }
    }
}
