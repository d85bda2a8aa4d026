//! Identity registry
//!
//! Server half of identity resolution: issues canonical customer records for
//! client-generated temporary ids and promotes them to durable identities on
//! registration. Promotion rewrites references; it never creates a second
//! identity row, and a retired temporary id is never reused.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use shoptalk_shared::{
    ChatError, ChatResult, CustomerProfile, Identity, IdentityId, IdentityKind,
};

use crate::store::ConversationStore;

pub struct IdentityRegistry {
    identities: RwLock<HashMap<IdentityId, Identity>>,
    /// Retired temporary id -> durable replacement, so a stale client still
    /// resolves to the promoted identity after reconnect
    promoted: RwLock<HashMap<IdentityId, IdentityId>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            promoted: RwLock::new(HashMap::new()),
        }
    }

    /// Register or re-validate an identity for a transport.
    ///
    /// A known id (including a retired temporary id) resolves to the existing
    /// record. An unknown temporary id gets a canonical temporary record. No
    /// id at all issues a durable identity directly.
    pub async fn register(
        &self,
        temporary_id: Option<IdentityId>,
        profile: &CustomerProfile,
    ) -> Identity {
        match temporary_id {
            Some(id) => {
                if let Some(existing) = self.get(&id).await {
                    return existing;
                }
                let identity = Identity {
                    id: id.clone(),
                    kind: if id.is_temporary() {
                        IdentityKind::Temporary
                    } else {
                        IdentityKind::Durable
                    },
                    display_name: profile.name.clone(),
                    email: profile.email.clone(),
                    phone: profile.phone.clone(),
                };
                let mut identities = self.identities.write().await;
                let identity = identities.entry(id).or_insert(identity).clone();
                tracing::info!(identity_id = %identity.id, kind = ?identity.kind, "Identity registered");
                identity
            }
            None => {
                let identity = Identity {
                    id: IdentityId::durable(),
                    kind: IdentityKind::Durable,
                    display_name: profile.name.clone(),
                    email: profile.email.clone(),
                    phone: profile.phone.clone(),
                };
                let mut identities = self.identities.write().await;
                identities.insert(identity.id.clone(), identity.clone());
                tracing::info!(identity_id = %identity.id, "Durable identity issued");
                identity
            }
        }
    }

    /// Exchange a temporary identity for a durable one, merging prior
    /// conversation history onto the new id. Idempotent for an
    /// already-promoted temporary id.
    pub async fn promote(
        &self,
        temporary_id: &IdentityId,
        profile: &CustomerProfile,
        store: &Arc<ConversationStore>,
    ) -> ChatResult<Identity> {
        {
            let promoted = self.promoted.read().await;
            if let Some(durable_id) = promoted.get(temporary_id) {
                let identities = self.identities.read().await;
                return identities
                    .get(durable_id)
                    .cloned()
                    .ok_or(ChatError::IdentityNotFound);
            }
        }

        let mut identities = self.identities.write().await;
        let existing = identities
            .get(temporary_id)
            .cloned()
            .ok_or(ChatError::IdentityNotFound)?;
        if existing.kind == IdentityKind::Durable {
            return Ok(existing);
        }

        let durable = Identity {
            id: IdentityId::durable(),
            kind: IdentityKind::Durable,
            display_name: profile.name.clone().or(existing.display_name),
            email: profile.email.clone().or(existing.email),
            phone: profile.phone.clone().or(existing.phone),
        };
        identities.remove(temporary_id);
        identities.insert(durable.id.clone(), durable.clone());
        drop(identities);

        {
            let mut promoted = self.promoted.write().await;
            promoted.insert(temporary_id.clone(), durable.id.clone());
        }

        let rewritten = store.rewrite_identity(temporary_id, &durable.id).await;
        tracing::info!(
            temporary_id = %temporary_id,
            durable_id = %durable.id,
            conversations = rewritten,
            "Identity promoted"
        );
        Ok(durable)
    }

    /// Resolve an id to its identity record, following promotion
    pub async fn get(&self, id: &IdentityId) -> Option<Identity> {
        let resolved = {
            let promoted = self.promoted.read().await;
            promoted.get(id).cloned().unwrap_or_else(|| id.clone())
        };
        let identities = self.identities.read().await;
        identities.get(&resolved).cloned()
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
