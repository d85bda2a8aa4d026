//! Conversation store
//!
//! Server-side source of truth for conversations: ordered message log,
//! participant references, status, and unread counters. The store is the
//! single writer of durable chat state; everything else observes it through
//! these operations.
//!
//! Sequence assignment is the one place requiring explicit mutual exclusion:
//! each conversation lives behind its own `Mutex`, so concurrent sends on the
//! same conversation serialize while different conversations proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use shoptalk_shared::{
    ChatError, ChatResult, Conversation, ConversationFilter, ConversationId, ConversationStatus,
    DeliveryState, IdentityId, Message, MessageId, OperatorId, ParticipantRole, SenderType,
};

/// Preview length stored alongside a conversation for directory rows
const PREVIEW_CHARS: usize = 80;

struct ConversationEntry {
    meta: Conversation,
    /// Append-only; index + 1 equals the message sequence
    log: Vec<Message>,
}

/// In-memory conversation store with per-conversation append serialization
pub struct ConversationStore {
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<ConversationEntry>>>>,
    /// Open conversation per customer identity, for find-or-create on first send
    open_by_customer: RwLock<HashMap<IdentityId, ConversationId>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            open_by_customer: RwLock::new(HashMap::new()),
        }
    }

    /// Look up the customer's open conversation, if any
    pub async fn open_for_customer(&self, identity_id: &IdentityId) -> Option<Conversation> {
        let id = {
            let index = self.open_by_customer.read().await;
            index.get(identity_id).copied()?
        };
        self.get(&id).await
    }

    /// Find the customer's open conversation or create one. Returns the
    /// conversation and whether it was newly created.
    pub async fn find_or_create_for_customer(
        &self,
        identity_id: &IdentityId,
    ) -> (Conversation, bool) {
        if let Some(existing) = self.open_for_customer(identity_id).await {
            return (existing, false);
        }

        let now = OffsetDateTime::now_utc();
        let meta = Conversation {
            id: ConversationId::new(),
            customer_identity_id: identity_id.clone(),
            operator_id: None,
            status: ConversationStatus::Open,
            created_at: now,
            last_message_at: now,
            last_message_preview: None,
            unread_for_operator: 0,
            unread_for_customer: 0,
        };
        let id = meta.id;

        let entry = Arc::new(Mutex::new(ConversationEntry {
            meta: meta.clone(),
            log: Vec::new(),
        }));

        {
            let mut conversations = self.conversations.write().await;
            let mut index = self.open_by_customer.write().await;
            // Double-check under the write locks; another session of the same
            // customer may have created one meanwhile
            if let Some(existing_id) = index.get(identity_id).copied() {
                if let Some(existing) = conversations.get(&existing_id) {
                    let meta = existing.lock().await.meta.clone();
                    return (meta, false);
                }
            }
            conversations.insert(id, entry);
            index.insert(identity_id.clone(), id);
        }

        tracing::info!(
            conversation_id = %id,
            customer = %identity_id,
            "Conversation created"
        );
        (meta, true)
    }

    async fn entry(&self, id: &ConversationId) -> ChatResult<Arc<Mutex<ConversationEntry>>> {
        let conversations = self.conversations.read().await;
        conversations
            .get(id)
            .cloned()
            .ok_or(ChatError::ConversationNotFound)
    }

    /// Append a message, assigning the next sequence number atomically for
    /// this conversation. Rejects sends into a closed conversation.
    pub async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender: SenderType,
        content: &str,
    ) -> ChatResult<Message> {
        let entry = self.entry(conversation_id).await?;
        let mut entry = entry.lock().await;

        if entry.meta.is_closed() {
            return Err(ChatError::ConversationClosed);
        }

        let sequence = entry.log.len() as u64 + 1;
        let message = Message {
            id: MessageId::new(),
            conversation_id: *conversation_id,
            sequence,
            sender,
            content: content.to_string(),
            sent_at: OffsetDateTime::now_utc(),
            delivery_state: DeliveryState::Sent,
        };

        entry.meta.last_message_at = message.sent_at;
        entry.meta.last_message_preview = Some(preview(content));
        match sender {
            SenderType::Customer => entry.meta.unread_for_operator += 1,
            SenderType::Operator => entry.meta.unread_for_customer += 1,
            SenderType::System => {}
        }
        entry.log.push(message.clone());

        tracing::debug!(
            conversation_id = %conversation_id,
            sequence,
            sender = %sender,
            "Message appended"
        );
        Ok(message)
    }

    /// Ordered messages, full history or incremental backfill after
    /// `since_sequence`
    pub async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        since_sequence: Option<u64>,
    ) -> ChatResult<Vec<Message>> {
        let entry = self.entry(conversation_id).await?;
        let entry = entry.lock().await;
        let since = since_sequence.unwrap_or(0);
        Ok(entry
            .log
            .iter()
            .filter(|m| m.sequence > since)
            .cloned()
            .collect())
    }

    /// Conversation metadata snapshot
    pub async fn get(&self, conversation_id: &ConversationId) -> Option<Conversation> {
        let entry = self.entry(conversation_id).await.ok()?;
        let entry = entry.lock().await;
        Some(entry.meta.clone())
    }

    /// Directory listing for the operator console, ordered by
    /// `last_message_at` descending
    pub async fn list_conversations(
        &self,
        filter: ConversationFilter,
        operator_id: Option<OperatorId>,
    ) -> Vec<Conversation> {
        let entries: Vec<_> = {
            let conversations = self.conversations.read().await;
            conversations.values().cloned().collect()
        };

        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let meta = entry.lock().await.meta.clone();
            let keep = match filter {
                ConversationFilter::All => true,
                ConversationFilter::Unassigned => meta.operator_id.is_none(),
                ConversationFilter::Assigned => {
                    meta.operator_id.is_some()
                        && (operator_id.is_none() || meta.operator_id == operator_id)
                }
            };
            if keep {
                result.push(meta);
            }
        }
        result.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        result
    }

    /// Close a conversation. Idempotent: closing an already-closed
    /// conversation is a no-op. Returns whether this call did the transition,
    /// so the router broadcasts the closure exactly once.
    pub async fn close(
        &self,
        conversation_id: &ConversationId,
        closed_by: SenderType,
    ) -> ChatResult<bool> {
        let entry = self.entry(conversation_id).await?;
        let mut entry = entry.lock().await;
        if entry.meta.is_closed() {
            return Ok(false);
        }
        entry.meta.status = ConversationStatus::Closed;

        let customer = entry.meta.customer_identity_id.clone();
        drop(entry);
        let mut index = self.open_by_customer.write().await;
        if index.get(&customer) == Some(conversation_id) {
            index.remove(&customer);
        }

        tracing::info!(
            conversation_id = %conversation_id,
            closed_by = %closed_by,
            "Conversation closed"
        );
        Ok(true)
    }

    /// Advisory claim: assigns the operator when nobody holds the
    /// conversation yet. An existing assignment is left untouched.
    pub async fn assign(
        &self,
        conversation_id: &ConversationId,
        operator_id: OperatorId,
    ) -> ChatResult<Conversation> {
        let entry = self.entry(conversation_id).await?;
        let mut entry = entry.lock().await;
        if entry.meta.operator_id.is_none() {
            entry.meta.operator_id = Some(operator_id);
            tracing::info!(
                conversation_id = %conversation_id,
                operator_id = %operator_id,
                "Conversation assigned"
            );
        }
        Ok(entry.meta.clone())
    }

    /// Zero one side's unread counter (called when that side opens the
    /// conversation)
    pub async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        viewer: ParticipantRole,
    ) -> ChatResult<Conversation> {
        let entry = self.entry(conversation_id).await?;
        let mut entry = entry.lock().await;
        match viewer {
            ParticipantRole::Customer => entry.meta.unread_for_customer = 0,
            ParticipantRole::Operator => entry.meta.unread_for_operator = 0,
        }
        Ok(entry.meta.clone())
    }

    /// Flip delivery state once the router reached at least one transport
    /// other than the sender's. Touches delivery metadata only; content and
    /// ordering stay immutable.
    pub async fn mark_delivered(
        &self,
        conversation_id: &ConversationId,
        sequence: u64,
    ) -> ChatResult<()> {
        let entry = self.entry(conversation_id).await?;
        let mut entry = entry.lock().await;
        if let Some(message) = entry
            .log
            .iter_mut()
            .find(|m| m.sequence == sequence)
        {
            message.delivery_state = DeliveryState::Delivered;
        }
        Ok(())
    }

    /// Rewrite conversation references from a temporary identity to its
    /// durable replacement (identity promotion merges history this way;
    /// no second identity row is ever created). Returns how many
    /// conversations were rewritten.
    pub async fn rewrite_identity(&self, from: &IdentityId, to: &IdentityId) -> usize {
        let entries: Vec<_> = {
            let conversations = self.conversations.read().await;
            conversations.values().cloned().collect()
        };

        let mut rewritten = 0;
        for entry in entries {
            let mut entry = entry.lock().await;
            if entry.meta.customer_identity_id == *from {
                entry.meta.customer_identity_id = to.clone();
                rewritten += 1;
            }
        }

        let mut index = self.open_by_customer.write().await;
        if let Some(id) = index.remove(from) {
            index.insert(to.clone(), id);
        }

        if rewritten > 0 {
            tracing::info!(
                from = %from,
                to = %to,
                conversations = rewritten,
                "Identity references rewritten"
            );
        }
        rewritten
    }

    /// Number of conversations held (for stats/logging)
    pub async fn conversation_count(&self) -> usize {
        let conversations = self.conversations.read().await;
        conversations.len()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        content.chars().take(PREVIEW_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_conversation(store: &ConversationStore) -> ConversationId {
        let identity = IdentityId::temporary();
        let (conv, created) = store.find_or_create_for_customer(&identity).await;
        assert!(created);
        conv.id
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_sequences() {
        let store = ConversationStore::new();
        let id = new_conversation(&store).await;

        for expected in 1..=5u64 {
            let msg = store
                .append_message(&id, SenderType::Customer, "hello")
                .await
                .unwrap();
            assert_eq!(msg.sequence, expected);
        }
    }

    #[tokio::test]
    async fn test_find_or_create_reuses_open_conversation() {
        let store = ConversationStore::new();
        let identity = IdentityId::temporary();

        let (first, created) = store.find_or_create_for_customer(&identity).await;
        assert!(created);
        let (second, created) = store.find_or_create_for_customer(&identity).await;
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_closed_conversation_rejects_sends() {
        let store = ConversationStore::new();
        let id = new_conversation(&store).await;

        assert!(store.close(&id, SenderType::Operator).await.unwrap());
        // Idempotent: second close is a no-op, not an error
        assert!(!store.close(&id, SenderType::Operator).await.unwrap());

        let err = store
            .append_message(&id, SenderType::Customer, "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ConversationClosed));
    }

    #[tokio::test]
    async fn test_close_frees_customer_for_new_conversation() {
        let store = ConversationStore::new();
        let identity = IdentityId::temporary();

        let (first, _) = store.find_or_create_for_customer(&identity).await;
        store.close(&first.id, SenderType::Operator).await.unwrap();

        let (second, created) = store.find_or_create_for_customer(&identity).await;
        assert!(created);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_unread_counters_and_preview() {
        let store = ConversationStore::new();
        let id = new_conversation(&store).await;

        store
            .append_message(&id, SenderType::Customer, "Hello")
            .await
            .unwrap();
        store
            .append_message(&id, SenderType::Customer, "Anyone there?")
            .await
            .unwrap();

        let meta = store.get(&id).await.unwrap();
        assert_eq!(meta.unread_for_operator, 2);
        assert_eq!(meta.unread_for_customer, 0);
        assert_eq!(meta.last_message_preview.as_deref(), Some("Anyone there?"));

        store
            .append_message(&id, SenderType::Operator, "Hi, how can I help?")
            .await
            .unwrap();
        let meta = store.get(&id).await.unwrap();
        assert_eq!(meta.unread_for_customer, 1);

        let meta = store.mark_read(&id, ParticipantRole::Operator).await.unwrap();
        assert_eq!(meta.unread_for_operator, 0);
        assert_eq!(meta.unread_for_customer, 1);
    }

    #[tokio::test]
    async fn test_preview_truncates_long_content() {
        let store = ConversationStore::new();
        let id = new_conversation(&store).await;

        let long = "x".repeat(200);
        store
            .append_message(&id, SenderType::Customer, &long)
            .await
            .unwrap();
        let meta = store.get(&id).await.unwrap();
        assert_eq!(meta.last_message_preview.unwrap().chars().count(), 80);
    }

    #[tokio::test]
    async fn test_list_messages_incremental_backfill() {
        let store = ConversationStore::new();
        let id = new_conversation(&store).await;

        for i in 1..=6 {
            store
                .append_message(&id, SenderType::Customer, &format!("m{}", i))
                .await
                .unwrap();
        }

        let all = store.list_messages(&id, None).await.unwrap();
        assert_eq!(all.len(), 6);

        let tail = store.list_messages(&id, Some(4)).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 5);
        assert_eq!(tail[1].sequence, 6);
    }

    #[tokio::test]
    async fn test_list_conversations_order_and_filters() {
        let store = ConversationStore::new();
        let a = new_conversation(&store).await;
        let b = new_conversation(&store).await;

        store
            .append_message(&a, SenderType::Customer, "first")
            .await
            .unwrap();
        store
            .append_message(&b, SenderType::Customer, "second")
            .await
            .unwrap();

        let listed = store
            .list_conversations(ConversationFilter::All, None)
            .await;
        assert_eq!(listed.len(), 2);
        // Most recently active first
        assert_eq!(listed[0].id, b);

        let op = OperatorId::new();
        store.assign(&a, op).await.unwrap();

        let unassigned = store
            .list_conversations(ConversationFilter::Unassigned, None)
            .await;
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].id, b);

        let assigned = store
            .list_conversations(ConversationFilter::Assigned, Some(op))
            .await;
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned[0].id, a);
    }

    #[tokio::test]
    async fn test_assign_is_advisory_first_claim_wins() {
        let store = ConversationStore::new();
        let id = new_conversation(&store).await;

        let first = OperatorId::new();
        let second = OperatorId::new();
        store.assign(&id, first).await.unwrap();
        let meta = store.assign(&id, second).await.unwrap();
        assert_eq!(meta.operator_id, Some(first));
    }

    #[tokio::test]
    async fn test_rewrite_identity_moves_open_index() {
        let store = ConversationStore::new();
        let temp = IdentityId::temporary();
        let durable = IdentityId::durable();

        let (conv, _) = store.find_or_create_for_customer(&temp).await;
        assert_eq!(store.rewrite_identity(&temp, &durable).await, 1);

        let meta = store.get(&conv.id).await.unwrap();
        assert_eq!(meta.customer_identity_id, durable);
        // Open conversation now found under the durable id
        assert_eq!(
            store.open_for_customer(&durable).await.unwrap().id,
            conv.id
        );
        assert!(store.open_for_customer(&temp).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_conversation_errors() {
        let store = ConversationStore::new();
        let missing = ConversationId::new();
        let err = store
            .append_message(&missing, SenderType::Customer, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ConversationNotFound));
    }
}
