//! Concurrency properties of the conversation store.
#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Arc;

use shoptalk_server::store::ConversationStore;
use shoptalk_shared::{IdentityId, SenderType};

/// Many tasks appending to one conversation never produce duplicate or
/// missing sequences.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_assign_unique_sequences() {
    let store = Arc::new(ConversationStore::new());
    let identity = IdentityId::durable();
    let (conversation, _) = store.find_or_create_for_customer(&identity).await;

    const TASKS: usize = 8;
    const PER_TASK: usize = 25;

    let mut handles = Vec::new();
    for task in 0..TASKS {
        let store = Arc::clone(&store);
        let conversation_id = conversation.id;
        handles.push(tokio::spawn(async move {
            let mut sequences = Vec::with_capacity(PER_TASK);
            for i in 0..PER_TASK {
                let message = store
                    .append_message(
                        &conversation_id,
                        SenderType::Customer,
                        &format!("task {task} message {i}"),
                    )
                    .await
                    .unwrap();
                sequences.push(message.sequence);
            }
            sequences
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        let sequences = handle.await.unwrap();
        // Each task saw its own appends strictly increase
        assert!(sequences.windows(2).all(|w| w[0] < w[1]));
        all.extend(sequences);
    }

    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(unique.len(), TASKS * PER_TASK);
    assert_eq!(*all.iter().max().unwrap(), (TASKS * PER_TASK) as u64);

    // And the log agrees
    let log = store.list_messages(&conversation.id, None).await.unwrap();
    assert_eq!(log.len(), TASKS * PER_TASK);
    assert!(log.windows(2).all(|w| w[0].sequence + 1 == w[1].sequence));
}

/// Appends across different conversations do not interfere with each other's
/// sequence spaces.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_conversations_keep_independent_sequences() {
    let store = Arc::new(ConversationStore::new());

    let mut handles = Vec::new();
    for customer in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let identity = IdentityId::durable();
            let (conversation, _) = store.find_or_create_for_customer(&identity).await;
            for i in 0..10 {
                store
                    .append_message(
                        &conversation.id,
                        SenderType::Customer,
                        &format!("customer {customer} message {i}"),
                    )
                    .await
                    .unwrap();
            }
            conversation.id
        }));
    }

    for handle in handles {
        let conversation_id = handle.await.unwrap();
        let log = store.list_messages(&conversation_id, None).await.unwrap();
        let sequences: Vec<u64> = log.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, (1..=10).collect::<Vec<u64>>());
    }
}

/// Concurrent find-or-create for the same customer yields one conversation.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_find_or_create_races_to_one_conversation() {
    let store = Arc::new(ConversationStore::new());
    let identity = IdentityId::durable();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let identity = identity.clone();
        handles.push(tokio::spawn(async move {
            store.find_or_create_for_customer(&identity).await.0.id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(store.conversation_count().await, 1);
}
