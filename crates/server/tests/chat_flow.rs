//! End-to-end chat flow over the event dispatch layer, without sockets.
//!
//! Connections are fabricated around channels, so each test observes exactly
//! what a client transport would receive.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use tokio::sync::mpsc;

use shoptalk_server::websocket::connection::Connection;
use shoptalk_server::websocket::handler::handle_client_event;
use shoptalk_server::{AppState, Config};
use shoptalk_shared::{
    ClientEvent, ConversationFilter, CustomerProfile, IdentityId, OperatorId, SenderType,
    ServerEvent,
};

fn test_state() -> AppState {
    AppState::new(Config {
        bind_address: "127.0.0.1:0".to_string(),
        public_url: "http://localhost:4000".to_string(),
        operator_token: "operator-token-must-be-at-least-32-chars".to_string(),
        max_message_bytes: 16384,
    })
}

async fn connect_customer(
    state: &AppState,
) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = state.chat.add_connection(Connection::customer(tx)).await;
    (conn, rx)
}

async fn connect_operator(
    state: &AppState,
) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = state
        .chat
        .add_connection(Connection::operator(OperatorId::new(), tx))
        .await;
    (conn, rx)
}

async fn register(conn: &Arc<Connection>, state: &AppState) -> IdentityId {
    handle_client_event(
        ClientEvent::RegisterIdentity {
            temporary_id: Some(IdentityId::temporary()),
            profile: CustomerProfile::default(),
        },
        Arc::clone(conn),
        state.clone(),
    )
    .await;
    conn.identity().await.expect("registration should resolve")
}

/// The first-contact scenario: a customer writes, the conversation lands in
/// the operator directory, the operator opens it and replies, and the
/// customer's backfill shows both messages.
#[tokio::test]
async fn test_customer_to_operator_flow() {
    let state = test_state();
    let (customer, mut customer_rx) = connect_customer(&state).await;
    let (operator, mut operator_rx) = connect_operator(&state).await;

    register(&customer, &state).await;

    // First message with no conversation id auto-creates
    handle_client_event(
        ClientEvent::SendMessage {
            conversation_id: None,
            content: "Hello".to_string(),
            client_ref: None,
        },
        Arc::clone(&customer),
        state.clone(),
    )
    .await;

    // The operator console, subscribed to nothing, still hears about it
    let conversation = loop {
        match operator_rx.recv().await.unwrap() {
            ServerEvent::NewConversationRequest { conversation } => break conversation,
            _ => continue,
        }
    };
    assert_eq!(conversation.unread_for_operator, 1);
    assert_eq!(conversation.last_message_preview.as_deref(), Some("Hello"));
    let conv_id = conversation.id;

    // Operator opens the conversation
    handle_client_event(
        ClientEvent::SubscribeConversation {
            conversation_id: conv_id,
            since_sequence: None,
        },
        Arc::clone(&operator),
        state.clone(),
    )
    .await;
    let history = loop {
        match operator_rx.recv().await.unwrap() {
            ServerEvent::History { messages, .. } => break messages,
            _ => continue,
        }
    };
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "Hello");

    // Opening marked the operator side read
    let refreshed = state.store.get(&conv_id).await.unwrap();
    assert_eq!(refreshed.unread_for_operator, 0);

    // Operator replies; the advisory assignment claims the conversation
    handle_client_event(
        ClientEvent::SendMessage {
            conversation_id: Some(conv_id),
            content: "Hi! Checking your order now.".to_string(),
            client_ref: None,
        },
        Arc::clone(&operator),
        state.clone(),
    )
    .await;
    let assigned = state.store.get(&conv_id).await.unwrap();
    assert_eq!(assigned.operator_id, operator.operator_id);

    // The customer was never in the room; a backfill subscribe catches up
    handle_client_event(
        ClientEvent::SubscribeConversation {
            conversation_id: conv_id,
            since_sequence: Some(0),
        },
        Arc::clone(&customer),
        state.clone(),
    )
    .await;
    let backfill = loop {
        match customer_rx.recv().await.unwrap() {
            ServerEvent::History { messages, .. } => break messages,
            _ => continue,
        }
    };
    assert_eq!(backfill.len(), 2);
    assert_eq!(backfill[0].sender, SenderType::Customer);
    assert_eq!(backfill[1].sender, SenderType::Operator);
    let sequences: Vec<u64> = backfill.iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
}

/// Two tabs of the same customer: both receive the echo, and the sending
/// tab can reconcile via its client_ref.
#[tokio::test]
async fn test_two_tabs_both_receive_echo() {
    let state = test_state();
    let (tab_a, mut rx_a) = connect_customer(&state).await;
    let (tab_b, mut rx_b) = connect_customer(&state).await;

    let identity = register(&tab_a, &state).await;
    // Second tab re-validates the same identity
    handle_client_event(
        ClientEvent::RegisterIdentity {
            temporary_id: Some(identity.clone()),
            profile: CustomerProfile::default(),
        },
        Arc::clone(&tab_b),
        state.clone(),
    )
    .await;

    let (conversation, _) = state.store.find_or_create_for_customer(&identity).await;
    for tab in [&tab_a, &tab_b] {
        handle_client_event(
            ClientEvent::SubscribeConversation {
                conversation_id: conversation.id,
                since_sequence: None,
            },
            Arc::clone(tab),
            state.clone(),
        )
        .await;
    }

    let client_ref = uuid::Uuid::new_v4();
    handle_client_event(
        ClientEvent::SendMessage {
            conversation_id: Some(conversation.id),
            content: "still there?".to_string(),
            client_ref: Some(client_ref),
        },
        Arc::clone(&tab_a),
        state.clone(),
    )
    .await;

    for rx in [&mut rx_a, &mut rx_b] {
        let (message, echoed_ref) = loop {
            match rx.recv().await.unwrap() {
                ServerEvent::Message {
                    message, client_ref, ..
                } => break (message, client_ref),
                _ => continue,
            }
        };
        assert_eq!(message.content, "still there?");
        assert_eq!(message.sequence, 1);
        assert_eq!(echoed_ref, Some(client_ref));
    }
}

/// A customer may not post into or subscribe to another customer's
/// conversation.
#[tokio::test]
async fn test_customer_cannot_cross_conversations() {
    let state = test_state();
    let (alice, _rx_a) = connect_customer(&state).await;
    let (mallory, mut rx_m) = connect_customer(&state).await;

    let alice_id = register(&alice, &state).await;
    register(&mallory, &state).await;
    let (conversation, _) = state.store.find_or_create_for_customer(&alice_id).await;

    handle_client_event(
        ClientEvent::SendMessage {
            conversation_id: Some(conversation.id),
            content: "intruding".to_string(),
            client_ref: None,
        },
        Arc::clone(&mallory),
        state.clone(),
    )
    .await;
    let denied = loop {
        match rx_m.recv().await.unwrap() {
            ServerEvent::Error { code, .. } => break code,
            _ => continue,
        }
    };
    assert_eq!(denied, "NOT_AUTHORIZED");
    assert!(state
        .store
        .list_messages(&conversation.id, None)
        .await
        .unwrap()
        .is_empty());
}

/// Closing is idempotent and broadcast exactly once; sends afterwards are
/// rejected to the sender only.
#[tokio::test]
async fn test_close_broadcasts_once_and_rejects_sends() {
    let state = test_state();
    let (customer, mut customer_rx) = connect_customer(&state).await;
    let (operator, mut operator_rx) = connect_operator(&state).await;

    let identity = register(&customer, &state).await;
    let (conversation, _) = state.store.find_or_create_for_customer(&identity).await;
    handle_client_event(
        ClientEvent::SubscribeConversation {
            conversation_id: conversation.id,
            since_sequence: None,
        },
        Arc::clone(&customer),
        state.clone(),
    )
    .await;

    for _ in 0..2 {
        handle_client_event(
            ClientEvent::CloseConversation {
                conversation_id: conversation.id,
            },
            Arc::clone(&operator),
            state.clone(),
        )
        .await;
    }

    let mut closed_events = 0;
    while let Ok(event) = customer_rx.try_recv() {
        if matches!(event, ServerEvent::ConversationClosed { .. }) {
            closed_events += 1;
        }
    }
    assert_eq!(closed_events, 1);

    handle_client_event(
        ClientEvent::SendMessage {
            conversation_id: Some(conversation.id),
            content: "too late".to_string(),
            client_ref: None,
        },
        Arc::clone(&customer),
        state.clone(),
    )
    .await;
    let code = loop {
        match customer_rx.recv().await.unwrap() {
            ServerEvent::Error { code, .. } => break code,
            _ => continue,
        }
    };
    assert_eq!(code, "CONVERSATION_CLOSED");

    // The operator directory saw the close exactly once too
    let mut operator_closed = 0;
    while let Ok(event) = operator_rx.try_recv() {
        if matches!(event, ServerEvent::ConversationClosed { .. }) {
            operator_closed += 1;
        }
    }
    assert_eq!(operator_closed, 1);
}

/// Operators already in the room do not get directory duplicates.
#[tokio::test]
async fn test_no_double_delivery_to_subscribed_operator() {
    let state = test_state();
    let (customer, _customer_rx) = connect_customer(&state).await;
    let (operator, mut operator_rx) = connect_operator(&state).await;

    let identity = register(&customer, &state).await;
    let (conversation, _) = state.store.find_or_create_for_customer(&identity).await;
    handle_client_event(
        ClientEvent::SubscribeConversation {
            conversation_id: conversation.id,
            since_sequence: None,
        },
        Arc::clone(&operator),
        state.clone(),
    )
    .await;

    handle_client_event(
        ClientEvent::SendMessage {
            conversation_id: Some(conversation.id),
            content: "are you there?".to_string(),
            client_ref: None,
        },
        Arc::clone(&customer),
        state.clone(),
    )
    .await;

    let mut message_events = 0;
    while let Ok(event) = operator_rx.try_recv() {
        if matches!(event, ServerEvent::Message { .. }) {
            message_events += 1;
        }
    }
    assert_eq!(message_events, 1);
}

/// Subscribing to an unknown conversation is refused without leaving the
/// session joined to a phantom room.
#[tokio::test]
async fn test_subscribe_unknown_conversation_leaves_no_room_behind() {
    let state = test_state();
    let (operator, mut operator_rx) = connect_operator(&state).await;

    let missing = shoptalk_shared::ConversationId::new();
    handle_client_event(
        ClientEvent::SubscribeConversation {
            conversation_id: missing,
            since_sequence: None,
        },
        Arc::clone(&operator),
        state.clone(),
    )
    .await;

    let code = loop {
        match operator_rx.recv().await.unwrap() {
            ServerEvent::Error { code, .. } => break code,
            _ => continue,
        }
    };
    assert_eq!(code, "CONVERSATION_NOT_FOUND");
    assert!(!operator.is_subscribed(&missing).await);
    assert_eq!(state.chat.rooms.room_size(&missing).await, 0);
}

/// `list_conversations` is operator-only and honors the assignment filter.
#[tokio::test]
async fn test_list_conversations_filters() {
    let state = test_state();
    let (customer, mut customer_rx) = connect_customer(&state).await;
    let (operator, mut operator_rx) = connect_operator(&state).await;

    let identity = register(&customer, &state).await;
    let (conversation, _) = state.store.find_or_create_for_customer(&identity).await;
    let operator_id = operator.operator_id.unwrap();
    state
        .store
        .assign(&conversation.id, operator_id)
        .await
        .unwrap();

    handle_client_event(
        ClientEvent::ListConversations {
            filter: ConversationFilter::Assigned,
        },
        Arc::clone(&operator),
        state.clone(),
    )
    .await;
    let listed = loop {
        match operator_rx.recv().await.unwrap() {
            ServerEvent::ConversationList { conversations } => break conversations,
            _ => continue,
        }
    };
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].operator_id, Some(operator_id));

    // Customers are refused
    handle_client_event(
        ClientEvent::ListConversations {
            filter: ConversationFilter::All,
        },
        Arc::clone(&customer),
        state.clone(),
    )
    .await;
    let code = loop {
        match customer_rx.recv().await.unwrap() {
            ServerEvent::Error { code, .. } => break code,
            _ => continue,
        }
    };
    assert_eq!(code, "NOT_AUTHORIZED");
}
