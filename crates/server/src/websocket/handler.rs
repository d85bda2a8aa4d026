//! WebSocket handlers for Axum
//!
//! Two logical namespaces share the same conversation store: the anonymous
//! customer widget and the authenticated operator console. Both upgrade to
//! the same event loop; authorization and identity resolution differ.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

use shoptalk_shared::{
    ChatError, ClientEvent, OperatorId, ParticipantRole, SenderType, ServerEvent,
};

use crate::state::AppState;

use super::connection::Connection;

#[derive(Debug, Deserialize)]
pub struct OperatorSocketQuery {
    token: String,
    operator_id: OperatorId,
}

/// Customer WebSocket handler. Customers connect anonymously; the server
/// immediately signals `require_info` so the client re-validates its identity
/// on this fresh transport.
pub async fn customer_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ConnectionSpec::Customer, app_state))
}

/// Operator WebSocket handler. The transport token is issued by the external
/// auth collaborator; an invalid token is fatal for this session only and is
/// rejected before the upgrade, with no retry.
pub async fn operator_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<OperatorSocketQuery>,
) -> Result<Response, StatusCode> {
    let expected = app_state.config.operator_token.as_bytes();
    let presented = params.token.as_bytes();
    if expected.len() != presented.len() || expected.ct_eq(presented).unwrap_u8() != 1 {
        tracing::warn!(operator_id = %params.operator_id, "Operator WebSocket auth failed: invalid token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    tracing::info!(operator_id = %params.operator_id, "Operator WebSocket connection upgrade requested");
    let operator_id = params.operator_id;
    Ok(ws.on_upgrade(move |socket| {
        handle_socket(socket, ConnectionSpec::Operator(operator_id), app_state)
    }))
}

/// What kind of connection the upgrade produced
pub enum ConnectionSpec {
    Customer,
    Operator(OperatorId),
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, spec: ConnectionSpec, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn = match spec {
        ConnectionSpec::Customer => Connection::customer(tx),
        ConnectionSpec::Operator(operator_id) => Connection::operator(operator_id, tx),
    };
    let chat_state = app_state.chat.clone();
    let conn = chat_state.add_connection(conn).await;
    let session_id = conn.session_id;

    // Send connection acknowledgment
    let _ = conn.send(ServerEvent::Connected { session_id });

    // A fresh customer transport has no server-side identity affinity; ask
    // the client to re-validate before any chat action
    if conn.role == ParticipantRole::Customer {
        let _ = conn.send(ServerEvent::RequireInfo {
            reason: "identity_required".to_string(),
        });
    }

    // Spawn task to serialize and forward events to the client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(WsMessage::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize chat event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let Ok(msg) = msg else { break };
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, Arc::clone(&conn), app_state.clone()).await;
                }
                Err(e) => {
                    // Malformed payloads are logged and answered with a
                    // request-scoped validation error; no state change
                    tracing::warn!(
                        error = ?e,
                        session_id = %session_id,
                        "Failed to parse client event"
                    );
                    send_error(&conn, &ChatError::Validation("invalid event format".into()));
                }
            },
            WsMessage::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            _ => {} // Ignore binary messages
        }
    }

    // Cleanup on disconnect: the session dies, room membership is implicit
    tracing::info!(session_id = %session_id, "WebSocket connection closing");
    chat_state.remove_connection(&session_id).await;
    send_task.abort();
}

fn send_error(conn: &Connection, err: &ChatError) {
    let _ = conn.send(ServerEvent::Error {
        code: err.code().to_string(),
        message: err.to_string(),
    });
}

/// Dispatch one client event against the store, presence tracker, and rooms.
///
/// Store-level failures are answered to the requesting session only; they are
/// never broadcast.
pub async fn handle_client_event(event: ClientEvent, conn: Arc<Connection>, app_state: AppState) {
    use ClientEvent::*;

    match event {
        RegisterIdentity {
            temporary_id,
            profile,
        } => {
            if conn.role != ParticipantRole::Customer {
                send_error(&conn, &ChatError::NotAuthorized);
                return;
            }

            // A temporary id plus registration details is a promotion; plain
            // ids just (re)register for this transport
            let wants_promotion = profile.email.is_some()
                && temporary_id
                    .as_ref()
                    .map(|id| id.is_temporary())
                    .unwrap_or(false);

            let identity = if wants_promotion {
                #[allow(clippy::unwrap_used)] // checked by wants_promotion
                let temp = temporary_id.unwrap();
                // Promote a known id; first contact with an unknown one
                // registers it before promoting
                app_state
                    .identities
                    .register(Some(temp.clone()), &profile)
                    .await;
                match app_state
                    .identities
                    .promote(&temp, &profile, &app_state.store)
                    .await
                {
                    Ok(identity) => identity,
                    Err(e) => {
                        send_error(&conn, &e);
                        return;
                    }
                }
            } else {
                app_state.identities.register(temporary_id, &profile).await
            };

            conn.set_identity(identity.id.clone()).await;

            let conversation_id = app_state
                .store
                .open_for_customer(&identity.id)
                .await
                .map(|c| c.id);
            let _ = conn.send(ServerEvent::RegistrationAck {
                identity_id: identity.id,
                conversation_id,
            });
        }

        SubscribeConversation {
            conversation_id,
            since_sequence,
        } => {
            // Customers may only watch their own conversation
            if conn.role == ParticipantRole::Customer {
                let Some(identity_id) = conn.identity().await else {
                    send_error(&conn, &ChatError::IdentityUnresolved);
                    return;
                };
                match app_state.store.get(&conversation_id).await {
                    Some(meta) if meta.customer_identity_id == identity_id => {}
                    Some(_) => {
                        send_error(&conn, &ChatError::NotAuthorized);
                        return;
                    }
                    None => {
                        send_error(&conn, &ChatError::ConversationNotFound);
                        return;
                    }
                }
            }

            // Opening a conversation marks it read for the opener's side.
            // This also rejects unknown conversation ids before any room
            // membership is taken.
            let viewer = conn.role;
            if let Err(e) = app_state.store.mark_read(&conversation_id, viewer).await {
                send_error(&conn, &e);
                return;
            }

            conn.subscribe(conversation_id).await;
            app_state
                .chat
                .rooms
                .join(conversation_id, Arc::clone(&conn))
                .await;

            match app_state
                .store
                .list_messages(&conversation_id, since_sequence)
                .await
            {
                Ok(messages) => {
                    let _ = conn.send(ServerEvent::History {
                        conversation_id,
                        messages,
                        from_sequence: since_sequence.unwrap_or(0),
                    });
                }
                Err(e) => send_error(&conn, &e),
            }
        }

        SendMessage {
            conversation_id,
            content,
            client_ref,
        } => {
            if content.trim().is_empty() || content.len() > app_state.config.max_message_bytes {
                send_error(
                    &conn,
                    &ChatError::Validation("message content empty or too large".into()),
                );
                return;
            }

            let (conversation_id, sender_type, created) = match conn.role {
                ParticipantRole::Customer => {
                    let Some(identity_id) = conn.identity().await else {
                        // Fail closed: no conversation until the identity
                        // resolves
                        send_error(&conn, &ChatError::IdentityUnresolved);
                        return;
                    };
                    match conversation_id {
                        Some(id) => {
                            // Customers may only post into their own
                            // conversation
                            match app_state.store.get(&id).await {
                                Some(meta) if meta.customer_identity_id == identity_id => {}
                                Some(_) => {
                                    send_error(&conn, &ChatError::NotAuthorized);
                                    return;
                                }
                                None => {
                                    send_error(&conn, &ChatError::ConversationNotFound);
                                    return;
                                }
                            }
                            (id, SenderType::Customer, false)
                        }
                        None => {
                            // First message auto-creates the conversation
                            let (conv, created) = app_state
                                .store
                                .find_or_create_for_customer(&identity_id)
                                .await;
                            (conv.id, SenderType::Customer, created)
                        }
                    }
                }
                ParticipantRole::Operator => {
                    let Some(id) = conversation_id else {
                        send_error(
                            &conn,
                            &ChatError::Validation(
                                "operator sends require a conversation_id".into(),
                            ),
                        );
                        return;
                    };
                    (id, SenderType::Operator, false)
                }
            };

            // An operator reply claims an unassigned conversation (advisory)
            if sender_type == SenderType::Operator {
                if let Some(operator_id) = conn.operator_id {
                    if let Err(e) = app_state.store.assign(&conversation_id, operator_id).await {
                        send_error(&conn, &e);
                        return;
                    }
                }
            }

            let message = match app_state
                .store
                .append_message(&conversation_id, sender_type, &content)
                .await
            {
                Ok(message) => message,
                Err(e) => {
                    // ConversationClosed and friends surface to the sender
                    // only
                    send_error(&conn, &e);
                    return;
                }
            };

            // The sender's own subscription receives the echo too; its other
            // tabs reconcile via client_ref
            let sequence = message.sequence;
            let event = ServerEvent::Message {
                conversation_id,
                message,
                client_ref,
            };
            let room_recipients = app_state
                .chat
                .rooms
                .broadcast(&conversation_id, event.clone(), None)
                .await;

            let mut directory_recipients = 0;
            if created {
                if let Some(conv) = app_state.store.get(&conversation_id).await {
                    directory_recipients = app_state
                        .chat
                        .broadcast_to_operators(
                            ServerEvent::NewConversationRequest { conversation: conv },
                            Some(&conversation_id),
                        )
                        .await;
                }
            } else {
                directory_recipients = app_state
                    .chat
                    .broadcast_to_operators(event, Some(&conversation_id))
                    .await;
            }

            // Delivered means some transport other than the sender's saw it
            let sender_in_room = conn.is_subscribed(&conversation_id).await;
            let others = room_recipients.saturating_sub(usize::from(sender_in_room))
                + directory_recipients;
            if others > 0 {
                let _ = app_state
                    .store
                    .mark_delivered(&conversation_id, sequence)
                    .await;
            }
        }

        SetTyping {
            conversation_id,
            is_typing,
        } => {
            let Some(participant) = conn.participant().await else {
                send_error(&conn, &ChatError::IdentityUnresolved);
                return;
            };
            // Typing indicators are not echoed to self
            app_state
                .presence
                .set_typing(
                    conversation_id,
                    participant,
                    is_typing,
                    Some(conn.session_id),
                )
                .await;
        }

        CloseConversation { conversation_id } => {
            let closed_by = match conn.role {
                ParticipantRole::Customer => SenderType::Customer,
                ParticipantRole::Operator => SenderType::Operator,
            };
            match app_state.store.close(&conversation_id, closed_by).await {
                Ok(true) => {
                    let event = ServerEvent::ConversationClosed { conversation_id };
                    app_state
                        .chat
                        .rooms
                        .broadcast(&conversation_id, event.clone(), None)
                        .await;
                    app_state
                        .chat
                        .broadcast_to_operators(event, Some(&conversation_id))
                        .await;
                }
                Ok(false) => {
                    // Already closed: idempotent no-op
                }
                Err(e) => send_error(&conn, &e),
            }
        }

        ListConversations { filter } => {
            if conn.role != ParticipantRole::Operator {
                send_error(&conn, &ChatError::NotAuthorized);
                return;
            }
            let conversations = app_state
                .store
                .list_conversations(filter, conn.operator_id)
                .await;
            let _ = conn.send(ServerEvent::ConversationList { conversations });
        }
    }
}
