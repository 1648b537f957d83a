// handlers/ws_handlers.rs
//
// Live-push adapter over the same chat delivery core as the REST path. The
// socket only parses events and forwards them; persistence ordering and the
// participant check live in chat_service.
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use bson::oid::ObjectId;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::middleware::auth::decode_claims;
use crate::models::user::Claims;
use crate::services::chat_service;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// Client-to-server events. Same JSON envelope shape as the server events:
/// `{ "event": ..., "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinChat { chat_id: String },
    #[serde(rename_all = "camelCase")]
    SendMessage { chat_id: String, content: String },
    #[serde(rename_all = "camelCase")]
    Typing { chat_id: String },
}

// GET /ws?token=...
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Bearer credential is required at handshake; no token, no socket.
    let claims = query
        .token
        .as_deref()
        .and_then(|token| decode_claims(token, &state.config.jwt_secret));

    match claims {
        Some(claims) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, claims))
            .into_response(),
        None => AppError::AuthRequired.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    let user_id = match claims.user_id() {
        Ok(id) => id,
        Err(_) => return,
    };
    info!("Socket connected: user {}", user_id);

    let (mut sink, mut stream) = socket.split();

    // All outbound traffic (acks, errors, room broadcasts) funnels through
    // one channel so the sink has a single writer.
    let (tx, mut rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut joined: HashSet<String> = HashSet::new();
    let mut forwarders = Vec::new();

    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                debug!("Unparseable socket event: {}", e);
                send_error(&tx, "Malformed event").await;
                continue;
            }
        };

        match event {
            ClientEvent::JoinChat { chat_id } => {
                let chat_oid = match ObjectId::parse_str(&chat_id) {
                    Ok(oid) => oid,
                    Err(_) => {
                        send_error(&tx, "Invalid chat id").await;
                        continue;
                    }
                };

                // Membership gate before any room traffic reaches this socket.
                if let Err(e) =
                    chat_service::require_participant(&state.db, chat_oid, &user_id).await
                {
                    send_error(&tx, &e.to_string()).await;
                    continue;
                }

                if !joined.insert(chat_id.clone()) {
                    continue; // already in the room
                }

                // Joining a room doubles as a read receipt.
                if let Err(e) = chat_service::mark_read(&state.db, chat_oid, user_id).await {
                    warn!("mark_read on join failed for chat {}: {}", chat_id, e);
                }

                let mut room_rx = state.rooms.subscribe(&chat_id).await;
                let room_tx = tx.clone();
                forwarders.push(tokio::spawn(async move {
                    while let Ok(event) = room_rx.recv().await {
                        let Ok(text) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if room_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                }));
                info!("User {} joined chat {}", user_id, chat_id);
            }

            ClientEvent::SendMessage { chat_id, content } => {
                let chat_oid = match ObjectId::parse_str(&chat_id) {
                    Ok(oid) => oid,
                    Err(_) => {
                        send_error(&tx, "Invalid chat id").await;
                        continue;
                    }
                };
                if content.is_empty() || content.len() > 2000 {
                    send_error(&tx, "Message content is required").await;
                    continue;
                }

                // Persist-then-broadcast happens inside; afterwards the ack
                // goes straight to this socket, independent of the room
                // broadcast, so a slow room never blocks the sender's
                // confirmation.
                match chat_service::send_message(
                    &state.db,
                    &state.rooms,
                    chat_oid,
                    user_id,
                    content,
                )
                .await
                {
                    Ok(message) => {
                        let ack = json!({
                            "event": "ack",
                            "data": {
                                "messageId": message.id.map(|id| id.to_hex()),
                                "chatId": chat_id,
                            },
                        });
                        let _ = tx.send(ack.to_string()).await;
                    }
                    Err(e) => send_error(&tx, &e.to_string()).await,
                }
            }

            ClientEvent::Typing { chat_id } => {
                if !joined.contains(&chat_id) {
                    continue;
                }
                state
                    .rooms
                    .publish(
                        &chat_id,
                        crate::services::chat_rooms::WsEvent::UserTyping {
                            user_id: user_id.to_hex(),
                            chat_id: chat_id.clone(),
                        },
                    )
                    .await;
            }
        }
    }

    for task in forwarders {
        task.abort();
    }
    writer.abort();
    info!("Socket disconnected: user {}", user_id);
}

async fn send_error(tx: &mpsc::Sender<String>, message: &str) {
    let payload = json!({ "event": "error", "data": { "message": message } });
    let _ = tx.send(payload.to_string()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_from_the_wire_envelope() {
        let join: ClientEvent =
            serde_json::from_str(r#"{"event":"joinChat","data":{"chatId":"abc"}}"#).unwrap();
        assert!(matches!(join, ClientEvent::JoinChat { chat_id } if chat_id == "abc"));

        let send: ClientEvent = serde_json::from_str(
            r#"{"event":"sendMessage","data":{"chatId":"abc","content":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(send, ClientEvent::SendMessage { content, .. } if content == "hi"));

        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"selfDestruct"}"#).is_err());
    }
}
