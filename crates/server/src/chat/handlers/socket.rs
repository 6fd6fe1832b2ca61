//! WebSocket live channel
//!
//! Frames are JSON objects `{"event": ..., "data": ...}`.
//!
//! Client to server:
//!   - `join-chat`: conversation key to watch
//!   - `leave-chat`: conversation key to stop watching
//!   - `send-message`: a message the client already sent over REST, relayed
//!     to the other subscribers of its conversation
//!
//! Server to client:
//!   - `receive-message`: a new message in a watched conversation
//!
//! Nothing on this channel is acknowledged or retried. A client that misses
//! an event refetches the conversation over REST.

use crate::chat::delivery::ConnectionId;
use crate::chat::key;
use crate::chat::models::{CardCache, Message, MessageView};
use crate::core::{AppState, Ctx, Error, Result};
use axum::{
    extract::{
        ws::{
            rejection::WebSocketUpgradeRejection, Message as WsMessage, WebSocket,
            WebSocketUpgrade,
        },
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinChat(String),
    LeaveChat(String),
    SendMessage(RelayPayload),
}

/// Just enough of a sent message to find the stored copy
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayPayload {
    pub conversation_key: String,
    #[serde(alias = "_id")]
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    ReceiveMessage(MessageView),
}

/// GET /api/chat/socket?token=
///
/// The session is checked before the upgrade request itself.
pub async fn chat_socket(
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response> {
    let ctx = socket_identity(&state, query.token).await?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    info!("[Socket] {} ({}) connecting", ctx.user_id(), ctx.role());

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, ctx)))
}

async fn socket_identity(state: &AppState, token: Option<String>) -> Result<Ctx> {
    let token = token
        .filter(|t| !t.trim().is_empty())
        .ok_or(Error::AuthFailNoToken)?;
    let user = state.auth.validate_session(&token).await?;
    Ok(Ctx::new(user.id, user.role, token))
}

async fn handle_socket(socket: WebSocket, state: AppState, ctx: Ctx) {
    let connection = state.delivery.connect();
    let (mut sink, mut incoming) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let mut rooms: HashMap<String, JoinHandle<()>> = HashMap::new();
    let mut cards = CardCache::new(state.users.clone());

    info!("[Socket] {} connected as connection {}", ctx.user_id(), connection);

    loop {
        tokio::select! {
            Some(message) = out_rx.recv() => {
                let view = match cards.expand(message.clone()).await {
                    Ok(view) => view,
                    Err(e) => {
                        warn!("[Socket] Could not expand message {}: {}", message.id, e);
                        MessageView { message, sender: None, receiver: None }
                    }
                };
                let frame = match serde_json::to_string(&ServerEvent::ReceiveMessage(view)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("[Socket] Failed to encode event: {}", e);
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            frame = incoming.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(text.as_str()) {
                            Ok(event) => {
                                handle_client_event(&state, &ctx, connection, event, &out_tx, &mut rooms)
                                    .await;
                            }
                            Err(e) => debug!("[Socket] Ignoring unknown frame: {}", e),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("[Socket] connection {} errored: {}", connection, e);
                        break;
                    }
                }
            }
        }
    }

    for (_, forwarder) in rooms {
        forwarder.abort();
        let _ = forwarder.await;
    }
    info!("[Socket] connection {} ({}) closed", connection, ctx.user_id());
}

async fn handle_client_event(
    state: &AppState,
    ctx: &Ctx,
    connection: ConnectionId,
    event: ClientEvent,
    out_tx: &mpsc::Sender<Message>,
    rooms: &mut HashMap<String, JoinHandle<()>>,
) {
    match event {
        ClientEvent::JoinChat(conversation_key) => {
            if !key::involves(&conversation_key, ctx.user_id()) {
                warn!(
                    "[Socket] {} tried to join foreign conversation {}",
                    ctx.user_id(),
                    conversation_key
                );
                return;
            }
            if rooms.contains_key(&conversation_key) {
                return;
            }

            let mut subscription = state.delivery.join(&conversation_key, connection);
            let out_tx = out_tx.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(message) = subscription.recv().await {
                    if out_tx.send(message).await.is_err() {
                        break;
                    }
                }
                debug!(
                    "[Socket] forwarder for {} finished",
                    subscription.conversation_key()
                );
            });
            rooms.insert(conversation_key, forwarder);
        }
        ClientEvent::LeaveChat(conversation_key) => {
            if let Some(forwarder) = rooms.remove(&conversation_key) {
                // Wait for the task to go so its subscription leaves the room.
                forwarder.abort();
                let _ = forwarder.await;
            }
        }
        ClientEvent::SendMessage(payload) => {
            relay(state, ctx, connection, payload).await;
        }
    }
}

/// Re-publish the stored copy of a message the client says it sent.
///
/// A message the room already received is not sent again.
async fn relay(state: &AppState, ctx: &Ctx, connection: ConnectionId, payload: RelayPayload) {
    let Some(message) = state.store.find(&payload.conversation_key, &payload.id).await else {
        warn!(
            "[Socket] Relay of unknown message {} in {}",
            payload.id, payload.conversation_key
        );
        return;
    };

    if message.sender_id != ctx.user_id() {
        warn!(
            "[Socket] {} tried to relay message {} it did not send",
            ctx.user_id(),
            message.id
        );
        return;
    }

    let reached = state.delivery.publish(&message, Some(connection));
    debug!("[Socket] Relayed message {} to {} subscribers", message.id, reached);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::delivery::Subscription;
    use crate::core::auth::{NewUser, Role};
    use crate::core::HubConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn test_state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = HubConfig::with_base_dir(dir.path());
        config.bcrypt_cost = 4;
        (AppState::build(config).await.unwrap(), dir)
    }

    fn ctx(user_id: &str) -> Ctx {
        Ctx::new(user_id.to_string(), Role::Business, format!("token-{}", user_id))
    }

    fn payload(message: &Message) -> RelayPayload {
        RelayPayload {
            conversation_key: message.conversation_key.clone(),
            id: message.id.clone(),
        }
    }

    async fn drain(subscription: &mut Subscription) -> Vec<Message> {
        let mut received = Vec::new();
        while let Ok(Some(message)) =
            tokio::time::timeout(Duration::from_millis(100), subscription.recv()).await
        {
            received.push(message);
        }
        received
    }

    #[tokio::test]
    async fn test_relay_after_send_does_not_duplicate() {
        let (state, _dir) = test_state().await;
        let mut receiver = state.delivery.join("a:b", state.delivery.connect());
        let sender_connection = state.delivery.connect();

        let sent = state.store.append("a", "b", "hello").await.unwrap();
        relay(&state, &ctx("a"), sender_connection, payload(&sent)).await;

        let received = drain(&mut receiver).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id, sent.id);
    }

    #[tokio::test]
    async fn test_relay_checks_sender_and_stored_copy() {
        let (state, _dir) = test_state().await;
        // Nobody is listening yet, so the send itself reaches no one.
        let sent = state.store.append("a", "b", "hello").await.unwrap();

        let sender_connection = state.delivery.connect();
        let mut own = state.delivery.join("a:b", sender_connection);
        let mut receiver = state.delivery.join("a:b", state.delivery.connect());

        relay(&state, &ctx("b"), state.delivery.connect(), payload(&sent)).await;
        relay(
            &state,
            &ctx("a"),
            sender_connection,
            RelayPayload {
                conversation_key: "a:b".to_string(),
                id: "no-such-message".to_string(),
            },
        )
        .await;
        relay(
            &state,
            &ctx("a"),
            sender_connection,
            RelayPayload {
                conversation_key: "a:c".to_string(),
                id: sent.id.clone(),
            },
        )
        .await;
        assert!(drain(&mut receiver).await.is_empty());

        relay(&state, &ctx("a"), sender_connection, payload(&sent)).await;
        let received = drain(&mut receiver).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "hello");
        assert!(drain(&mut own).await.is_empty());
    }

    #[tokio::test]
    async fn test_join_only_own_conversations() {
        let (state, _dir) = test_state().await;
        let (out_tx, _out_rx) = mpsc::channel(8);
        let mut rooms = HashMap::new();
        let connection = state.delivery.connect();

        let event = ClientEvent::JoinChat("a:b".to_string());
        handle_client_event(&state, &ctx("c"), connection, event, &out_tx, &mut rooms).await;
        assert!(rooms.is_empty());
        assert_eq!(state.delivery.room_count(), 0);

        for _ in 0..2 {
            let event = ClientEvent::JoinChat("a:c".to_string());
            handle_client_event(&state, &ctx("c"), connection, event, &out_tx, &mut rooms).await;
        }
        assert_eq!(rooms.len(), 1);
        assert_eq!(state.delivery.subscriber_count("a:c"), 1);
    }

    #[tokio::test]
    async fn test_leave_stops_forwarding_and_releases_room() {
        let (state, _dir) = test_state().await;
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let mut rooms = HashMap::new();
        let connection = state.delivery.connect();

        let join = ClientEvent::JoinChat("a:b".to_string());
        handle_client_event(&state, &ctx("a"), connection, join, &out_tx, &mut rooms).await;

        let sent = state.store.append("b", "a", "ping").await.unwrap();
        let forwarded = tokio::time::timeout(Duration::from_secs(1), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(forwarded.id, sent.id);

        let leave = ClientEvent::LeaveChat("a:b".to_string());
        handle_client_event(&state, &ctx("a"), connection, leave, &out_tx, &mut rooms).await;
        assert!(rooms.is_empty());
        assert_eq!(state.delivery.room_count(), 0);

        state.store.append("b", "a", "after leaving").await.unwrap();
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_socket_requires_session_token() {
        let (state, _dir) = test_state().await;

        assert!(matches!(
            socket_identity(&state, None).await,
            Err(Error::AuthFailNoToken)
        ));
        assert!(matches!(
            socket_identity(&state, Some("  ".to_string())).await,
            Err(Error::AuthFailNoToken)
        ));
        assert!(matches!(
            socket_identity(&state, Some("bogus".to_string())).await,
            Err(Error::AuthFailInvalidSession)
        ));

        let (user, session) = state
            .auth
            .register(NewUser {
                name: "Asha".to_string(),
                email: "asha@example.com".to_string(),
                password: "secret-pass".to_string(),
                role: Role::Mentor,
                phone: None,
            })
            .await
            .unwrap();
        let ctx = socket_identity(&state, Some(session.token)).await.unwrap();
        assert_eq!(ctx.user_id(), user.id);
        assert_eq!(ctx.role(), Role::Mentor);
    }

    #[test]
    fn test_client_event_parsing() {
        let join: ClientEvent =
            serde_json::from_str(r#"{"event":"join-chat","data":"a:b"}"#).unwrap();
        assert!(matches!(join, ClientEvent::JoinChat(ref k) if k == "a:b"));

        let send: ClientEvent = serde_json::from_str(
            r#"{"event":"send-message","data":{"_id":"m1","conversationKey":"a:b","content":"hi"}}"#,
        )
        .unwrap();
        match send {
            ClientEvent::SendMessage(payload) => {
                assert_eq!(payload.id, "m1");
                assert_eq!(payload.conversation_key, "a:b");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_server_event_shape() {
        let view = MessageView {
            message: Message {
                id: "m1".to_string(),
                sender_id: "a".to_string(),
                receiver_id: "b".to_string(),
                conversation_key: "a:b".to_string(),
                content: "hi".to_string(),
                read: false,
                created_at: chrono::Utc::now(),
                seq: 7,
            },
            sender: None,
            receiver: None,
        };

        let json = serde_json::to_value(ServerEvent::ReceiveMessage(view)).unwrap();
        assert_eq!(json["event"], "receive-message");
        assert_eq!(json["data"]["conversationKey"], "a:b");
        assert_eq!(json["data"]["senderId"], "a");
    }
}
