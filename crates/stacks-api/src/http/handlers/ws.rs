//! WebSocket endpoint for real-time chat.
//!
//! `GET /ws` authenticates the caller from the session token, checks the
//! `Origin` header when an allowed origin is configured, and upgrades. The
//! connection is then registered with the [`ChatHub`] and driven by
//! [`pump`], a single `tokio::select!` loop that multiplexes:
//!
//! - inbound frames, handed to the session state machine;
//! - outbound messages queued by the router, written as JSON text frames;
//! - a ping ticker, and a read deadline refreshed by every inbound frame;
//! - hub cancellation (slow consumer, shutdown).
//!
//! Whatever ends the loop, the session's close path runs exactly once.
//!
//! [`ChatHub`]: stacks_core::hub::ChatHub

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use stacks_core::chat::repository::ChatRepository;
use stacks_core::hub::session::{FrameOutcome, Session};
use stacks_types::chat::Message as ChatMessage;
use stacks_types::config::HubConfig;
use stacks_types::identity::Identity;

use crate::http::error::AppError;
use crate::http::extractors::auth::{check_origin, CurrentIdentity};
use crate::state::AppState;

/// Upgrade an authenticated request to a chat WebSocket.
///
/// Mounted at `/ws`. Rejections happen before the upgrade: `403` for a
/// foreign origin, `401` for a missing or invalid session token.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentIdentity(identity): CurrentIdentity,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let config = state.hub.config();
    check_origin(&headers, config.allowed_origin.as_deref())?;
    if state.hub.is_shutting_down() {
        return Err(AppError::Unavailable("server is shutting down".to_string()));
    }

    let max_frame_bytes = config.max_frame_bytes;
    Ok(ws
        .max_message_size(max_frame_bytes)
        .max_frame_size(max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, identity))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let user_id = identity.user_id;
    let (session, outbound) = match state.hub.connect(identity) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(user_id, error = %e, "Connection refused after upgrade");
            return;
        }
    };

    let (ws_sender, ws_receiver) = socket.split();
    pump(session, outbound, ws_sender, ws_receiver, state.hub.config().clone()).await;
}

/// Why a connection's pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    ClosedByHub,
    ReadDeadline,
    PingFailed,
    WriteFailed,
    ProtocolViolation,
    ClientClosed,
    ReadError,
}

impl fmt::Display for PumpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            PumpExit::ClosedByHub => "closed by hub",
            PumpExit::ReadDeadline => "read deadline exceeded",
            PumpExit::PingFailed => "ping write failed",
            PumpExit::WriteFailed => "write failed",
            PumpExit::ProtocolViolation => "protocol violation",
            PumpExit::ClientClosed => "client closed",
            PumpExit::ReadError => "read error",
        };
        f.write_str(reason)
    }
}

/// Drive one session over a split socket until it ends, then close it.
pub async fn pump<C, S, R, E>(
    mut session: Session<C>,
    mut outbound: mpsc::Receiver<Arc<ChatMessage>>,
    mut ws_sender: S,
    mut ws_receiver: R,
    config: HubConfig,
) -> PumpExit
where
    C: ChatRepository + 'static,
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let connection = session.connection().clone();
    let conn_id = connection.id();
    let user_id = session.identity().user_id;

    let read_deadline = tokio::time::sleep(config.pong_wait());
    tokio::pin!(read_deadline);

    let mut ping = tokio::time::interval(config.ping_interval());
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately.
    ping.reset();

    let exit = loop {
        tokio::select! {
            _ = connection.closed() => break PumpExit::ClosedByHub,

            _ = &mut read_deadline => break PumpExit::ReadDeadline,

            _ = ping.tick() => {
                if ws_sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break PumpExit::PingFailed;
                }
            }

            Some(message) = outbound.recv() => {
                match serde_json::to_string(&*message) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break PumpExit::WriteFailed;
                        }
                    }
                    Err(e) => {
                        warn!(conn_id, message_id = message.id, error = %e, "Failed to serialize message");
                    }
                }
            }

            frame = ws_receiver.next() => {
                read_deadline.as_mut().reset(Instant::now() + config.pong_wait());
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match session.handle_text(text.as_str()).await {
                            Ok(FrameOutcome::Routed(message_id)) => {
                                debug!(conn_id, user_id, message_id, "Message accepted");
                            }
                            Ok(outcome) => {
                                debug!(conn_id, user_id, ?outcome, "Frame handled");
                            }
                            Err(e) => {
                                warn!(conn_id, user_id, error = %e, "Closing connection");
                                break PumpExit::ProtocolViolation;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(conn_id, user_id, "Binary frame received, closing connection");
                        break PumpExit::ProtocolViolation;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break PumpExit::ClientClosed,
                    Some(Err(e)) => {
                        debug!(conn_id, user_id, error = %e, "WebSocket read error");
                        break PumpExit::ReadError;
                    }
                }
            }
        }
    };

    session.close(&exit.to_string());
    let _ = ws_sender.send(Message::Close(None)).await;
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use futures::channel::mpsc as frames;
    use stacks_core::hub::ChatHub;
    use stacks_types::chat::{Chat, ChatId, ChatStatus, NewMessage};
    use stacks_types::error::RepositoryError;
    use stacks_types::identity::{Role, UserId};

    type Inbound = Result<Message, axum::Error>;

    /// Serves chat 1 (patron 1, librarian 2) and stores every message.
    struct OneChat;

    impl ChatRepository for OneChat {
        async fn create_chat(&self, _owner_id: UserId, _title: &str) -> Result<Chat, RepositoryError> {
            Err(RepositoryError::Conflict("read-only".to_string()))
        }

        async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, RepositoryError> {
            Ok((chat_id == 1).then(|| Chat {
                id: 1,
                owner_id: 1,
                staff_id: Some(2),
                status: ChatStatus::Active,
                title: "Dune".to_string(),
                last_activity_at: Utc::now(),
                created_at: Utc::now(),
            }))
        }

        async fn update_chat(&self, _chat: &Chat, _expected: ChatStatus) -> Result<(), RepositoryError> {
            Err(RepositoryError::Conflict("read-only".to_string()))
        }

        async fn list_chats_for_owner(&self, _owner_id: UserId) -> Result<Vec<Chat>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn list_chats_for_staff(&self, _staff_id: UserId) -> Result<Vec<Chat>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn save_message(&self, message: &NewMessage) -> Result<ChatMessage, RepositoryError> {
            Ok(ChatMessage {
                id: 7,
                chat_id: message.chat_id,
                sender_id: message.sender_id,
                sender_role: message.sender_role,
                sender_name: message.sender_name.clone(),
                content: message.content.clone(),
                read_at: None,
                created_at: message.created_at,
            })
        }

        async fn list_messages(
            &self,
            _chat_id: ChatId,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<ChatMessage>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn mark_read(&self, _chat_id: ChatId, _reader_id: UserId) -> Result<u64, RepositoryError> {
            Ok(0)
        }
    }

    struct Socket {
        inbound: frames::UnboundedSender<Inbound>,
        written: frames::UnboundedReceiver<Message>,
    }

    /// Connect patron 1 and start its pump on the runtime.
    fn spawn_pump(hub: &ChatHub<OneChat>) -> (Socket, tokio::task::JoinHandle<PumpExit>) {
        let (session, outbound) = hub.connect(Identity::new(1, Role::User, "Bob")).unwrap();
        let (inbound, receiver) = frames::unbounded::<Inbound>();
        let (sender, written) = frames::unbounded::<Message>();
        let task = tokio::spawn(pump(session, outbound, sender, receiver, hub.config().clone()));
        (Socket { inbound, written }, task)
    }

    fn hub() -> ChatHub<OneChat> {
        ChatHub::start(Arc::new(OneChat), HubConfig::default())
    }

    fn text(body: &str) -> Inbound {
        Ok(Message::Text(body.into()))
    }

    #[tokio::test(start_paused = true)]
    async fn missed_read_deadline_closes_connection() {
        let hub = hub();
        let (socket, task) = spawn_pump(&hub);
        let started = Instant::now();

        assert_eq!(task.await.unwrap(), PumpExit::ReadDeadline);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(!hub.registry().is_online(1));

        // One ping at 54 s; none at connect time.
        let written: Vec<Message> = socket.written.collect().await;
        assert_eq!(written, vec![Message::Ping(Bytes::new()), Message::Close(None)]);
        drop(socket.inbound);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_refresh_the_read_deadline() {
        let hub = hub();
        let (socket, task) = spawn_pump(&hub);

        tokio::time::sleep(Duration::from_secs(50)).await;
        socket.inbound.unbounded_send(Ok(Message::Pong(Bytes::new()))).unwrap();
        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(!task.is_finished());
        assert!(hub.registry().is_online(1));

        assert_eq!(task.await.unwrap(), PumpExit::ReadDeadline);
        assert!(!hub.registry().is_online(1));
    }

    #[tokio::test]
    async fn binary_frame_is_a_protocol_violation() {
        let hub = hub();
        let (socket, task) = spawn_pump(&hub);
        socket
            .inbound
            .unbounded_send(Ok(Message::Binary(Bytes::from_static(b"\x00\x01"))))
            .unwrap();

        assert_eq!(task.await.unwrap(), PumpExit::ProtocolViolation);
        assert!(!hub.registry().is_online(1));
        let written: Vec<Message> = socket.written.collect().await;
        assert_eq!(written.last(), Some(&Message::Close(None)));
    }

    #[tokio::test]
    async fn malformed_text_is_a_protocol_violation() {
        let hub = hub();
        let (socket, task) = spawn_pump(&hub);
        socket.inbound.unbounded_send(text("not json")).unwrap();

        assert_eq!(task.await.unwrap(), PumpExit::ProtocolViolation);
        assert!(!hub.registry().is_online(1));
    }

    #[tokio::test]
    async fn close_frame_or_end_of_stream_ends_the_session() {
        let hub = hub();

        let (closing, closing_task) = spawn_pump(&hub);
        let (vanishing, vanishing_task) = spawn_pump(&hub);
        assert_eq!(hub.registry().connections_for(1).len(), 2);

        closing.inbound.unbounded_send(Ok(Message::Close(None))).unwrap();
        assert_eq!(closing_task.await.unwrap(), PumpExit::ClientClosed);
        assert_eq!(hub.registry().connections_for(1).len(), 1);

        drop(vanishing.inbound);
        assert_eq!(vanishing_task.await.unwrap(), PumpExit::ClientClosed);
        assert!(!hub.registry().is_online(1));
    }

    #[tokio::test]
    async fn hub_cancellation_ends_the_pump() {
        let hub = hub();
        let (_socket, task) = spawn_pump(&hub);

        // The router closes a slow consumer the same way.
        for connection in hub.registry().connections_for(1) {
            connection.close();
        }
        assert_eq!(task.await.unwrap(), PumpExit::ClosedByHub);
        assert!(!hub.registry().is_online(1));

        let (_socket, task) = spawn_pump(&hub);
        hub.shutdown().await;
        assert_eq!(task.await.unwrap(), PumpExit::ClosedByHub);
        assert_eq!(hub.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn routed_message_is_written_as_json_text() {
        let hub = hub();
        let (mut socket, task) = spawn_pump(&hub);
        socket.inbound.unbounded_send(text(r#"{"chat_id":1,"content":""}"#)).unwrap();
        socket
            .inbound
            .unbounded_send(text(r#"{"chat_id":1,"content":"Is Dune on the shelf?"}"#))
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), socket.written.next())
            .await
            .unwrap()
            .unwrap();
        let Message::Text(json) = frame else {
            panic!("expected a text frame, got {frame:?}");
        };
        let value: serde_json::Value = serde_json::from_str(json.as_str()).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["chat_id"], 1);
        assert_eq!(value["sender_role"], "user");
        assert_eq!(value["content"], "Is Dune on the shelf?");

        drop(socket.inbound);
        assert_eq!(task.await.unwrap(), PumpExit::ClientClosed);
    }

    #[test]
    fn exit_reasons_read_as_log_text() {
        assert_eq!(PumpExit::ReadDeadline.to_string(), "read deadline exceeded");
        assert_eq!(PumpExit::ClientClosed.to_string(), "client closed");
    }
}
