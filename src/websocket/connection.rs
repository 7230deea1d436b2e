//! Per-connection WebSocket handling: bind the first frame to a room
//! session, relay `ClientMessage`/`ServerMessage` frames for the life
//! of the connection, and unwind cleanly on disconnect.
//!
//! Grounded on the teacher's `handle_socket` — split sender/receiver,
//! spawn an outbound-forwarding task draining an `mpsc::Receiver`
//! registered with the session layer, and a single inbound read loop —
//! with the batching/token-binding/binary-game-data machinery the
//! teacher's P2P protocol needed dropped: this protocol is JSON-only,
//! every queued event is written as soon as it's ready, and the first
//! frame itself (`CreateRoom`/`JoinRoom`/`ResumeSession`) is what binds
//! the connection, in place of the teacher's separate `Authenticate`
//! handshake message.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::SessionClaims;
use crate::engine::redaction;
use crate::protocol::error_codes::ErrorCode;
use crate::protocol::messages::{ClientMessage, HostActionKind, ServerMessage};
use crate::protocol::types::{PlayerId, RoomId};
use crate::server::GameServer;

use super::sending::send_server_message;

const FIRST_MESSAGE_TIMEOUT: Duration = Duration::from_secs(15);
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

pub(super) async fn handle_socket(socket: WebSocket, server: Arc<GameServer>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    let Some(first_message) = read_first_message(&mut receiver).await else {
        let _ = sender.close().await;
        return;
    };

    let now_ms = chrono::Utc::now().timestamp_millis();
    let (tx, mut rx) = mpsc::channel::<Arc<ServerMessage>>(OUTBOUND_QUEUE_CAPACITY);

    let Some((player_id, room_id)) =
        establish_session(&server, addr, &first_message, tx.clone(), now_ms, &mut sender).await
    else {
        let _ = sender.close().await;
        return;
    };

    tracing::info!(%player_id, %room_id, client_addr = %addr, "WebSocket session established");

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if send_server_message(&mut sender, &message).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let server_for_receive = server.clone();
    let receive_task = tokio::spawn(async move {
        read_loop(&server_for_receive, room_id, player_id, &mut receiver).await;
    });

    tokio::select! {
        _ = send_task => {
            tracing::debug!(%player_id, "send task ended");
        }
        _ = receive_task => {
            tracing::debug!(%player_id, "receive task ended");
        }
    }

    server.sessions().disconnect(player_id).await;
    tracing::info!(%player_id, %room_id, "WebSocket session closed");
}

async fn read_first_message(receiver: &mut SplitStream<WebSocket>) -> Option<ClientMessage> {
    let text = tokio::time::timeout(FIRST_MESSAGE_TIMEOUT, async {
        loop {
            match receiver.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()?;

    serde_json::from_str(&text).ok()
}

/// Handle the connection's first frame: it must be one of
/// `CreateRoom`/`JoinRoom`/`ResumeSession`, and it is what binds the
/// connection to a `(playerId, roomId)` via [`crate::session::SessionManager::bind`].
async fn establish_session(
    server: &Arc<GameServer>,
    addr: SocketAddr,
    first_message: &ClientMessage,
    tx: mpsc::Sender<Arc<ServerMessage>>,
    now_ms: i64,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Option<(PlayerId, RoomId)> {
    match first_message.clone() {
        ClientMessage::CreateRoom { host_name } => {
            if let Err(code) = check_rate_limit(server, addr, RateLimitKind::Create).await {
                send_error(sender, code).await;
                return None;
            }
            let player_id = PlayerId::new_v4();
            match server
                .dispatcher()
                .create_room(player_id, host_name, now_ms)
                .await
            {
                Ok(room) => Some(bind_and_greet(server, player_id, room.id, tx, now_ms).await),
                Err(code) => {
                    send_error(sender, code).await;
                    None
                }
            }
        }
        ClientMessage::JoinRoom {
            room_code,
            player_name,
        } => {
            if let Err(code) = check_rate_limit(server, addr, RateLimitKind::Join).await {
                send_error(sender, code).await;
                return None;
            }
            let player_id = PlayerId::new_v4();
            match server
                .dispatcher()
                .join_room(&room_code, player_id, player_name)
                .await
            {
                Ok(room) => Some(bind_and_greet(server, player_id, room.id, tx, now_ms).await),
                Err(code) => {
                    send_error(sender, code).await;
                    None
                }
            }
        }
        ClientMessage::ResumeSession { session_token } => {
            resume_session(server, &session_token, tx, now_ms, sender).await
        }
        _ => {
            send_error(sender, ErrorCode::Unauthorized).await;
            None
        }
    }
}

enum RateLimitKind {
    Create,
    Join,
}

/// Room creation/join attempts are rate-limited per connecting IP, not
/// per `playerId` — a fresh, unauthenticated `playerId` is minted for
/// every connection, so keying on it would let a single abusive client
/// bypass the limit simply by reconnecting.
async fn check_rate_limit(
    server: &Arc<GameServer>,
    addr: SocketAddr,
    kind: RateLimitKind,
) -> Result<(), ErrorCode> {
    let key = Uuid::new_v5(&Uuid::NAMESPACE_DNS, addr.ip().to_string().as_bytes());
    let result = match kind {
        RateLimitKind::Create => server.rate_limiter().check_room_creation(&key).await,
        RateLimitKind::Join => server.rate_limiter().check_join_attempt(&key).await,
    };
    result.map_err(|err| {
        tracing::debug!(%addr, error = %err, "rate limit rejected connection attempt");
        ErrorCode::RateLimited
    })
}

async fn bind_and_greet(
    server: &Arc<GameServer>,
    player_id: PlayerId,
    room_id: RoomId,
    tx: mpsc::Sender<Arc<ServerMessage>>,
    now_ms: i64,
) -> (PlayerId, RoomId) {
    let outcome = server.sessions().bind(player_id, room_id, tx.clone()).await;
    if let Some(evicted_tx) = outcome.evicted_sender {
        let _ = evicted_tx
            .send(Arc::new(ServerMessage::SessionEvicted))
            .await;
    }

    let claims = SessionClaims {
        subject: player_id,
        room_id,
        session_id: outcome.session_id,
        exp: now_ms + server.config().session_token_ttl.as_millis() as i64,
    };
    let token = server.token_service().issue(&claims);
    let _ = tx
        .send(Arc::new(ServerMessage::SessionBound {
            session_token: token,
        }))
        .await;

    send_snapshot(server, room_id, player_id, &tx).await;
    (player_id, room_id)
}

async fn resume_session(
    server: &Arc<GameServer>,
    token: &str,
    tx: mpsc::Sender<Arc<ServerMessage>>,
    now_ms: i64,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Option<(PlayerId, RoomId)> {
    let claims = match server.token_service().verify(token, now_ms) {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!(error = %err, "rejected ResumeSession with invalid token");
            send_error(sender, ErrorCode::Unauthorized).await;
            return None;
        }
    };

    let missed = match server
        .sessions()
        .reconnect(claims.subject, claims.room_id, tx.clone())
        .await
    {
        Ok(missed) => missed,
        Err(err) => {
            tracing::debug!(player_id = %claims.subject, error = %err, "ResumeSession rejected");
            send_error(sender, ErrorCode::Unauthorized).await;
            return None;
        }
    };
    for event in missed {
        let _ = tx.send(Arc::new(event)).await;
    }

    let new_exp = now_ms + server.config().session_token_ttl.as_millis() as i64;
    let refreshed = server.token_service().refresh(&claims, new_exp);
    let _ = tx
        .send(Arc::new(ServerMessage::SessionBound {
            session_token: refreshed,
        }))
        .await;

    send_snapshot(server, claims.room_id, claims.subject, &tx).await;
    Some((claims.subject, claims.room_id))
}

async fn send_snapshot(
    server: &Arc<GameServer>,
    room_id: RoomId,
    player_id: PlayerId,
    tx: &mpsc::Sender<Arc<ServerMessage>>,
) {
    let Some(room) = server.store().get_room_state(room_id).await else {
        return;
    };
    match redaction::build_view(&room, player_id) {
        Ok(view) => {
            let _ = tx
                .send(Arc::new(ServerMessage::RoomSnapshot(Box::new(view))))
                .await;
        }
        Err(error) => {
            tracing::error!(%room_id, %player_id, %error, "redaction self-check failed on join snapshot");
        }
    }
}

async fn send_error(sender: &mut SplitSink<WebSocket, Message>, code: ErrorCode) {
    let _ = send_server_message(
        sender,
        &ServerMessage::Error {
            code,
            message: code.description().to_string(),
        },
    )
    .await;
}

/// Read and dispatch every frame after the connection is bound, until
/// the socket closes or errors.
async fn read_loop(
    server: &Arc<GameServer>,
    room_id: RoomId,
    player_id: PlayerId,
    receiver: &mut SplitStream<WebSocket>,
) {
    loop {
        let msg = match receiver.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(err)) => {
                tracing::debug!(%player_id, error = %err, "WebSocket error");
                break;
            }
            None => break,
        };

        match msg {
            Message::Text(text) => {
                let client_message = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::debug!(%player_id, error = %err, "dropping malformed frame");
                        continue;
                    }
                };
                dispatch(server, room_id, player_id, client_message).await;
            }
            Message::Close(_) => {
                tracing::debug!(%player_id, "WebSocket connection closed");
                break;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

async fn dispatch(
    server: &Arc<GameServer>,
    room_id: RoomId,
    player_id: PlayerId,
    message: ClientMessage,
) {
    let now_ms = chrono::Utc::now().timestamp_millis();
    match message {
        ClientMessage::StartGame => {
            if let Err(code) = server
                .dispatcher()
                .start_game(room_id, player_id, now_ms)
                .await
            {
                send_player_error(server, player_id, code).await;
            }
        }
        ClientMessage::SubmitAction {
            action_id,
            r#type,
            target_id,
        } => {
            let _ = server
                .dispatcher()
                .submit_night_action(room_id, player_id, action_id, r#type, target_id, now_ms)
                .await;
        }
        ClientMessage::CastVote {
            action_id,
            target_id,
        } => {
            let _ = server
                .dispatcher()
                .cast_vote(room_id, player_id, action_id, target_id, now_ms)
                .await;
        }
        ClientMessage::ConfigureRoom { settings } => {
            if let Err(code) = server
                .dispatcher()
                .configure_room(room_id, player_id, settings)
                .await
            {
                send_player_error(server, player_id, code).await;
            }
        }
        ClientMessage::HostAction { action, target_id } => {
            let result = match action {
                HostActionKind::Kick => {
                    server
                        .dispatcher()
                        .kick_player(room_id, player_id, target_id)
                        .await
                }
                HostActionKind::Mute => {
                    server
                        .dispatcher()
                        .mute_player(room_id, player_id, target_id, true)
                        .await
                }
                HostActionKind::Unmute => {
                    server
                        .dispatcher()
                        .mute_player(room_id, player_id, target_id, false)
                        .await
                }
                HostActionKind::Nudge => {
                    server
                        .dispatcher()
                        .nudge_player(room_id, player_id, target_id)
                        .await
                }
            };
            if let Err(code) = result {
                send_player_error(server, player_id, code).await;
            }
        }
        ClientMessage::ChatMessage { text } => {
            server
                .dispatcher()
                .chat_message(room_id, player_id, text)
                .await;
        }
        ClientMessage::Ping => {
            server
                .sessions()
                .send_to_player(player_id, ServerMessage::Pong)
                .await;
        }
        ClientMessage::CreateRoom { .. }
        | ClientMessage::JoinRoom { .. }
        | ClientMessage::ResumeSession { .. } => {
            send_player_error(server, player_id, ErrorCode::Unauthorized).await;
        }
    }
}

async fn send_player_error(server: &Arc<GameServer>, player_id: PlayerId, code: ErrorCode) {
    server
        .sessions()
        .send_to_player(
            player_id,
            ServerMessage::Error {
                code,
                message: code.description().to_string(),
            },
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use axum::routing::get;
    use tokio_tungstenite::{connect_async, tungstenite::Message as TungsteniteMessage};

    async fn spawn_test_server() -> (SocketAddr, Arc<GameServer>) {
        let server = GameServer::new(ServerConfig::default());
        let app = axum::Router::new()
            .route("/ws", get(super::super::handler::websocket_handler))
            .with_state(server.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });
        (addr, server)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_room_returns_snapshot_and_session_token() {
        let (addr, _server) = spawn_test_server().await;
        let url = format!("ws://{addr}/ws");
        let (ws_stream, _) = connect_async(&url).await.unwrap();
        let (mut sink, mut stream) = ws_stream.split();

        let create = ClientMessage::CreateRoom {
            host_name: "Host".to_string(),
        };
        sink.send(TungsteniteMessage::Text(
            serde_json::to_string(&create).unwrap().into(),
        ))
        .await
        .unwrap();

        let mut saw_token = false;
        let mut saw_snapshot = false;
        for _ in 0..2 {
            let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let TungsteniteMessage::Text(text) = msg {
                let server_message: ServerMessage = serde_json::from_str(&text).unwrap();
                match server_message {
                    ServerMessage::SessionBound { .. } => saw_token = true,
                    ServerMessage::RoomSnapshot(_) => saw_snapshot = true,
                    other => panic!("unexpected message: {other:?}"),
                }
            }
        }
        assert!(saw_token);
        assert!(saw_snapshot);
    }
}
