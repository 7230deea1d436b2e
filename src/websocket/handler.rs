use crate::server::GameServer;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;

use super::connection::handle_socket;

/// Upgrade to a WebSocket and hand the connection off to [`handle_socket`].
/// Unlike the teacher's handler, there is no subprotocol negotiation —
/// this protocol speaks one wire shape (JSON text frames) unconditionally.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(server): State<Arc<GameServer>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, server, addr))
}
