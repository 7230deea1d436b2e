//! Frame encoding: every outbound [`ServerMessage`] is a single JSON
//! text frame. Unlike the teacher's binary game-data path, this
//! protocol has exactly one wire shape, so there is nothing to
//! negotiate per connection.

use crate::protocol::messages::ServerMessage;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;

/// Serialize `message` and write it to `sender` as a text frame.
pub(super) async fn send_server_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).expect("ServerMessage is always serializable");
    sender.send(Message::Text(text.into())).await
}
