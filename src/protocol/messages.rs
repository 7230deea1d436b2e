//! Wire protocol: the envelope client and server exchange over the
//! WebSocket connection once a session is bound.
//!
//! Grounded on `examples/Ambiguous-Interactive-signal-fish-server/src/protocol/messages.rs`'s
//! `ClientMessage`/`ServerMessage` tagged-enum shape, carried over
//! verbatim in form — `#[serde(tag = "type", content = "data")]`
//! with PascalCase variants, `Box`ed large payloads — but every variant is
//! replaced with the mafia room's command/event set.

use crate::engine::redaction::{RoomView, VoteTallyEntry};
use crate::protocol::error_codes::ErrorCode;
use crate::protocol::types::{ActionId, NightActionType, PlayerId, RoomId, RoomSettings};
use serde::{Deserialize, Serialize};

/// A command sent by a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    /// Create a new room; the sender becomes host and first player.
    CreateRoom { host_name: String },
    /// Join an existing room by its human-readable code.
    JoinRoom {
        room_code: String,
        player_name: String,
    },
    /// Resume a previously-bound session using an opaque session token
    /// issued at join/create time.
    ResumeSession { session_token: String },
    /// Start the game; only the host may call this, and only from `Lobby`.
    StartGame,
    /// Submit (or resubmit) this player's night action.
    SubmitAction {
        action_id: ActionId,
        r#type: NightActionType,
        target_id: Option<PlayerId>,
    },
    /// Cast (or change) this player's day vote.
    CastVote {
        action_id: ActionId,
        target_id: Option<PlayerId>,
    },
    /// Host-only room configuration change, applied only while in `Lobby`.
    ConfigureRoom { settings: RoomSettings },
    /// Host-only moderation action against another player: `Kick`
    /// (lobby-only), `Mute`/`Unmute` (chat), or `Nudge` (a direct
    /// reminder with no state change).
    HostAction {
        action: HostActionKind,
        target_id: PlayerId,
    },
    /// Free-text lobby/day chat, relayed to the room without touching
    /// room state.
    ChatMessage { text: String },
    /// Client-initiated keepalive.
    Ping,
}

/// The moderation action carried by [`ClientMessage::HostAction`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HostActionKind {
    Kick,
    Mute,
    Unmute,
    Nudge,
}

/// An event pushed from the server to one or more clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Full, already-redacted room state for the receiving player —
    /// sent on join/resume and after every state-changing command.
    RoomSnapshot(Box<RoomView>),
    /// The room's phase changed.
    PhaseChange {
        room_id: RoomId,
        phase: crate::protocol::types::Phase,
        ends_at: Option<i64>,
    },
    /// Acknowledges a `SubmitAction`/`CastVote`/`StartGame`/`HostAction`
    /// from the originating connection only.
    ActionAck {
        action_id: Option<ActionId>,
        accepted: bool,
    },
    /// A vote tally update, sent only when the room's settings permit
    /// live vote visibility.
    VoteUpdate { tally: Vec<VoteTallyEntry> },
    /// Public narrative line describing the outcome of the night phase.
    NightPublicResult { narrative: String },
    /// Private result of a detective's investigation, sent only to that
    /// detective.
    DetectiveResult { target_id: PlayerId, is_mafia: bool },
    /// Public narrative line describing a lynch (or its absence).
    LynchResult { narrative: String },
    /// A player's alive/dead/connected status changed.
    PlayerStatus {
        player_id: PlayerId,
        status: crate::protocol::types::PlayerStatus,
    },
    /// A session was evicted by a newer connection for the same player
    /// ("latest wins") — sent to the connection being replaced.
    SessionEvicted,
    /// The opaque session token for this connection, sent once right
    /// after the initial `RoomSnapshot` on `CreateRoom`/`JoinRoom`, and
    /// again (with a fresh expiry) whenever `ResumeSession` succeeds or
    /// the current token is nearing expiry. The client persists this and
    /// presents it back via `ResumeSession` to survive a reconnect.
    SessionBound { session_token: String },
    /// Sent to a player the host has removed from the lobby, immediately
    /// before the server closes that connection.
    Kicked,
    /// A direct, state-free reminder from the host — sent only to the
    /// targeted player.
    Nudged,
    /// A chat line relayed to the room.
    ChatRelayed { player_id: PlayerId, text: String },
    /// Request-scoped failure.
    Error { code: ErrorCode, message: String },
    /// Server-initiated keepalive response.
    Pong,
}

/// Internal alias: the type buffered and replayed by [`crate::session`]'s
/// per-room [`crate::session::EventBuffer`]. Kept distinct from the wire
/// name so a future split between "what's buffered" and "what's sent"
/// doesn't require touching every call site.
pub type ServerEvent = ServerMessage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_round_trips_through_json() {
        let msg = ClientMessage::CastVote {
            action_id: ActionId::new_v4(),
            target_id: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"CastVote\""));
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ClientMessage::CastVote { .. }));
    }

    #[test]
    fn server_error_message_carries_error_code() {
        let msg = ServerMessage::Error {
            code: ErrorCode::WrongPhase,
            message: ErrorCode::WrongPhase.description().to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("WRONG_PHASE"));
    }
}
