//! Session/ownership layer: binds a `(playerId, roomId)` to at
//! most one live `sessionId`, evicting the previous connection on a
//! fresh login ("latest wins"), and buffers recent server events so a
//! reconnecting client can catch up without a full resync.
//!
//! Grounded on `crate::reconnection::ReconnectionManager`'s
//! disconnected-player registry and `EventBuffer` ring buffer — kept
//! almost verbatim, with a second registry added in front for the
//! active (not-yet-disconnected) session binding and eviction signal
//! the teacher's reconnection-only design didn't need.

use crate::metrics::ServerMetrics;
use crate::protocol::messages::ServerEvent;
use crate::protocol::types::{PlayerId, RoomId, SessionId};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// A ring buffer of recently-broadcast events for one room, so a
/// reconnecting player can replay what they missed.
pub struct EventBuffer {
    max_size: usize,
    events: VecDeque<BufferedEvent>,
}

struct BufferedEvent {
    event: ServerEvent,
    sequence: u64,
}

impl EventBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            events: VecDeque::with_capacity(max_size),
        }
    }

    pub fn push(&mut self, event: ServerEvent, sequence: u64) {
        self.events.push_back(BufferedEvent { event, sequence });
        while self.events.len() > self.max_size {
            self.events.pop_front();
        }
    }

    pub fn get_events_after(&self, after_sequence: u64) -> Vec<ServerEvent> {
        self.events
            .iter()
            .filter(|e| e.sequence > after_sequence)
            .map(|e| e.event.clone())
            .collect()
    }
}

/// The live binding for one connected player: which session currently
/// owns their `(playerId, roomId)` pair, and a channel to push events
/// to their transport task.
struct ActiveSession {
    session_id: SessionId,
    room_id: RoomId,
    sender: mpsc::Sender<Arc<ServerEvent>>,
}

/// A player who has disconnected but is still within the reconnection
/// window and may resume their session.
#[derive(Debug, Clone)]
pub struct DisconnectedPlayer {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub session_id: SessionId,
    pub disconnected_at: DateTime<Utc>,
    pub last_sequence: u64,
}

impl DisconnectedPlayer {
    pub fn is_expired(&self, window_seconds: i64) -> bool {
        Utc::now() > self.disconnected_at + Duration::seconds(window_seconds)
    }
}

/// Outcome of binding a new connection to a `(playerId, roomId)`.
pub struct BindOutcome {
    pub session_id: SessionId,
    /// The previous session for this player, if one was live — the
    /// caller must close that transport ("latest wins").
    pub evicted_session: Option<SessionId>,
    /// The evicted session's outbound channel, so the caller can push a
    /// final [`ServerEvent`] (e.g. an eviction notice) before closing it.
    pub evicted_sender: Option<mpsc::Sender<Arc<ServerEvent>>>,
}

/// Owns the active-session registry, the disconnected-player registry,
/// and the per-room event buffers.
pub struct SessionManager {
    active: RwLock<HashMap<PlayerId, ActiveSession>>,
    disconnected: RwLock<HashMap<PlayerId, DisconnectedPlayer>>,
    buffers: RwLock<HashMap<RoomId, EventBuffer>>,
    sequence: RwLock<HashMap<RoomId, u64>>,
    reconnection_window_secs: i64,
    event_buffer_size: usize,
    metrics: Arc<ServerMetrics>,
}

impl SessionManager {
    pub fn new(
        reconnection_window_secs: i64,
        event_buffer_size: usize,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            disconnected: RwLock::new(HashMap::new()),
            buffers: RwLock::new(HashMap::new()),
            sequence: RwLock::new(HashMap::new()),
            reconnection_window_secs,
            event_buffer_size,
            metrics,
        }
    }

    /// Bind a fresh connection to `(player_id, room_id)`. If another
    /// session already owns this player, it is evicted and returned so
    /// the caller can close that transport.
    pub async fn bind(
        &self,
        player_id: PlayerId,
        room_id: RoomId,
        sender: mpsc::Sender<Arc<ServerEvent>>,
    ) -> BindOutcome {
        let session_id = SessionId::new_v4();
        let mut active = self.active.write().await;
        let evicted = active.insert(
            player_id,
            ActiveSession {
                session_id,
                room_id,
                sender,
            },
        );
        drop(active);

        self.disconnected.write().await.remove(&player_id);

        let evicted_session = evicted.as_ref().map(|prev| prev.session_id);
        if evicted_session.is_some() {
            tracing::info!(%player_id, %room_id, "evicted prior session for player (latest wins)");
            self.metrics.increment_reconnection_sessions_active();
        }

        BindOutcome {
            session_id,
            evicted_session,
            evicted_sender: evicted.map(|prev| prev.sender),
        }
    }

    /// Record a disconnection, moving the player into the reconnection
    /// window. Returns the `sessionId` that was live at disconnect time
    /// so a subsequent reconnect attempt can be matched against it.
    pub async fn disconnect(&self, player_id: PlayerId) -> Option<SessionId> {
        let removed = self.active.write().await.remove(&player_id)?;
        let last_sequence = *self
            .sequence
            .read()
            .await
            .get(&removed.room_id)
            .unwrap_or(&0);

        self.disconnected.write().await.insert(
            player_id,
            DisconnectedPlayer {
                player_id,
                room_id: removed.room_id,
                session_id: removed.session_id,
                disconnected_at: Utc::now(),
                last_sequence,
            },
        );
        self.metrics.increment_reconnection_tokens_issued();
        Some(removed.session_id)
    }

    /// Validate a reconnection attempt and, on success, return the
    /// buffered events the player missed.
    pub async fn reconnect(
        &self,
        player_id: PlayerId,
        room_id: RoomId,
        sender: mpsc::Sender<Arc<ServerEvent>>,
    ) -> Result<Vec<ServerEvent>, ReconnectError> {
        let disconnected = self.disconnected.read().await;
        let record = disconnected
            .get(&player_id)
            .ok_or(ReconnectError::NoPendingSession)?;
        if record.room_id != room_id {
            return Err(ReconnectError::RoomMismatch);
        }
        if record.is_expired(self.reconnection_window_secs) {
            return Err(ReconnectError::WindowExpired);
        }
        let last_sequence = record.last_sequence;
        drop(disconnected);

        self.disconnected.write().await.remove(&player_id);
        self.bind(player_id, room_id, sender).await;
        self.metrics.increment_reconnection_completions();

        let missed = self
            .buffers
            .read()
            .await
            .get(&room_id)
            .map(|b| b.get_events_after(last_sequence))
            .unwrap_or_default();
        Ok(missed)
    }

    /// Send `event` to `player_id`'s live connection only, if one is
    /// bound. Unlike [`Self::broadcast`], this does not touch the
    /// room's event buffer — per-viewer payloads (redacted room
    /// snapshots, action acks) have no single sequence position a
    /// reconnecting player could replay from.
    pub async fn send_to_player(&self, player_id: PlayerId, event: ServerEvent) {
        if let Some(session) = self.active.read().await.get(&player_id) {
            let _ = session.sender.send(Arc::new(event)).await;
        }
    }

    /// Append `event` to `room_id`'s buffer and fan it out to every
    /// actively-bound player in the room.
    pub async fn broadcast(&self, room_id: RoomId, event: ServerEvent) {
        let mut sequence = self.sequence.write().await;
        let seq = sequence.entry(room_id).or_insert(0);
        *seq += 1;
        let seq = *seq;
        drop(sequence);

        self.buffers
            .write()
            .await
            .entry(room_id)
            .or_insert_with(|| EventBuffer::new(self.event_buffer_size))
            .push(event.clone(), seq);

        let event = Arc::new(event);
        let active = self.active.read().await;
        for session in active.values().filter(|s| s.room_id == room_id) {
            let _ = session.sender.send(event.clone()).await;
        }
    }

    /// Remove every trace of `room_id` once its room has ended and been
    /// garbage-collected.
    pub async fn clear_room(&self, room_id: RoomId) {
        self.buffers.write().await.remove(&room_id);
        self.sequence.write().await.remove(&room_id);
        self.disconnected
            .write()
            .await
            .retain(|_, p| p.room_id != room_id);
    }

    /// Sweep disconnected players whose reconnection window has lapsed.
    /// Returns how many were dropped; call from the teacher's
    /// background-maintenance pattern (`coordination::dedup::spawn_maintenance`).
    pub async fn cleanup_expired(&self) -> usize {
        let mut disconnected = self.disconnected.write().await;
        let before = disconnected.len();
        disconnected.retain(|_, p| !p.is_expired(self.reconnection_window_secs));
        before - disconnected.len()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReconnectError {
    #[error("no pending reconnection for this player")]
    NoPendingSession,
    #[error("reconnection attempted against the wrong room")]
    RoomMismatch,
    #[error("reconnection window has expired")]
    WindowExpired,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Arc<ServerMetrics> {
        Arc::new(ServerMetrics::new())
    }

    #[tokio::test]
    async fn second_bind_evicts_first() {
        let manager = SessionManager::new(300, 16, metrics());
        let player = PlayerId::new_v4();
        let room = RoomId::new_v4();
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        let first = manager.bind(player, room, tx1).await;
        assert!(first.evicted_session.is_none());

        let second = manager.bind(player, room, tx2).await;
        assert_eq!(second.evicted_session, Some(first.session_id));
    }

    #[tokio::test]
    async fn reconnect_replays_missed_events() {
        let manager = SessionManager::new(300, 16, metrics());
        let player = PlayerId::new_v4();
        let room = RoomId::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        manager.bind(player, room, tx).await;

        manager.broadcast(room, ServerEvent::Pong).await;
        manager.disconnect(player).await;
        manager.broadcast(room, ServerEvent::Pong).await;

        let (tx2, _rx2) = mpsc::channel(8);
        let missed = manager.reconnect(player, room, tx2).await.unwrap();
        assert_eq!(missed.len(), 1);
    }

    #[tokio::test]
    async fn reconnect_without_disconnect_record_fails() {
        let manager = SessionManager::new(300, 16, metrics());
        let player = PlayerId::new_v4();
        let room = RoomId::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        let result = manager.reconnect(player, room, tx).await;
        assert_eq!(result.unwrap_err(), ReconnectError::NoPendingSession);
    }
}
