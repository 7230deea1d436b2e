//! Room store: the shared source of truth a stateless server
//! fleet reads and writes instead of holding room state in process
//! memory. Grounded on `InMemoryDatabase` — the same
//! `Arc<RwLock<HashMap<...>>>` room table plus a separate code index,
//! the same lock-ordering discipline (room table before the code
//! index) and room-id collision retry loop on create — generalized
//! into an explicit compare-and-commit API so the dispatcher can
//! do an atomic load-mutate-validate-commit without ever holding a lock
//! across a reducer call.
//!
//! The in-memory backend is the only backend shipped: a real
//! deployment would put a Redis- or etcd-backed implementation behind
//! the same trait, but nothing in this codebase depends on one.

use crate::protocol::types::{Room, RoomId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// 24 hours: a room with no committed state change in this long is
/// considered abandoned and is dropped by the idle sweep.
pub const DEFAULT_IDLE_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("room {0} not found")]
    NotFound(RoomId),
    #[error("room code {0} already in use")]
    CodeCollision(String),
    #[error("write rejected: hostId must not change across an update")]
    WriteLoss,
    #[error("mutator rejected the update")]
    MutationRejected,
}

/// Metadata the store tracks alongside each room for TTL and bookkeeping
/// purposes, separate from the domain state the reducers operate on.
struct Entry {
    room: Room,
    last_committed_at: DateTime<Utc>,
}

/// The room store contract. Every method is a single atomic
/// operation from the caller's point of view; `update_room_state_safe`
/// is the one the dispatcher uses for every command so the
/// load-policy-reduce-commit cycle never straddles two separate
/// round trips to the backing store.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Reserve a fresh room id and code and persist the initial room.
    /// Retries on code collision; the caller supplies `make_room`, which
    /// is given the generated `(room_id, code)` pair to construct the
    /// initial [`Room`].
    async fn create_room(
        &self,
        make_room: Box<dyn FnOnce(RoomId, String) -> Room + Send>,
    ) -> Result<Room, StoreError>;

    /// Resolve a human-readable room code to its room id.
    async fn find_room_by_code(&self, code: &str) -> Option<RoomId>;

    /// Load the current committed state of a room.
    async fn get_room_state(&self, room_id: RoomId) -> Option<Room>;

    /// Overwrite a room's state outright. Rejects the write with
    /// [`StoreError::WriteLoss`] if `next.host_id` differs from the
    /// pre-image's `host_id` — a schema-validation guard against a
    /// stale client clobbering room ownership.
    async fn update_room_state(&self, room_id: RoomId, next: Room) -> Result<(), StoreError>;

    /// Atomically load, mutate, and commit a room's state. `mutator`
    /// receives the current room and returns the next state (or an
    /// error, in which case nothing is committed). The same
    /// `hostId`-preservation check as [`Self::update_room_state`]
    /// applies to the mutator's output.
    async fn update_room_state_safe(
        &self,
        room_id: RoomId,
        mutator: Box<dyn FnOnce(&Room) -> Result<Room, StoreError> + Send>,
    ) -> Result<Room, StoreError>;

    /// Remove a room entirely (both the state and its code reservation).
    async fn delete_room(&self, room_id: RoomId) -> Result<(), StoreError>;

    /// All room ids currently held, for the phase scheduler's sweep.
    async fn list_room_ids(&self) -> Vec<RoomId>;

    /// Drop rooms whose state hasn't been committed in over `idle_ttl`.
    /// Returns the ids removed.
    async fn cleanup_idle_rooms(&self, idle_ttl: Duration) -> Vec<RoomId>;
}

/// In-memory [`RoomStore`] — the only backend this deployment ships.
pub struct InMemoryRoomStore {
    rooms: Arc<RwLock<HashMap<RoomId, Entry>>>,
    codes: Arc<RwLock<HashMap<String, RoomId>>>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            codes: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn create_room(
        &self,
        make_room: Box<dyn FnOnce(RoomId, String) -> Room + Send>,
    ) -> Result<Room, StoreError> {
        // Lock ordering: rooms before codes, matching every other method
        // here, so no other task can observe a partial insert.
        let mut rooms = self.rooms.write().await;
        let mut codes = self.codes.write().await;

        let mut attempts = 0u8;
        loop {
            let room_id = RoomId::new_v4();
            let code = crate::protocol::room_codes::generate_clean_room_code();
            if !codes.contains_key(&code) {
                let room = make_room(room_id, code.clone());
                codes.insert(code, room_id);
                rooms.insert(
                    room_id,
                    Entry {
                        room: room.clone(),
                        last_committed_at: Utc::now(),
                    },
                );
                return Ok(room);
            }
            attempts += 1;
            if attempts >= 16 {
                return Err(StoreError::CodeCollision(code));
            }
        }
    }

    async fn find_room_by_code(&self, code: &str) -> Option<RoomId> {
        self.codes.read().await.get(code).copied()
    }

    async fn get_room_state(&self, room_id: RoomId) -> Option<Room> {
        self.rooms.read().await.get(&room_id).map(|e| e.room.clone())
    }

    async fn update_room_state(&self, room_id: RoomId, next: Room) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&room_id).ok_or(StoreError::NotFound(room_id))?;
        if entry.room.host_id != next.host_id {
            return Err(StoreError::WriteLoss);
        }
        entry.room = next;
        entry.last_committed_at = Utc::now();
        Ok(())
    }

    async fn update_room_state_safe(
        &self,
        room_id: RoomId,
        mutator: Box<dyn FnOnce(&Room) -> Result<Room, StoreError> + Send>,
    ) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.get_mut(&room_id).ok_or(StoreError::NotFound(room_id))?;
        let next = mutator(&entry.room)?;
        if entry.room.host_id != next.host_id {
            return Err(StoreError::WriteLoss);
        }
        entry.room = next.clone();
        entry.last_committed_at = Utc::now();
        Ok(next)
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<(), StoreError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.remove(&room_id).ok_or(StoreError::NotFound(room_id))?;
        self.codes.write().await.remove(&entry.room.code);
        Ok(())
    }

    async fn list_room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().copied().collect()
    }

    async fn cleanup_idle_rooms(&self, idle_ttl: Duration) -> Vec<RoomId> {
        let mut rooms = self.rooms.write().await;
        let cutoff = Utc::now() - idle_ttl;
        let expired: Vec<RoomId> = rooms
            .iter()
            .filter(|(_, e)| e.last_committed_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return expired;
        }
        let mut codes = self.codes.write().await;
        for id in &expired {
            if let Some(entry) = rooms.remove(id) {
                codes.remove(&entry.room.code);
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Room;
    use uuid::Uuid;

    fn make(host: Uuid) -> impl FnOnce(RoomId, String) -> Room {
        move |id, code| Room::new(id, code, host, "Host".to_string(), 0)
    }

    #[tokio::test]
    async fn create_then_find_by_code_round_trips() {
        let store = InMemoryRoomStore::new();
        let host = Uuid::new_v4();
        let room = store.create_room(Box::new(make(host))).await.unwrap();
        let found = store.find_room_by_code(&room.code).await;
        assert_eq!(found, Some(room.id));
    }

    #[tokio::test]
    async fn update_rejects_host_id_change() {
        let store = InMemoryRoomStore::new();
        let host = Uuid::new_v4();
        let room = store.create_room(Box::new(make(host))).await.unwrap();
        let mut tampered = room.clone();
        tampered.host_id = Uuid::new_v4();
        let result = store.update_room_state(room.id, tampered).await;
        assert_eq!(result, Err(StoreError::WriteLoss));
    }

    #[tokio::test]
    async fn safe_update_applies_mutator_atomically() {
        let store = InMemoryRoomStore::new();
        let host = Uuid::new_v4();
        let room = store.create_room(Box::new(make(host))).await.unwrap();
        let updated = store
            .update_room_state_safe(
                room.id,
                Box::new(|r| {
                    let mut next = r.clone();
                    next.public_narrative.push("hello".to_string());
                    Ok(next)
                }),
            )
            .await
            .unwrap();
        assert_eq!(updated.public_narrative, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_both_state_and_code_reservation() {
        let store = InMemoryRoomStore::new();
        let host = Uuid::new_v4();
        let room = store.create_room(Box::new(make(host))).await.unwrap();
        store.delete_room(room.id).await.unwrap();
        assert!(store.get_room_state(room.id).await.is_none());
        assert!(store.find_room_by_code(&room.code).await.is_none());
    }

    #[tokio::test]
    async fn idle_rooms_are_swept_after_ttl() {
        let store = InMemoryRoomStore::new();
        let host = Uuid::new_v4();
        let room = store.create_room(Box::new(make(host))).await.unwrap();
        let removed = store.cleanup_idle_rooms(Duration::seconds(-1)).await;
        assert_eq!(removed, vec![room.id]);
        assert!(store.get_room_state(room.id).await.is_none());
    }
}
