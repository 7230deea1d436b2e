//! Per-room leader election: the server instance that acquires
//! a room's lock is the only one allowed to advance its phase timer or
//! run completion checks, so a room's scheduler tick never races across
//! the fleet. Grounded on [`crate::distributed::DistributedLock`] and
//! the interval-loop + tracing shape of `server::maintenance::cleanup_task`
//! (`examples/Ambiguous-Interactive-signal-fish-server/src/server/maintenance.rs`).

use crate::distributed::{DistributedLock, LockHandle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::protocol::types::RoomId;

const LEASE_TTL: Duration = Duration::from_secs(10);
const RENEWAL_INTERVAL: Duration = Duration::from_secs(3);

fn lock_key(room_id: RoomId) -> String {
    format!("leader:{room_id}")
}

/// Tracks which rooms this instance currently believes it leads, and
/// runs the background renewal loop that keeps those leases alive.
pub struct LeaderElector {
    lock: Arc<dyn DistributedLock>,
    instance_id: Uuid,
    held: Arc<RwLock<HashMap<RoomId, LockHandle>>>,
}

impl LeaderElector {
    pub fn new(lock: Arc<dyn DistributedLock>, instance_id: Uuid) -> Self {
        Self {
            lock,
            instance_id,
            held: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Attempt to become leader for `room_id`. Idempotent: if this
    /// instance is already leading the room, returns `true` without a
    /// new acquisition attempt.
    pub async fn try_become_leader(&self, room_id: RoomId) -> bool {
        if self.held.read().await.contains_key(&room_id) {
            return true;
        }
        match self.lock.try_acquire(&lock_key(room_id), LEASE_TTL).await {
            Ok(Some(handle)) => {
                tracing::debug!(%room_id, instance_id = %self.instance_id, "acquired room leadership");
                self.held.write().await.insert(room_id, handle);
                true
            }
            Ok(None) => false,
            Err(error) => {
                tracing::warn!(%room_id, %error, "leader election lock acquisition failed");
                false
            }
        }
    }

    /// Whether this instance currently believes it leads `room_id`.
    pub async fn is_leader(&self, room_id: RoomId) -> bool {
        self.held.read().await.contains_key(&room_id)
    }

    /// Release leadership of a room immediately — called when a room is
    /// deleted or goes idle so another instance can pick it up without
    /// waiting out the lease TTL.
    pub async fn resign(&self, room_id: RoomId) {
        let handle = self.held.write().await.remove(&room_id);
        if let Some(handle) = handle {
            let _ = self.lock.release(&handle).await;
        }
    }

    /// Background task: every [`RENEWAL_INTERVAL`], renew every lease
    /// this instance currently holds. A lease whose renewal fails is
    /// dropped silently — another instance's next scheduler tick will
    /// acquire it once the TTL lapses, so there is nothing for this
    /// instance to do but stop acting as leader for that room.
    pub async fn run_renewal_loop(&self) {
        let mut interval = tokio::time::interval(RENEWAL_INTERVAL);
        loop {
            interval.tick().await;
            let room_ids: Vec<RoomId> = self.held.read().await.keys().copied().collect();
            for room_id in room_ids {
                let handle = self.held.read().await.get(&room_id).cloned();
                let Some(handle) = handle else { continue };
                match self.lock.extend(&handle, LEASE_TTL).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(%room_id, instance_id = %self.instance_id, "lost room leadership on renewal");
                        self.held.write().await.remove(&room_id);
                    }
                    Err(error) => {
                        tracing::warn!(%room_id, %error, "room leadership renewal errored");
                        self.held.write().await.remove(&room_id);
                    }
                }
            }
        }
    }

    /// Release every lease this instance holds — called on graceful shutdown.
    pub async fn release_all(&self) {
        let handles: Vec<LockHandle> = self.held.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            let _ = self.lock.release(&handle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::InMemoryDistributedLock;

    fn room() -> RoomId {
        RoomId::new_v4()
    }

    #[tokio::test]
    async fn becoming_leader_is_idempotent_for_the_same_instance() {
        let elector = LeaderElector::new(Arc::new(InMemoryDistributedLock::new()), Uuid::new_v4());
        let room_id = room();
        assert!(elector.try_become_leader(room_id).await);
        assert!(elector.try_become_leader(room_id).await);
        assert!(elector.is_leader(room_id).await);
    }

    #[tokio::test]
    async fn second_instance_cannot_acquire_while_first_holds_lease() {
        let lock = Arc::new(InMemoryDistributedLock::new());
        let a = LeaderElector::new(lock.clone(), Uuid::new_v4());
        let b = LeaderElector::new(lock, Uuid::new_v4());
        let room_id = room();
        assert!(a.try_become_leader(room_id).await);
        assert!(!b.try_become_leader(room_id).await);
    }

    #[tokio::test]
    async fn resign_releases_the_lease_for_another_instance() {
        let lock = Arc::new(InMemoryDistributedLock::new());
        let a = LeaderElector::new(lock.clone(), Uuid::new_v4());
        let b = LeaderElector::new(lock, Uuid::new_v4());
        let room_id = room();
        assert!(a.try_become_leader(room_id).await);
        a.resign(room_id).await;
        assert!(!a.is_leader(room_id).await);
        assert!(b.try_become_leader(room_id).await);
    }
}
