//! Idempotency cache for duplicate action/vote submissions.
//!
//! Same LRU+TTL+background-sweep shape as the teacher's cross-instance
//! message dedup cache, but the value is no longer a bare "seen" marker:
//! a resubmission of the same `actionId` must get back the *result* of
//! the original submission, not just a duplicate flag, so a caller in
//! flight on instance A and a retry landing on instance B after
//! failover see the same answer.

#![allow(dead_code)]

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

use crate::metrics::ServerMetrics;
use crate::protocol::error_codes::ErrorCode;
use crate::protocol::messages::ServerMessage;
use crate::protocol::types::{ActionId, PlayerId, RoomId};

/// Cache key for one client-submitted action.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct DedupCacheKey {
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub action_id: ActionId,
}

/// What happened the first time this `actionId` was processed.
#[derive(Debug, Clone)]
pub enum DedupState {
    /// Another task is still resolving this action; a concurrent
    /// duplicate should wait or be told to retry shortly, not re-run
    /// the command.
    Processing,
    /// The command was accepted and folded into the room. Carries the
    /// original response so a resubmission gets back the exact same
    /// ack instead of silence — per the dedup contract, the earlier
    /// execution already committed and nothing should re-run, but the
    /// caller still needs to learn it succeeded.
    Completed(ServerMessage),
    /// The command was rejected; a duplicate gets the same rejection.
    Failed(ErrorCode),
}

/// Configuration settings for the idempotency cache.
#[derive(Debug, Clone, Copy)]
pub struct DedupCacheSettings {
    pub capacity: usize,
    pub ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for DedupCacheSettings {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            ttl: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

/// Shared idempotency cache.
#[derive(Clone)]
pub struct DedupCache {
    inner: Arc<Mutex<DedupCacheInner>>,
}

struct Entry {
    state: DedupState,
    stored_at: Instant,
}

struct DedupCacheInner {
    cache: LruCache<DedupCacheKey, Entry>,
    ttl: Duration,
}

/// Outcome of probing the cache for a key before processing a command.
#[derive(Debug)]
pub enum DedupProbe {
    /// Key not seen before; caller should mark `Processing` and proceed.
    NotSeen,
    /// Key already resolved or in flight; caller must not re-run the command.
    Known(DedupState),
}

impl DedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let effective_capacity = if capacity == 0 { 1 } else { capacity };
        let cache =
            LruCache::new(NonZeroUsize::new(effective_capacity).unwrap_or(NonZeroUsize::MIN));
        Self {
            inner: Arc::new(Mutex::new(DedupCacheInner { cache, ttl })),
        }
    }

    /// Probe the cache for `key`. If not seen, atomically marks it
    /// `Processing` so a concurrent duplicate sees `Known(Processing)`
    /// instead of also proceeding — this is the dispatcher's single
    /// claim point for a given `actionId`.
    pub async fn claim(&self, key: DedupCacheKey) -> DedupProbe {
        let mut inner = self.inner.lock().await;
        inner.evict_expired(Instant::now());
        if let Some(entry) = inner.cache.get(&key) {
            return DedupProbe::Known(entry.state.clone());
        }
        inner.cache.put(
            key,
            Entry {
                state: DedupState::Processing,
                stored_at: Instant::now(),
            },
        );
        DedupProbe::NotSeen
    }

    /// Record the final outcome for a previously-claimed key.
    pub async fn resolve(&self, key: DedupCacheKey, state: DedupState) {
        let mut inner = self.inner.lock().await;
        inner.cache.put(
            key,
            Entry {
                state,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn spawn_maintenance(
        &self,
        sweep_interval: Duration,
        metrics: Arc<ServerMetrics>,
        capacity: usize,
    ) {
        let cache = self.clone();
        let interval_duration = if sweep_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            sweep_interval
        };

        tokio::spawn(async move {
            let mut ticker = interval(interval_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let (expired, size) = cache.cleanup_expired().await;
                if expired > 0 {
                    metrics.add_dedup_cache_evictions(expired as u64);
                }
                metrics.set_dedup_cache_size(size as u64);

                if capacity > 0 {
                    let ninety_percent = (capacity as f64 * 0.9).ceil() as usize;
                    if size >= ninety_percent {
                        tracing::warn!(
                            cache_size = size,
                            capacity,
                            "idempotency cache utilization above 90%; consider increasing capacity or reducing sweep interval"
                        );
                    }
                }
            }
        });
    }

    async fn cleanup_expired(&self) -> (usize, usize) {
        let mut inner = self.inner.lock().await;
        let expired = inner.evict_expired(Instant::now());
        let size = inner.cache.len();
        (expired, size)
    }
}

impl DedupCacheInner {
    fn evict_expired(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some((_, entry)) = self.cache.peek_lru() {
            if now.duration_since(entry.stored_at) > self.ttl {
                self.cache.pop_lru();
                evicted += 1;
            } else {
                break;
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn key() -> DedupCacheKey {
        DedupCacheKey {
            room_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            action_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn first_claim_is_not_seen_second_is_known_processing() {
        let cache = DedupCache::new(8, Duration::from_secs(5));
        let k = key();
        assert!(matches!(cache.claim(k.clone()).await, DedupProbe::NotSeen));
        assert!(matches!(
            cache.claim(k).await,
            DedupProbe::Known(DedupState::Processing)
        ));
    }

    #[tokio::test]
    async fn resolved_duplicate_returns_same_outcome() {
        let cache = DedupCache::new(8, Duration::from_secs(5));
        let k = key();
        cache.claim(k.clone()).await;
        cache.resolve(k.clone(), DedupState::Failed(ErrorCode::InvalidTarget)).await;

        match cache.claim(k).await {
            DedupProbe::Known(DedupState::Failed(code)) => {
                assert_eq!(code, ErrorCode::InvalidTarget);
            }
            other => panic!("expected Known(Failed(..)), got a different probe result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_entry_is_reclaimable() {
        let cache = DedupCache::new(8, Duration::from_millis(20));
        let k = key();
        cache.claim(k.clone()).await;
        let response = ServerMessage::ActionAck {
            action_id: None,
            accepted: true,
        };
        cache.resolve(k.clone(), DedupState::Completed(response)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(matches!(cache.claim(k).await, DedupProbe::NotSeen));
    }
}
