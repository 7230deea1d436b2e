//! Top-level server assembly: wires the room store, session layer,
//! leader election, idempotency cache, and phase scheduler into one
//! [`GameServer`] handed to the WebSocket layer and the command
//! dispatcher.
//!
//! Grounded on `EnhancedGameServer::new`'s component-wiring shape
//! (database, connection manager, rate limiter, metrics, distributed
//! lock all constructed once at startup and shared via `Arc`) — the
//! P2P-specific members (relay policy, spectator service, room-to-app
//! mapping, dashboard cache) have no counterpart here and are gone;
//! what remains is generalized to the mafia room's component set.

use std::sync::Arc;

use rand::RngCore;
use tokio::time::Duration;
use uuid::Uuid;

use crate::auth::SessionTokenService;
use crate::coordination::dedup::{DedupCache, DedupCacheSettings};
use crate::database::{InMemoryRoomStore, RoomStore};
use crate::distributed::{DistributedLock, InMemoryDistributedLock};
use crate::leader::LeaderElector;
use crate::metrics::ServerMetrics;
use crate::rate_limit::{RateLimitConfig, RoomRateLimiter};
use crate::scheduler::SchedulerRegistry;
use crate::session::SessionManager;

pub mod dispatcher;

/// Runtime knobs the binary's config layer resolves once at startup.
/// Kept deliberately small and decoupled from the on-disk config
/// schema (`crate::config`) so this struct only ever grows the fields
/// the server components actually consume.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub reconnection_window: Duration,
    pub event_buffer_size: usize,
    pub rate_limit_config: RateLimitConfig,
    pub require_metrics_auth: bool,
    pub metrics_auth_token: Option<String>,
    pub room_idle_ttl: Duration,
    /// Lifetime of a session token issued on join/create/resume.
    pub session_token_ttl: Duration,
    /// HMAC key signing session tokens. Generated fresh per process by
    /// default; set explicitly so tokens survive a restart (or remain
    /// valid across a fleet of instances sharing one secret).
    pub session_secret: Arc<[u8]>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self {
            reconnection_window: Duration::from_secs(300),
            event_buffer_size: 100,
            rate_limit_config: RateLimitConfig::default(),
            require_metrics_auth: true,
            metrics_auth_token: None,
            room_idle_ttl: Duration::from_secs(crate::database::DEFAULT_IDLE_TTL_SECS as u64),
            session_token_ttl: Duration::from_secs(24 * 60 * 60),
            session_secret: Arc::from(secret.as_slice()),
        }
    }
}

/// The assembled server: every shared component a connection handler
/// or the dispatcher needs, plus the config values governing them.
pub struct GameServer {
    config: ServerConfig,
    store: Arc<dyn RoomStore>,
    sessions: Arc<SessionManager>,
    leader: Arc<LeaderElector>,
    dedup: DedupCache,
    scheduler: Arc<SchedulerRegistry>,
    dispatcher: dispatcher::Dispatcher,
    rate_limiter: Arc<RoomRateLimiter>,
    metrics: Arc<ServerMetrics>,
    instance_id: Uuid,
    token_service: SessionTokenService,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let instance_id = Uuid::new_v4();
        let metrics = Arc::new(ServerMetrics::new());
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let sessions = Arc::new(SessionManager::new(
            config.reconnection_window.as_secs() as i64,
            config.event_buffer_size,
            metrics.clone(),
        ));

        let lock: Arc<dyn DistributedLock> = Arc::new(InMemoryDistributedLock::new());
        let leader = Arc::new(LeaderElector::new(lock, instance_id));

        let dedup_settings = DedupCacheSettings::default();
        let dedup = DedupCache::new(dedup_settings.capacity, dedup_settings.ttl);

        let scheduler = Arc::new(SchedulerRegistry::new(
            store.clone(),
            sessions.clone(),
            leader.clone(),
        ));

        let dispatcher = dispatcher::Dispatcher::new(
            store.clone(),
            sessions.clone(),
            leader.clone(),
            dedup.clone(),
            scheduler.clone(),
        );

        let rate_limiter = Arc::new(RoomRateLimiter::new(config.rate_limit_config.clone()));
        rate_limiter.clone().start_cleanup_task();

        let token_service = SessionTokenService::new(config.session_secret.clone());

        Arc::new(Self {
            config,
            store,
            sessions,
            leader,
            dedup,
            scheduler,
            dispatcher,
            rate_limiter,
            metrics,
            instance_id,
            token_service,
        })
    }

    pub fn dispatcher(&self) -> &dispatcher::Dispatcher {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<SchedulerRegistry> {
        &self.scheduler
    }

    pub fn rate_limiter(&self) -> &Arc<RoomRateLimiter> {
        &self.rate_limiter
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn token_service(&self) -> &SessionTokenService {
        &self.token_service
    }

    /// Periodic maintenance: dedup-cache TTL sweep, idle-session sweep,
    /// idle-room sweep, stale-lease cleanup. Spawned once at startup;
    /// grounded on the teacher's `cleanup_task` interval loop in
    /// `main.rs`.
    pub async fn run_maintenance(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = self.sessions.cleanup_expired().await;
            if evicted > 0 {
                tracing::info!(evicted, "swept expired disconnected sessions");
            }
            let idle = self
                .store
                .cleanup_idle_rooms(
                    chrono::Duration::from_std(self.config.room_idle_ttl)
                        .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX)),
                )
                .await;
            for room_id in &idle {
                self.scheduler.stop(*room_id);
                self.sessions.clear_room(*room_id).await;
            }
            if !idle.is_empty() {
                tracing::info!(count = idle.len(), "swept idle rooms");
            }
        }
    }

    /// Release every lease this instance holds and stop every running
    /// scheduler task. Called from the shutdown signal handler.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.leader.release_all().await;
    }
}
