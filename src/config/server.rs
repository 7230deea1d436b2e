//! Server and room-defaults configuration types.

use super::defaults::{
    default_day_duration_ms, default_event_buffer_size, default_max_join_attempts,
    default_max_players, default_max_room_creations, default_min_players,
    default_night_duration_ms, default_ping_timeout, default_rate_limit_time_window,
    default_reconnection_window, default_region_id, default_room_cleanup_interval,
    default_room_idle_ttl_secs, default_vote_duration_ms,
};
use serde::{Deserialize, Serialize};

/// Server configuration for room and player management. Bridged into
/// [`crate::server::ServerConfig`] and a default [`crate::protocol::types::RoomSettings`]
/// at startup — kept separate from those runtime types so the on-disk/env
/// schema can evolve without touching the structs the server components hold.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Default maximum players per room, used when a client doesn't
    /// override it at room creation.
    #[serde(default = "default_max_players")]
    pub default_max_players: u8,
    /// Default minimum players required to start a game.
    #[serde(default = "default_min_players")]
    pub default_min_players: u8,
    /// Default night phase duration (milliseconds).
    #[serde(default = "default_night_duration_ms")]
    pub default_night_duration_ms: i64,
    /// Default day-discussion phase duration (milliseconds).
    #[serde(default = "default_day_duration_ms")]
    pub default_day_duration_ms: i64,
    /// Default day-voting phase duration (milliseconds).
    #[serde(default = "default_vote_duration_ms")]
    pub default_vote_duration_ms: i64,
    /// Timeout for client ping responses (seconds)
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    /// Interval for the maintenance sweep task (seconds)
    #[serde(default = "default_room_cleanup_interval")]
    pub room_cleanup_interval: u64,
    /// Time after last activity when a room is swept as idle (seconds).
    #[serde(default = "default_room_idle_ttl_secs")]
    pub room_idle_ttl_secs: u64,
    /// Time window for reconnection after disconnection (seconds)
    #[serde(default = "default_reconnection_window")]
    pub reconnection_window: u64,
    /// Number of events to buffer per room for reconnection
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
    /// Identifier for the deployment region (surfaced in logs/metrics).
    #[serde(default = "default_region_id")]
    pub region_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_max_players: default_max_players(),
            default_min_players: default_min_players(),
            default_night_duration_ms: default_night_duration_ms(),
            default_day_duration_ms: default_day_duration_ms(),
            default_vote_duration_ms: default_vote_duration_ms(),
            ping_timeout: default_ping_timeout(),
            room_cleanup_interval: default_room_cleanup_interval(),
            room_idle_ttl_secs: default_room_idle_ttl_secs(),
            reconnection_window: default_reconnection_window(),
            event_buffer_size: default_event_buffer_size(),
            region_id: default_region_id(),
        }
    }
}

impl ServerConfig {
    /// The default [`crate::protocol::types::RoomSettings`] a newly created
    /// room receives unless the client's `CreateRoom` message overrides them.
    pub fn default_room_settings(&self) -> crate::protocol::types::RoomSettings {
        crate::protocol::types::RoomSettings {
            night_duration_ms: self.default_night_duration_ms,
            day_duration_ms: self.default_day_duration_ms,
            vote_duration_ms: self.default_vote_duration_ms,
            min_players: self.default_min_players,
            max_players: self.default_max_players,
            ..Default::default()
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    /// Maximum number of room creation requests per time window
    #[serde(default = "default_max_room_creations")]
    pub max_room_creations: u32,
    /// Time window for rate limiting (seconds)
    #[serde(default = "default_rate_limit_time_window")]
    pub time_window: u64,
    /// Maximum number of join attempts per time window
    #[serde(default = "default_max_join_attempts")]
    pub max_join_attempts: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_room_creations: default_max_room_creations(),
            time_window: default_rate_limit_time_window(),
            max_join_attempts: default_max_join_attempts(),
        }
    }
}

impl From<RateLimitConfig> for crate::rate_limit::RateLimitConfig {
    fn from(cfg: RateLimitConfig) -> Self {
        Self {
            max_room_creations: cfg.max_room_creations,
            time_window: std::time::Duration::from_secs(cfg.time_window),
            max_join_attempts: cfg.max_join_attempts,
        }
    }
}
