#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Mafia room server
//!
//! A stateless, horizontally-scalable WebSocket server for a real-time
//! social-deduction (mafia-style) party game. Room state lives behind a
//! shared [`database::RoomStore`], not in any one server process's
//! memory, so any instance in the fleet can accept a connection for any
//! room.

/// Authentication middleware (in-memory backed)
pub mod auth;

/// Optimized broadcast message handling
pub mod broadcast;

/// Server configuration and environment variables
pub mod config;

/// Room and player coordination logic
pub mod coordination;

/// Database abstraction layer (in-memory implementation)
pub mod database;

/// Distributed locking (in-memory implementation)
pub mod distributed;

/// Per-room leader election on top of the distributed lock
pub mod leader;

/// Pure reducers: night resolution, vote tally, victory check, phase advancement, redaction
pub mod engine;

/// Structured logging configuration
pub mod logging;

/// Metrics collection and reporting
pub mod metrics;

/// Policy gate: validates client commands against room state before mutation
pub mod policy;

/// WebSocket message protocol definitions
pub mod protocol;

/// Rate limiting implementation
pub mod rate_limit;

/// Retry logic utilities
pub mod retry;

/// Zero-copy serialization utilities
pub mod rkyv_utils;

/// Role registry: per-role night-action spec, targeting, visibility, voting weight
pub mod roles;

/// Phase scheduler: per-room background task advancing timers and
/// early phase completion
pub mod scheduler;

/// Main server orchestration
pub mod server;

/// Per-connection session binding: latest-wins ownership, event replay
/// buffering, reconnect handling
pub mod session;

/// WebSocket connection handling
pub mod websocket;
