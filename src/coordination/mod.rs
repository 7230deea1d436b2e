//! Cross-command coordination facilities.
//!
//! For the mafia room server this is just the idempotency cache
//! (`dedup`) — per-room command fan-out and subscriber bookkeeping live
//! directly on [`crate::session::SessionManager`] instead of behind a
//! separate coordinator trait, since there is exactly one implementation
//! and no second backend planned.

pub mod dedup;

pub use dedup::DedupCacheSettings;
