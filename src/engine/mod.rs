//! Pure reducers: night resolution, voting tally, victory check,
//! phase advancement. No I/O — every function here takes a `Room` by
//! reference and returns a new `Room` plus a list of declarative
//! [`Effect`]s for the dispatcher to translate into wire events.
//!
//! Grounded on
//! `examples/emersonford-mafia-game/mafia-game-server-lib/src/game.rs`'s
//! `end_cycle`/`cast_vote`/`poll_end_cycle`, restructured as free functions
//! with no `&mut self` so the reducer core never suspends and never
//! touches a lock guard, matching this crate's pure-core/imperative-shell
//! split (the shell lives in `server::dispatcher` and `scheduler`).

pub mod night;
pub mod phase;
pub mod redaction;
pub mod victory;
pub mod voting;

use crate::protocol::types::{PlayerId, RoleId, VictoryCondition};
use thiserror::Error;

/// A declarative output of a reducer call. The dispatcher is
/// responsible for turning these into server-to-client wire events;
/// the reducer itself never constructs wire messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append a line to `publicNarrative`.
    Narrative(String),
    /// A player died this resolution (night kill or lynch).
    PlayerDied {
        player_id: PlayerId,
        role_revealed: Option<RoleId>,
    },
    /// The game ended with the given victory condition.
    VictoryReached(VictoryCondition),
}

/// Validation failure raised by a reducer before it would otherwise
/// mutate state. These never reach the wire directly — the dispatcher
/// maps them to an `ErrorCode` (see `crate::policy`).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReducerError {
    #[error("player {0} is not in the room")]
    UnknownPlayer(PlayerId),
    #[error("player {0} is not alive")]
    NotAlive(PlayerId),
    #[error("player {0} does not hold the required role for this action")]
    WrongRole(PlayerId),
    #[error("target {0} is not a legal target for this action")]
    IllegalTarget(PlayerId),
}
