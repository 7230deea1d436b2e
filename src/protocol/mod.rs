//! Wire protocol: message types, validation, and the room domain model.

pub mod error_codes;
pub mod messages;
pub mod room_codes;
pub mod types;
pub mod validation;

pub use error_codes::ErrorCode;

pub use types::{
    ActionId, Alignment, NightAction, NightActionType, Phase, PhaseTimer, Player, PlayerId,
    PlayerStatus, Room, RoleId, RoomId, RoomSettings, SessionId, Vote, VictoryCondition,
    VotingMode,
};

pub use messages::{ClientMessage, ServerEvent, ServerMessage};
