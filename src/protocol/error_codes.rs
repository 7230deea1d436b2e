use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire-level error codes returned to clients in an `error` event.
///
/// Every command failure that reaches a client is represented by exactly
/// one of these kinds; see [`ErrorCode::retryable`] for the default retry
/// classification referenced by the dispatcher.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Operation not valid in the room's current phase.
    WrongPhase,
    /// The actor submitting the command is dead.
    DeadPlayer,
    /// Target violates the acting role's targeting rules.
    InvalidTarget,
    /// The action slot has already been used this phase.
    AlreadySubmitted,
    /// Same `actionId` resubmitted after it already completed.
    IdempotentDuplicate,
    /// Room is at `settings.maxPlayers` capacity.
    RoomFull,
    /// No room exists for the given id or code.
    RoomNotFound,
    /// Bad schema, forged/expired token, non-host host action, or unknown player.
    Unauthorized,
    /// Reserved for future use.
    RateLimited,
    /// Host or player name outside 3-15 characters.
    InvalidName,
    /// Invariant violation or store failure after exhausting retries.
    InternalError,
}

impl ErrorCode {
    /// Human-readable description suitable for the `error` event's `message` field.
    pub fn description(&self) -> &'static str {
        match self {
            Self::WrongPhase => {
                "This action is not valid in the room's current phase."
            }
            Self::DeadPlayer => "Dead players cannot perform this action.",
            Self::InvalidTarget => {
                "The selected target is not a legal target for this action."
            }
            Self::AlreadySubmitted => {
                "An action has already been submitted for this phase."
            }
            Self::IdempotentDuplicate => {
                "This action id was already processed; returning the original result."
            }
            Self::RoomFull => "The room has reached its maximum player capacity.",
            Self::RoomNotFound => {
                "The requested room could not be found. It may have ended or the code is incorrect."
            }
            Self::Unauthorized => {
                "Access denied. The request is malformed, unauthenticated, or not permitted for this caller."
            }
            Self::RateLimited => "Too many requests in a short time. Please slow down.",
            Self::InvalidName => "Names must be between 3 and 15 characters.",
            Self::InternalError => {
                "An internal server error occurred. Please try again."
            }
        }
    }

    /// Default retry classification for this error kind, used when the
    /// dispatcher does not have a more specific judgment to make.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidTarget | Self::RateLimited | Self::InternalError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[ErrorCode] = &[
        ErrorCode::WrongPhase,
        ErrorCode::DeadPlayer,
        ErrorCode::InvalidTarget,
        ErrorCode::AlreadySubmitted,
        ErrorCode::IdempotentDuplicate,
        ErrorCode::RoomFull,
        ErrorCode::RoomNotFound,
        ErrorCode::Unauthorized,
        ErrorCode::RateLimited,
        ErrorCode::InvalidName,
        ErrorCode::InternalError,
    ];

    #[test]
    fn all_error_codes_have_descriptions() {
        for code in ALL {
            let description = code.description();
            assert!(!description.is_empty(), "{code:?} has empty description");
            assert!(
                description.len() > 10,
                "{code:?} has suspiciously short description: '{description}'"
            );
        }
    }

    #[test]
    fn display_uses_description() {
        let error = ErrorCode::RoomNotFound;
        assert_eq!(format!("{error}"), error.description());
    }

    #[test]
    fn wire_serialization_matches_spec_kinds() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::WrongPhase).unwrap(),
            "\"WRONG_PHASE\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::IdempotentDuplicate).unwrap(),
            "\"IDEMPOTENT_DUPLICATE\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::InternalError).unwrap(),
            "\"INTERNAL_ERROR\""
        );
    }

    #[test]
    fn retryable_defaults_match_spec_guidance() {
        assert!(ErrorCode::InvalidTarget.default_retryable());
        assert!(!ErrorCode::WrongPhase.default_retryable());
        assert!(!ErrorCode::AlreadySubmitted.default_retryable());
    }
}
