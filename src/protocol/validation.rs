//! Wire-level input validation: room codes and player names. Room
//! membership/phase rules live in [`crate::policy`]; this module only
//! checks the shape of client-supplied strings before they ever reach a
//! reducer.

use crate::config::ProtocolConfig;
use std::collections::HashMap;

use super::types::{Player, PlayerId};

pub fn validate_room_code_with_config(code: &str, config: &ProtocolConfig) -> Result<(), String> {
    if code.is_empty() {
        return Err("Room code cannot be empty".to_string());
    }
    if code.len() != config.room_code_length {
        return Err(format!(
            "Room code must be exactly {} characters",
            config.room_code_length
        ));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Room code must be alphanumeric".to_string());
    }
    Ok(())
}

pub fn validate_player_name_with_config(name: &str, config: &ProtocolConfig) -> Result<(), String> {
    if name.is_empty() {
        return Err("Player name cannot be empty".to_string());
    }
    if name.len() > config.max_player_name_length {
        return Err(format!(
            "Player name too long (max {} characters)",
            config.max_player_name_length
        ));
    }

    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Player name cannot be blank".to_string());
    }

    let rules = &config.player_name_validation;
    if !rules.allow_leading_trailing_whitespace && trimmed.len() != name.len() {
        return Err("Player name cannot have leading or trailing whitespace".to_string());
    }

    for ch in name.chars() {
        if ch == ' ' {
            if rules.allow_spaces {
                continue;
            }
            return Err("Player name cannot contain spaces".to_string());
        }

        if ch.is_whitespace() {
            return Err("Player name cannot contain whitespace characters".to_string());
        }

        let is_alphanumeric = if rules.allow_unicode_alphanumeric {
            ch.is_alphanumeric()
        } else {
            ch.is_ascii_alphanumeric()
        };

        if is_alphanumeric || rules.is_allowed_symbol(ch) {
            continue;
        }

        return Err("Player name contains invalid characters".to_string());
    }

    Ok(())
}

/// Reject a join/create whose display name collides, case-insensitively,
/// with another player already seated in the room.
pub fn validate_player_name_uniqueness(
    name: &str,
    existing_players: &HashMap<PlayerId, Player>,
) -> Result<(), String> {
    let normalized_name = name.to_lowercase();
    for player in existing_players.values() {
        if player.name.to_lowercase() == normalized_name {
            return Err("Player name already exists in this room".to_string());
        }
    }
    Ok(())
}

// Legacy wrappers using the default protocol config, kept for call sites
// that don't carry a loaded `Config` (tests, tooling).
#[allow(dead_code)]
pub fn validate_room_code(code: &str) -> Result<(), &'static str> {
    let cfg = crate::config::ProtocolConfig::default();
    match validate_room_code_with_config(code, &cfg) {
        Ok(()) => Ok(()),
        Err(_) => Err("Invalid room code"),
    }
}

#[allow(dead_code)]
pub fn validate_player_name(name: &str) -> Result<(), &'static str> {
    let cfg = crate::config::ProtocolConfig::default();
    match validate_player_name_with_config(name, &cfg) {
        Ok(()) => Ok(()),
        Err(_) => Err("Invalid player name"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_code_must_match_configured_length() {
        let cfg = ProtocolConfig::default();
        assert!(validate_room_code_with_config("ABCDEF", &cfg).is_ok());
        assert!(validate_room_code_with_config("ABC", &cfg).is_err());
    }

    #[test]
    fn player_name_rejects_blank() {
        assert!(validate_player_name("   ").is_err());
    }

    #[test]
    fn duplicate_player_name_is_rejected_case_insensitively() {
        let mut players = HashMap::new();
        let id = PlayerId::new_v4();
        players.insert(id, Player::new(id, "Alice".to_string()));
        assert!(validate_player_name_uniqueness("alice", &players).is_err());
        assert!(validate_player_name_uniqueness("Bob", &players).is_ok());
    }
}
