//! Policy gate: the single place that turns a raw client command
//! into either a validated mutation of the room or an [`ErrorCode`].
//!
//! Grounded on `examples/emersonford-mafia-game/mafia-game-server-lib/src/game.rs`'s
//! `cast_vote`/`take_special_action` validation blocks, generalized into
//! one table-driven gate that consults [`crate::roles::definition`] for
//! per-role targeting rules instead of hand-matching each role inline.
//! Unlike the reducers in [`crate::engine`], the gate's job is pure
//! rejection — it never mutates `Room` itself; on success it hands the
//! command to the caller (the dispatcher) to fold into the room.

use crate::protocol::error_codes::ErrorCode;
use crate::protocol::types::{NightActionType, Phase, PlayerId, Room};
use crate::roles::{self, TargetFilter};

/// A client-submitted command, already authenticated and bound to a
/// `(roomId, playerId)` by the session layer.
#[derive(Debug, Clone)]
pub enum Command {
    SubmitNightAction {
        player_id: PlayerId,
        r#type: NightActionType,
        target_id: Option<PlayerId>,
    },
    CastVote {
        player_id: PlayerId,
        target_id: Option<PlayerId>,
    },
    StartGame {
        player_id: PlayerId,
    },
    /// Host removes a player from the room outright. Only legal in
    /// `Lobby`, where the role/alignment distribution hasn't been dealt
    /// yet — removing a dealt player mid-game would corrupt
    /// `roles::role_distribution`'s counts instead of just shrinking the
    /// lobby roster.
    Kick {
        host_id: PlayerId,
        target_id: PlayerId,
    },
    /// Host toggles a player's chat mute.
    Mute {
        host_id: PlayerId,
        target_id: PlayerId,
        muted: bool,
    },
    /// Host sends a direct, state-free nudge (e.g. "submit your action")
    /// to a single player.
    Nudge {
        host_id: PlayerId,
        target_id: PlayerId,
    },
}

/// Check `command` against `room`'s current state. Returns `Ok(())` if
/// the dispatcher may proceed to fold the command into the room (and,
/// for night actions/votes, insert it keyed by a fresh `actionId` before
/// the idempotency cache records the result); returns the `ErrorCode`
/// to send back otherwise.
pub fn check(room: &Room, command: &Command) -> Result<(), ErrorCode> {
    match command {
        Command::StartGame { player_id } => check_start_game(room, *player_id),
        Command::SubmitNightAction {
            player_id,
            r#type,
            target_id,
        } => check_night_action(room, *player_id, *r#type, *target_id),
        Command::CastVote {
            player_id,
            target_id,
        } => check_vote(room, *player_id, *target_id),
        Command::Kick { host_id, target_id } => check_kick(room, *host_id, *target_id),
        Command::Mute {
            host_id,
            target_id,
            ..
        } => check_host_target(room, *host_id, *target_id),
        Command::Nudge { host_id, target_id } => check_host_target(room, *host_id, *target_id),
    }
}

fn check_start_game(room: &Room, player_id: PlayerId) -> Result<(), ErrorCode> {
    if room.phase != Phase::Lobby {
        return Err(ErrorCode::WrongPhase);
    }
    if room.host_id != player_id {
        return Err(ErrorCode::Unauthorized);
    }
    if room.players.len() < room.settings.min_players as usize {
        return Err(ErrorCode::Unauthorized);
    }
    Ok(())
}

fn check_night_action(
    room: &Room,
    player_id: PlayerId,
    action_type: NightActionType,
    target_id: Option<PlayerId>,
) -> Result<(), ErrorCode> {
    if room.phase != Phase::Night {
        return Err(ErrorCode::WrongPhase);
    }

    let Some(actor) = room.players.get(&player_id) else {
        return Err(ErrorCode::Unauthorized);
    };
    if !actor.is_alive() {
        return Err(ErrorCode::DeadPlayer);
    }

    let Some(role) = actor.role_id else {
        return Err(ErrorCode::Unauthorized);
    };
    let def = roles::definition(role);
    let Some(night_spec) = def.night else {
        return Err(ErrorCode::InvalidTarget);
    };
    if night_spec.r#type != action_type {
        return Err(ErrorCode::InvalidTarget);
    }

    if room
        .night_actions
        .values()
        .any(|a| a.player_id == player_id)
    {
        return Err(ErrorCode::AlreadySubmitted);
    }

    if night_spec.target_required && target_id.is_none() {
        return Err(ErrorCode::InvalidTarget);
    }
    if let Some(target_id) = target_id {
        validate_target(room, player_id, target_id, def.targets)?;
    }

    Ok(())
}

fn validate_target(
    room: &Room,
    actor_id: PlayerId,
    target_id: PlayerId,
    rules: roles::TargetRules,
) -> Result<(), ErrorCode> {
    if target_id == actor_id && !rules.allow_self {
        return Err(ErrorCode::InvalidTarget);
    }
    let Some(target) = room.players.get(&target_id) else {
        return Err(ErrorCode::InvalidTarget);
    };
    if target.is_alive() && !rules.allow_alive {
        return Err(ErrorCode::InvalidTarget);
    }
    if !target.is_alive() && !rules.allow_dead {
        return Err(ErrorCode::InvalidTarget);
    }
    match rules.filter {
        TargetFilter::NonMafia => {
            if target.alignment == Some(crate::protocol::types::Alignment::Mafia) {
                return Err(ErrorCode::InvalidTarget);
            }
        }
        TargetFilter::AnyAlive | TargetFilter::None => {}
    }
    Ok(())
}

/// Shared authorization check for `Mute`/`Nudge`: host only, target must
/// exist, and a host may not target themself.
fn check_host_target(room: &Room, host_id: PlayerId, target_id: PlayerId) -> Result<(), ErrorCode> {
    if room.host_id != host_id {
        return Err(ErrorCode::Unauthorized);
    }
    if target_id == host_id {
        return Err(ErrorCode::InvalidTarget);
    }
    if !room.players.contains_key(&target_id) {
        return Err(ErrorCode::InvalidTarget);
    }
    Ok(())
}

fn check_kick(room: &Room, host_id: PlayerId, target_id: PlayerId) -> Result<(), ErrorCode> {
    if room.phase != Phase::Lobby {
        return Err(ErrorCode::WrongPhase);
    }
    check_host_target(room, host_id, target_id)
}

fn check_vote(
    room: &Room,
    player_id: PlayerId,
    target_id: Option<PlayerId>,
) -> Result<(), ErrorCode> {
    if room.phase != Phase::DayVoting {
        return Err(ErrorCode::WrongPhase);
    }
    let Some(voter) = room.players.get(&player_id) else {
        return Err(ErrorCode::Unauthorized);
    };
    if !voter.is_alive() {
        return Err(ErrorCode::DeadPlayer);
    }
    if let Some(target_id) = target_id {
        let Some(target) = room.players.get(&target_id) else {
            return Err(ErrorCode::InvalidTarget);
        };
        if !target.is_alive() {
            return Err(ErrorCode::InvalidTarget);
        }
    }
    // Re-voting overwrites the previous vote rather than raising
    // `AlreadySubmitted`; unlike night actions, a ballot may be changed
    // until the phase resolves.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Alignment, Player, RoleId, Room, RoomSettings};
    use uuid::Uuid;

    fn room_with_mafia_and_town() -> (Room, PlayerId, PlayerId) {
        let host = Uuid::new_v4();
        let mut room = Room::new(Uuid::new_v4(), "ABCDEF".into(), host, "Host".into(), 0);
        room.phase = Phase::Night;
        let mafia_id = Uuid::new_v4();
        let mut mafia = Player::new(mafia_id, "Mafia".into());
        mafia.role_id = Some(RoleId::Mafia);
        mafia.alignment = Some(Alignment::Mafia);
        room.players.insert(mafia_id, mafia);

        let town_id = Uuid::new_v4();
        let mut town = Player::new(town_id, "Town".into());
        town.role_id = Some(RoleId::Townsperson);
        town.alignment = Some(Alignment::Town);
        room.players.insert(town_id, town);
        (room, mafia_id, town_id)
    }

    #[test]
    fn mafia_cannot_target_mafia() {
        let (room, mafia_id, _town_id) = room_with_mafia_and_town();
        let command = Command::SubmitNightAction {
            player_id: mafia_id,
            r#type: NightActionType::Kill,
            target_id: Some(mafia_id),
        };
        assert_eq!(check(&room, &command), Err(ErrorCode::InvalidTarget));
    }

    #[test]
    fn mafia_kill_on_town_is_legal() {
        let (room, mafia_id, town_id) = room_with_mafia_and_town();
        let command = Command::SubmitNightAction {
            player_id: mafia_id,
            r#type: NightActionType::Kill,
            target_id: Some(town_id),
        };
        assert_eq!(check(&room, &command), Ok(()));
    }

    #[test]
    fn townsperson_has_no_night_action() {
        let (room, _mafia_id, town_id) = room_with_mafia_and_town();
        let command = Command::SubmitNightAction {
            player_id: town_id,
            r#type: NightActionType::Kill,
            target_id: None,
        };
        assert_eq!(check(&room, &command), Err(ErrorCode::InvalidTarget));
    }

    #[test]
    fn wrong_phase_is_rejected() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town();
        room.phase = Phase::DayVoting;
        let command = Command::SubmitNightAction {
            player_id: mafia_id,
            r#type: NightActionType::Kill,
            target_id: Some(town_id),
        };
        assert_eq!(check(&room, &command), Err(ErrorCode::WrongPhase));
    }

    #[test]
    fn dead_actor_is_rejected() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town();
        room.players.get_mut(&mafia_id).unwrap().status =
            crate::protocol::types::PlayerStatus::Dead;
        let command = Command::SubmitNightAction {
            player_id: mafia_id,
            r#type: NightActionType::Kill,
            target_id: Some(town_id),
        };
        assert_eq!(check(&room, &command), Err(ErrorCode::DeadPlayer));
    }

    #[test]
    fn kick_requires_lobby_phase() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town();
        room.phase = Phase::Night;
        let host_id = room.host_id;
        let _ = mafia_id;
        let command = Command::Kick {
            host_id,
            target_id: town_id,
        };
        assert_eq!(check(&room, &command), Err(ErrorCode::WrongPhase));
    }

    #[test]
    fn kick_requires_host() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town();
        room.phase = Phase::Lobby;
        let command = Command::Kick {
            host_id: mafia_id,
            target_id: town_id,
        };
        assert_eq!(check(&room, &command), Err(ErrorCode::Unauthorized));
    }

    #[test]
    fn mute_allowed_at_any_phase_for_host() {
        let (room, _mafia_id, town_id) = room_with_mafia_and_town();
        let host_id = room.host_id;
        let command = Command::Mute {
            host_id,
            target_id: town_id,
            muted: true,
        };
        assert_eq!(check(&room, &command), Ok(()));
    }

    #[test]
    fn host_cannot_target_self_with_mute() {
        let (room, _mafia_id, _town_id) = room_with_mafia_and_town();
        let host_id = room.host_id;
        let command = Command::Mute {
            host_id,
            target_id: host_id,
            muted: true,
        };
        assert_eq!(check(&room, &command), Err(ErrorCode::InvalidTarget));
    }

    #[test]
    fn start_game_requires_host() {
        let (mut room, _mafia_id, town_id) = room_with_mafia_and_town();
        room.phase = Phase::Lobby;
        room.settings = RoomSettings {
            min_players: 1,
            ..room.settings
        };
        let command = Command::StartGame { player_id: town_id };
        assert_eq!(check(&room, &command), Err(ErrorCode::Unauthorized));
    }
}
