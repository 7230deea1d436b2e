//! Phase advancement: resolves the phase being left, re-checks
//! victory, and either ends the game or starts the next phase's timer.

use super::{night, victory, voting, Effect};
use crate::protocol::types::{Phase, PhaseTimer, Room, VictoryCondition};

/// Fixed duration of the day-announcement phase; not configurable per room.
pub const DAY_ANNOUNCEMENT_DURATION_MS: i64 = 30_000;

/// Advance `room` out of its current phase. Resolves night actions or
/// votes as appropriate for the phase being left, re-checks victory
/// before committing to a next phase, and constructs that phase's timer
/// (or leaves it `None` for the untimed phases).
///
/// Callers (the scheduler, on timer expiry, or the dispatcher, on an
/// early-completion predicate such as "all alive players voted") call
/// this once per transition; it is idempotent only in the sense that
/// calling it twice in a row resolves an already-empty action set.
pub fn advance(room: &Room, now_ms: i64) -> (Room, Vec<Effect>) {
    let (mut next, mut effects) = match room.phase {
        Phase::Night => night::resolve_night(room),
        Phase::DayVoting => voting::resolve_votes(room),
        _ => (room.clone(), Vec::new()),
    };

    let victory_condition = victory::check_victory(&next);
    if victory_condition != VictoryCondition::None {
        next.phase = Phase::Ended;
        next.victory_condition = victory_condition;
        next.timer = None;
        effects.push(Effect::VictoryReached(victory_condition));
    } else {
        let next_phase = next.phase.next();
        next.phase = next_phase;
        next.timer = if next_phase.is_untimed() {
            None
        } else {
            let duration_ms = phase_duration_ms(next_phase, &next.settings);
            Some(PhaseTimer {
                phase: next_phase,
                started_at: now_ms,
                ends_at: now_ms + duration_ms,
            })
        };
    }

    next.last_snapshot = now_ms;
    (next, effects)
}

fn phase_duration_ms(phase: Phase, settings: &crate::protocol::types::RoomSettings) -> i64 {
    match phase {
        Phase::Night => settings.night_duration_ms,
        Phase::DayAnnouncement => DAY_ANNOUNCEMENT_DURATION_MS,
        Phase::DayDiscussion => settings.day_duration_ms,
        Phase::DayVoting => settings.vote_duration_ms,
        Phase::Lobby | Phase::Ended => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Player, RoleId, RoomSettings};
    use uuid::Uuid;

    fn lobby_room() -> Room {
        let host = Uuid::new_v4();
        Room::new(Uuid::new_v4(), "ABCDEF".into(), host, "Host".into(), 0)
    }

    #[test]
    fn lobby_to_night_starts_timer() {
        let room = lobby_room();
        let (next, _effects) = advance(&room, 1_000);
        assert_eq!(next.phase, Phase::Night);
        let timer = next.timer.expect("night phase must have a timer");
        assert_eq!(timer.started_at, 1_000);
        assert_eq!(timer.ends_at, 1_000 + room.settings.night_duration_ms);
    }

    #[test]
    fn day_announcement_uses_fixed_duration_regardless_of_settings() {
        let mut room = lobby_room();
        room.phase = Phase::Night;
        room.settings = RoomSettings {
            day_duration_ms: 999_999,
            ..RoomSettings::default()
        };
        let (next, _effects) = advance(&room, 0);
        assert_eq!(next.phase, Phase::DayAnnouncement);
        let timer = next.timer.unwrap();
        assert_eq!(timer.ends_at - timer.started_at, DAY_ANNOUNCEMENT_DURATION_MS);
    }

    #[test]
    fn victory_ends_game_instead_of_advancing() {
        let mut room = lobby_room();
        room.phase = Phase::DayVoting;
        let mafia_id = Uuid::new_v4();
        let mut mafia = Player::new(mafia_id, "M".into());
        mafia.role_id = Some(RoleId::Mafia);
        mafia.alignment = Some(crate::protocol::types::Alignment::Mafia);
        room.players.insert(mafia_id, mafia);
        for player in room.players.values_mut() {
            if player.id != mafia_id {
                player.status = crate::protocol::types::PlayerStatus::Dead;
            }
        }

        let (next, effects) = advance(&room, 5_000);
        assert_eq!(next.phase, Phase::Ended);
        assert_eq!(next.victory_condition, VictoryCondition::MafiaVictory);
        assert!(next.timer.is_none());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::VictoryReached(VictoryCondition::MafiaVictory))));
    }

    #[test]
    fn day_voting_wraps_back_to_night_when_game_continues() {
        let mut room = lobby_room();
        room.phase = Phase::DayVoting;
        let t1 = Uuid::new_v4();
        let mut townsperson = Player::new(t1, "T".into());
        townsperson.role_id = Some(RoleId::Townsperson);
        townsperson.alignment = Some(crate::protocol::types::Alignment::Town);
        room.players.insert(t1, townsperson);
        let mafia_id = Uuid::new_v4();
        let mut mafia = Player::new(mafia_id, "M".into());
        mafia.role_id = Some(RoleId::Mafia);
        mafia.alignment = Some(crate::protocol::types::Alignment::Mafia);
        room.players.insert(mafia_id, mafia);

        let (next, _effects) = advance(&room, 0);
        assert_eq!(next.phase, Phase::Night);
        assert!(next.timer.is_some());
    }
}
