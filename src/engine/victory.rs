//! Victory condition check.

use crate::protocol::types::{Alignment, Room, VictoryCondition};

/// Recompute the room's victory condition from current alive counts.
/// Pure — call before every phase advancement; `phase::advance` folds
/// this in so victory is always checked before a night/day transition
/// is allowed to proceed.
pub fn check_victory(room: &Room) -> VictoryCondition {
    let mut alive_mafia = 0usize;
    let mut alive_town = 0usize;
    let mut alive_neutral = 0usize;

    for player in room.alive_players() {
        match player.alignment {
            Some(Alignment::Mafia) => alive_mafia += 1,
            Some(Alignment::Town) => alive_town += 1,
            Some(Alignment::Neutral) => alive_neutral += 1,
            None => {}
        }
    }

    if alive_mafia >= alive_town + alive_neutral {
        VictoryCondition::MafiaVictory
    } else if alive_mafia == 0 {
        VictoryCondition::TownVictory
    } else {
        VictoryCondition::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Phase, Player, PlayerStatus, Room, RoleId, RoomSettings};
    use uuid::Uuid;

    fn room_with(players: Vec<(RoleId, PlayerStatus)>) -> Room {
        let mut room = Room {
            id: Uuid::new_v4(),
            code: "ABCDEF".into(),
            host_id: Uuid::new_v4(),
            phase: Phase::DayVoting,
            timer: None,
            settings: RoomSettings::default(),
            players: Default::default(),
            night_actions: Default::default(),
            votes: Default::default(),
            investigation_results: Vec::new(),
            public_narrative: Vec::new(),
            victory_condition: VictoryCondition::None,
            protocol_version: 1,
            last_snapshot: 0,
            last_vote_tally: Vec::new(),
        };
        for (role, status) in players {
            let id = Uuid::new_v4();
            let mut p = Player::new(id, role_label(role).to_string());
            p.role_id = Some(role);
            p.alignment = Some(role.alignment());
            p.status = status;
            room.players.insert(id, p);
        }
        room
    }

    fn role_label(role: RoleId) -> &'static str {
        match role {
            RoleId::Mafia => "mafia",
            RoleId::Detective => "detective",
            RoleId::Doctor => "doctor",
            RoleId::Townsperson => "townsperson",
        }
    }

    #[test]
    fn town_wins_when_mafia_eliminated() {
        let room = room_with(vec![
            (RoleId::Mafia, PlayerStatus::Dead),
            (RoleId::Townsperson, PlayerStatus::Alive),
            (RoleId::Detective, PlayerStatus::Alive),
        ]);
        assert_eq!(check_victory(&room), VictoryCondition::TownVictory);
    }

    #[test]
    fn mafia_wins_when_parity_reached() {
        let room = room_with(vec![
            (RoleId::Mafia, PlayerStatus::Alive),
            (RoleId::Townsperson, PlayerStatus::Alive),
        ]);
        assert_eq!(check_victory(&room), VictoryCondition::MafiaVictory);
    }

    #[test]
    fn game_continues_when_town_outnumbers_mafia() {
        let room = room_with(vec![
            (RoleId::Mafia, PlayerStatus::Alive),
            (RoleId::Townsperson, PlayerStatus::Alive),
            (RoleId::Detective, PlayerStatus::Alive),
        ]);
        assert_eq!(check_victory(&room), VictoryCondition::None);
    }
}
