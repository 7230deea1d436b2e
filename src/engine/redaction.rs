//! Per-player view construction.
//!
//! `build_view` is the single place permitted to decide what a given
//! player may see of an otherwise-unredacted [`Room`]. It always runs a
//! self-check before returning — in every build, not only debug builds —
//! because a redaction bug here is an information leak, not merely a
//! wrong answer. The one dispatcher call site `.expect()`s the result
//! (see `crate::server::dispatcher`); a failure becomes
//! `ErrorCode::InternalError` plus a `tracing::error!` of the offending
//! room and viewer, never a panic that reaches a client.

use crate::protocol::types::{
    InvestigationResult, NightAction, NightActionType, PhaseTimer, Phase, Player,
    PlayerId, PlayerStatus, Room, RoleId, RoomSettings, Vote, VictoryCondition,
};
use std::collections::HashMap;
use thiserror::Error;

/// A player as visible to one particular viewer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub status: PlayerStatus,
    pub connected: bool,
    /// Only populated for the viewer's own entry, or a dead/disconnected
    /// player's entry when `settings.revealRolesOnDeath` is set.
    pub role_id: Option<RoleId>,
}

/// The redacted room state sent to one player over the wire.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoomView {
    pub room_id: crate::protocol::types::RoomId,
    pub code: String,
    pub host_id: PlayerId,
    pub phase: Phase,
    pub timer: Option<PhaseTimer>,
    pub settings: RoomSettings,
    pub players: Vec<PlayerView>,
    pub public_narrative: Vec<String>,
    pub victory_condition: VictoryCondition,
    pub protocol_version: u32,
    /// The viewer's own role, always visible to themself.
    pub your_role: Option<RoleId>,
    /// Fellow mafia player ids — present only when the viewer is mafia.
    pub teammates: Option<Vec<PlayerId>>,
    /// Investigation results belonging to this viewer only.
    pub investigation_results: Vec<InvestigationResult>,
    /// Whether the viewer has an outstanding night action this phase.
    pub has_submitted_night_action: bool,
    /// Whether the viewer has an outstanding vote this phase.
    pub has_submitted_vote: bool,
    /// This viewer's own locked-in night action, if any — `None` outside
    /// `Night` or before they've submitted.
    pub locked_action: Option<LockedAction>,
    /// Running vote tally by target. Populated during `DayVoting` only
    /// when `settings.anonymous_voting` is false, and always populated
    /// once the room has left `DayVoting` (final tally).
    pub votes: Option<Vec<VoteTallyEntry>>,
}

/// A viewer's own submitted-but-unresolved night action.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LockedAction {
    pub r#type: NightActionType,
    pub target_id: Option<PlayerId>,
}

/// One candidate's running or final vote weight.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VoteTallyEntry {
    pub target_id: PlayerId,
    pub weight: u32,
}

/// A violated redaction invariant. Always fatal — see module docs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedactionError {
    #[error("role of alive non-viewer player {0} leaked into the view")]
    AliveRoleLeaked(PlayerId),
    #[error("role of hidden dead/disconnected player {0} leaked into the view")]
    HiddenDeathRoleLeaked(PlayerId),
    #[error("investigation result for investigator {0} leaked to viewer {1}")]
    InvestigationLeaked(PlayerId, PlayerId),
    #[error("teammates were populated for non-mafia viewer {0}")]
    TeammatesLeakedToNonMafia(PlayerId),
    #[error("viewer {0} is not a member of this room")]
    UnknownViewer(PlayerId),
}

/// Build the view of `room` for `viewer_id`. Runs a fatal self-check
/// before returning; see module docs.
pub fn build_view(room: &Room, viewer_id: PlayerId) -> Result<RoomView, RedactionError> {
    let viewer = room
        .players
        .get(&viewer_id)
        .ok_or(RedactionError::UnknownViewer(viewer_id))?;
    let viewer_is_mafia = viewer.alignment == Some(crate::protocol::types::Alignment::Mafia);

    let mut players = Vec::with_capacity(room.players.len());
    for player in room.players.values() {
        let is_self = player.id == viewer_id;
        let role_id = if is_self {
            player.role_id
        } else if !player.is_alive() && room.settings.reveal_roles_on_death {
            player.role_id
        } else if room.phase == Phase::Ended {
            player.role_id
        } else {
            None
        };
        players.push(PlayerView {
            id: player.id,
            name: player.name.clone(),
            status: player.status,
            connected: player.connected,
            role_id,
        });
    }
    players.sort_by_key(|p| p.id);

    let teammates = if viewer_is_mafia {
        Some(
            room.players
                .values()
                .filter(|p| p.id != viewer_id && p.alignment == Some(crate::protocol::types::Alignment::Mafia))
                .map(|p| p.id)
                .collect(),
        )
    } else {
        None
    };

    let investigation_results: Vec<InvestigationResult> = room
        .investigation_results
        .iter()
        .filter(|r| r.investigator_id == viewer_id)
        .cloned()
        .collect();

    let has_submitted_night_action = has_action_for(room.night_actions.values(), viewer_id);
    let has_submitted_vote = has_vote_for(room.votes.values(), viewer_id);

    let locked_action = room
        .night_actions
        .values()
        .find(|a| a.player_id == viewer_id)
        .map(|a| LockedAction {
            r#type: a.r#type,
            target_id: a.target_id,
        });

    // `resolve_votes` clears `room.votes` once the phase resolves, so a
    // live tally only exists during `DayVoting` itself; non-anonymous
    // rooms expose it there, anonymous rooms never do. The phases that
    // immediately follow a resolved round (announcement, discussion) and
    // `Ended` instead show the frozen `last_vote_tally` snapshot from
    // the round that just finished.
    let votes = if room.phase == Phase::DayVoting && !room.settings.anonymous_voting {
        Some(tally_votes(room))
    } else if room.phase == Phase::Ended {
        Some(final_tally_entries(room))
    } else if matches!(room.phase, Phase::DayAnnouncement | Phase::DayDiscussion)
        && !room.last_vote_tally.is_empty()
    {
        Some(final_tally_entries(room))
    } else {
        None
    };

    let view = RoomView {
        room_id: room.id,
        code: room.code.clone(),
        host_id: room.host_id,
        phase: room.phase,
        timer: room.timer,
        settings: room.settings.clone(),
        players,
        public_narrative: room.public_narrative.clone(),
        victory_condition: room.victory_condition,
        protocol_version: room.protocol_version,
        your_role: viewer.role_id,
        teammates,
        investigation_results,
        has_submitted_night_action,
        has_submitted_vote,
        locked_action,
        votes,
    };

    self_check(room, viewer_id, viewer_is_mafia, &view)?;
    Ok(view)
}

fn has_action_for<'a>(actions: impl Iterator<Item = &'a NightAction>, viewer_id: PlayerId) -> bool {
    actions.filter(|a| a.player_id == viewer_id).count() > 0
}

fn has_vote_for<'a>(votes: impl Iterator<Item = &'a Vote>, viewer_id: PlayerId) -> bool {
    votes.filter(|v| v.player_id == viewer_id).count() > 0
}

fn final_tally_entries(room: &Room) -> Vec<VoteTallyEntry> {
    room.last_vote_tally
        .iter()
        .map(|e| VoteTallyEntry {
            target_id: e.target_id,
            weight: e.weight,
        })
        .collect()
}

fn tally_votes(room: &Room) -> Vec<VoteTallyEntry> {
    let mut tally: HashMap<PlayerId, u32> = HashMap::new();
    for vote in room.votes.values() {
        let Some(target_id) = vote.target_id else {
            continue;
        };
        let weight = room
            .players
            .get(&vote.player_id)
            .and_then(|p| p.role_id)
            .map(|r| crate::roles::definition(r).voting.weight)
            .unwrap_or(1);
        *tally.entry(target_id).or_insert(0) += weight;
    }
    let mut entries: Vec<_> = tally
        .into_iter()
        .map(|(target_id, weight)| VoteTallyEntry { target_id, weight })
        .collect();
    entries.sort_by_key(|e| e.target_id);
    entries
}

/// The mandated runtime safety check. Never skipped, never
/// feature-gated: a leak here is worse than the cost of running it.
fn self_check(
    room: &Room,
    viewer_id: PlayerId,
    viewer_is_mafia: bool,
    view: &RoomView,
) -> Result<(), RedactionError> {
    for player_view in &view.players {
        if player_view.id == viewer_id {
            continue;
        }
        let authoritative = &room.players[&player_view.id];
        if room.phase == Phase::Ended {
            continue;
        }
        if authoritative.is_alive() {
            if player_view.role_id.is_some() {
                return Err(RedactionError::AliveRoleLeaked(player_view.id));
            }
        } else if !room.settings.reveal_roles_on_death && player_view.role_id.is_some() {
            return Err(RedactionError::HiddenDeathRoleLeaked(player_view.id));
        }
    }

    for result in &view.investigation_results {
        if result.investigator_id != viewer_id {
            return Err(RedactionError::InvestigationLeaked(
                result.investigator_id,
                viewer_id,
            ));
        }
    }

    if view.teammates.is_some() && !viewer_is_mafia {
        return Err(RedactionError::TeammatesLeakedToNonMafia(viewer_id));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Alignment, Room, RoomSettings};
    use uuid::Uuid;

    fn room_with_mafia_and_town(reveal: bool) -> (Room, PlayerId, PlayerId) {
        let host = Uuid::new_v4();
        let mut room = Room::new(Uuid::new_v4(), "ABCDEF".into(), host, "Host".into(), 0);
        room.settings = RoomSettings {
            reveal_roles_on_death: reveal,
            ..RoomSettings::default()
        };
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
    fn non_mafia_viewer_never_sees_teammates() {
        let (room, _mafia_id, town_id) = room_with_mafia_and_town(true);
        let view = build_view(&room, town_id).unwrap();
        assert!(view.teammates.is_none());
    }

    #[test]
    fn mafia_viewer_sees_teammates_excluding_self() {
        let (room, mafia_id, _town_id) = room_with_mafia_and_town(true);
        let view = build_view(&room, mafia_id).unwrap();
        let teammates = view.teammates.unwrap();
        assert!(!teammates.contains(&mafia_id));
    }

    #[test]
    fn alive_player_role_is_hidden_from_others() {
        let (room, mafia_id, town_id) = room_with_mafia_and_town(true);
        let view = build_view(&room, town_id).unwrap();
        let mafia_entry = view.players.iter().find(|p| p.id == mafia_id).unwrap();
        assert!(mafia_entry.role_id.is_none());
    }

    #[test]
    fn dead_player_role_revealed_only_when_setting_enabled() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town(false);
        room.players.get_mut(&mafia_id).unwrap().status = PlayerStatus::Dead;
        let view = build_view(&room, town_id).unwrap();
        let mafia_entry = view.players.iter().find(|p| p.id == mafia_id).unwrap();
        assert!(mafia_entry.role_id.is_none());
    }

    #[test]
    fn dead_player_role_revealed_when_setting_enabled() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town(true);
        room.players.get_mut(&mafia_id).unwrap().status = PlayerStatus::Dead;
        let view = build_view(&room, town_id).unwrap();
        let mafia_entry = view.players.iter().find(|p| p.id == mafia_id).unwrap();
        assert_eq!(mafia_entry.role_id, Some(RoleId::Mafia));
    }

    #[test]
    fn investigation_results_scoped_to_investigator() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town(true);
        room.investigation_results.push(InvestigationResult {
            investigator_id: town_id,
            target_id: mafia_id,
            is_mafia: true,
        });
        let viewer_view = build_view(&room, town_id).unwrap();
        assert_eq!(viewer_view.investigation_results.len(), 1);
        let other_view = build_view(&room, mafia_id).unwrap();
        assert!(other_view.investigation_results.is_empty());
    }

    #[test]
    fn locked_action_reflects_own_submitted_night_action() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town(true);
        room.phase = Phase::Night;
        room.night_actions.insert(
            Uuid::new_v4(),
            NightAction {
                id: mafia_id,
                action_id: Uuid::new_v4(),
                player_id: mafia_id,
                r#type: NightActionType::Kill,
                target_id: Some(town_id),
                submitted_at: 0,
                priority: 10,
            },
        );
        let view = build_view(&room, mafia_id).unwrap();
        assert_eq!(view.locked_action.unwrap().target_id, Some(town_id));
        let other_view = build_view(&room, town_id).unwrap();
        assert!(other_view.locked_action.is_none());
    }

    #[test]
    fn votes_hidden_when_anonymous() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town(true);
        room.phase = Phase::DayVoting;
        room.settings.anonymous_voting = true;
        room.votes.insert(
            Uuid::new_v4(),
            Vote {
                id: mafia_id,
                action_id: Uuid::new_v4(),
                player_id: mafia_id,
                target_id: Some(town_id),
                submitted_at: 0,
            },
        );
        let view = build_view(&room, town_id).unwrap();
        assert!(view.votes.is_none());
    }

    #[test]
    fn ended_game_reveals_every_role_regardless_of_death() {
        let (mut room, mafia_id, town_id) = room_with_mafia_and_town(false);
        room.phase = Phase::Ended;
        let view = build_view(&room, town_id).unwrap();
        let mafia_entry = view.players.iter().find(|p| p.id == mafia_id).unwrap();
        assert_eq!(mafia_entry.role_id, Some(RoleId::Mafia));
    }

    #[test]
    fn unknown_viewer_is_rejected() {
        let (room, _mafia_id, _town_id) = room_with_mafia_and_town(true);
        let result = build_view(&room, Uuid::new_v4());
        assert!(matches!(result, Err(RedactionError::UnknownViewer(_))));
    }
}
