//! Night resolution.

use super::Effect;
use crate::protocol::types::{Alignment, NightActionType, PlayerId, Room};

/// Resolve the room's current `nightActions` into a new `Room` plus
/// effects. Requires `room.phase == Phase::Night`; callers enforce that
/// via the policy gate / scheduler before calling this.
///
/// Algorithm:
/// 1. Materialise actions, sort by `(priority asc, submittedAt asc, actionId asc)`.
/// 2. Scan once maintaining a single `queuedKillTarget`.
/// 3. If a kill survived, mark dead and narrate; else narrate "no one died".
/// 4. Clear `nightActions`.
pub fn resolve_night(room: &Room) -> (Room, Vec<Effect>) {
    let mut next = room.clone();
    let mut effects = Vec::new();

    let mut actions: Vec<_> = room.night_actions.values().collect();
    actions.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.submitted_at.cmp(&b.submitted_at))
            .then(a.action_id.cmp(&b.action_id))
    });

    let mut queued_kill_target: Option<PlayerId> = None;

    for action in actions {
        let Some(actor) = room.players.get(&action.player_id) else {
            continue;
        };
        if !actor.is_alive() {
            continue;
        }

        match action.r#type {
            NightActionType::Kill => {
                if actor.role_id != Some(crate::protocol::types::RoleId::Mafia) {
                    continue;
                }
                let Some(target_id) = action.target_id else {
                    continue;
                };
                let Some(target) = room.players.get(&target_id) else {
                    continue;
                };
                if !target.is_alive() || target.alignment == Some(Alignment::Mafia) {
                    continue;
                }
                queued_kill_target = Some(target_id);
            }
            NightActionType::Protect => {
                if actor.role_id != Some(crate::protocol::types::RoleId::Doctor) {
                    continue;
                }
                let Some(target_id) = action.target_id else {
                    continue;
                };
                let Some(target) = room.players.get(&target_id) else {
                    continue;
                };
                if !target.is_alive() {
                    continue;
                }
                if queued_kill_target == Some(target_id) {
                    queued_kill_target = None;
                }
            }
            NightActionType::Investigate => {
                if actor.role_id != Some(crate::protocol::types::RoleId::Detective) {
                    continue;
                }
                let Some(target_id) = action.target_id else {
                    continue;
                };
                let Some(target) = room.players.get(&target_id) else {
                    continue;
                };
                if !target.is_alive() {
                    continue;
                }
                next.investigation_results
                    .push(crate::protocol::types::InvestigationResult {
                        investigator_id: action.player_id,
                        target_id,
                        is_mafia: target.alignment == Some(Alignment::Mafia),
                    });
            }
            NightActionType::None => {}
        }
    }

    if let Some(target_id) = queued_kill_target {
        if let Some(target) = next.players.get_mut(&target_id) {
            target.status = crate::protocol::types::PlayerStatus::Dead;
            let narrative = format!("{} was eliminated during the night.", target.name);
            next.public_narrative.push(narrative.clone());
            effects.push(Effect::Narrative(narrative));
            effects.push(Effect::PlayerDied {
                player_id: target_id,
                role_revealed: if room.settings.reveal_roles_on_death {
                    target.role_id
                } else {
                    None
                },
            });
        }
    } else {
        let narrative = "No one died during the night.".to_string();
        next.public_narrative.push(narrative.clone());
        effects.push(Effect::Narrative(narrative));
    }

    next.night_actions.clear();
    (next, effects)
}
