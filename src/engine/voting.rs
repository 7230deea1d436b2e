//! Day-vote tally and lynch resolution.

use super::Effect;
use crate::protocol::types::{PlayerId, PlayerStatus, Room, VotingMode};
use std::collections::HashMap;

/// Resolve the room's current `votes` into a new `Room` plus effects.
/// Requires `room.phase == Phase::DayVoting`.
///
/// Tally each alive player's vote by that player's role voting weight
/// (today uniformly 1, via `crate::roles::definition(..).voting.weight`).
/// Abstentions (`targetId == None`) count toward turnout but not toward
/// any candidate. `settings.votingMode` decides whether a plurality
/// leader is enough or an absolute majority of cast (non-abstaining)
/// weight is required. A tie for the lead, or a majority room that
/// fails to clear 50%, ends the vote with no elimination.
pub fn resolve_votes(room: &Room) -> (Room, Vec<Effect>) {
    let mut next = room.clone();
    let mut effects = Vec::new();

    let mut tally: HashMap<PlayerId, u32> = HashMap::new();

    for vote in room.votes.values() {
        let Some(voter) = room.players.get(&vote.player_id) else {
            continue;
        };
        if !voter.is_alive() {
            continue;
        }
        let weight = voter
            .role_id
            .map(|r| crate::roles::definition(r).voting.weight)
            .unwrap_or(1);
        if let Some(target_id) = vote.target_id {
            *tally.entry(target_id).or_insert(0) += weight;
        }
    }

    // The majority threshold is computed against every alive player's
    // weight, not against turnout — a lynch needs a majority of
    // the room, not a majority of whoever bothered to vote.
    let alive_weight_total: u32 = room
        .alive_players()
        .map(|p| {
            p.role_id
                .map(|r| crate::roles::definition(r).voting.weight)
                .unwrap_or(1)
        })
        .sum();

    let winner = leading_candidate(&tally);

    let eliminated = match winner {
        Some((candidate, votes)) => match room.settings.voting_mode {
            VotingMode::Majority => {
                if alive_weight_total > 0 && votes >= alive_weight_total / 2 + 1 {
                    Some(candidate)
                } else {
                    None
                }
            }
            VotingMode::Plurality => Some(candidate),
        },
        None => None,
    };

    let mut final_tally: Vec<_> = tally
        .iter()
        .map(|(target_id, weight)| crate::protocol::types::FinalVoteTally {
            target_id: *target_id,
            weight: *weight,
        })
        .collect();
    final_tally.sort_by_key(|e| e.target_id);
    next.last_vote_tally = final_tally;

    match eliminated {
        Some(target_id) => {
            if let Some(target) = next.players.get_mut(&target_id) {
                target.status = PlayerStatus::Dead;
                let votes_cast = tally.get(&target_id).copied().unwrap_or(0);
                let mut narrative = format!(
                    "{} was lynched with {} votes.",
                    target.name, votes_cast
                );
                if room.settings.reveal_roles_on_death {
                    if let Some(role) = target.role_id {
                        narrative.push_str(&format!(" They were a {}.", role_label(role)));
                    }
                }
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
        }
        None => {
            let narrative =
                "No one was lynched. The town could not reach a decision.".to_string();
            next.public_narrative.push(narrative.clone());
            effects.push(Effect::Narrative(narrative));
        }
    }

    next.votes.clear();
    (next, effects)
}

/// Returns the single strict leader `(candidate, votes)`, or `None` if
/// there is no candidate or the top two are tied.
fn leading_candidate(tally: &HashMap<PlayerId, u32>) -> Option<(PlayerId, u32)> {
    let mut sorted: Vec<_> = tally.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    match sorted.as_slice() {
        [] => None,
        [only] => Some((*only.0, *only.1)),
        [first, second, ..] => {
            if first.1 == second.1 {
                None
            } else {
                Some((*first.0, *first.1))
            }
        }
    }
}

fn role_label(role: crate::protocol::types::RoleId) -> &'static str {
    match role {
        crate::protocol::types::RoleId::Mafia => "mafia",
        crate::protocol::types::RoleId::Detective => "detective",
        crate::protocol::types::RoleId::Doctor => "doctor",
        crate::protocol::types::RoleId::Townsperson => "townsperson",
    }
}
