//! Role registry: a static table mapping role id to night-action
//! spec, target rules, visibility, voting weight, and win condition.
//!
//! Grounded on `examples/emersonford-mafia-game/mafia-game-lib/src/lib.rs`'s
//! `SpecialRole::allegiance()` mapping method, generalized from a single
//! allegiance lookup into the full per-role configuration table the
//! policy gate and redaction layer both consult.

use crate::protocol::types::{Alignment, NightActionType, RoleId};

/// Filter applied to legal night-action targets, beyond the alive/dead flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFilter {
    /// Target must not be mafia-aligned (the mafia KILL filter).
    NonMafia,
    /// Any alive player is a legal target.
    AnyAlive,
    /// No targeting applies (role has no night action).
    None,
}

/// Targeting rules for a role's night action.
#[derive(Debug, Clone, Copy)]
pub struct TargetRules {
    pub allow_self: bool,
    pub allow_alive: bool,
    pub allow_dead: bool,
    pub filter: TargetFilter,
}

/// Night-action spec for roles that have one.
#[derive(Debug, Clone, Copy)]
pub struct NightActionSpec {
    pub r#type: NightActionType,
    pub priority: u8,
    pub max_targets: u8,
    pub target_required: bool,
}

/// What a role can see.
#[derive(Debug, Clone, Copy)]
pub struct Visibility {
    /// Only ever true for mafia.
    pub knows_teammates: bool,
    pub sees_vote_tallies: VoteTalliesVisibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTalliesVisibility {
    Live,
    Final,
    None,
}

/// Voting configuration for a role.
#[derive(Debug, Clone, Copy)]
pub struct VotingRules {
    pub can_vote: bool,
    pub weight: u32,
}

/// Who must be eliminated or survive for this role's side to win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinCondition {
    /// Win when no town/neutral majority remains (mafia's condition).
    EliminateTown,
    /// Win when no mafia remain (town's condition).
    EliminateMafia,
}

/// Full static configuration for one role.
#[derive(Debug, Clone, Copy)]
pub struct RoleDefinition {
    pub alignment: Alignment,
    pub night: Option<NightActionSpec>,
    pub targets: TargetRules,
    pub visibility: Visibility,
    pub voting: VotingRules,
    pub win_condition: WinCondition,
}

/// Look up the static definition for a role. Total function — every
/// `RoleId` variant has an entry.
pub fn definition(role: RoleId) -> RoleDefinition {
    match role {
        RoleId::Mafia => RoleDefinition {
            alignment: Alignment::Mafia,
            night: Some(NightActionSpec {
                r#type: NightActionType::Kill,
                priority: NightActionType::Kill.priority(),
                max_targets: 1,
                target_required: true,
            }),
            targets: TargetRules {
                allow_self: false,
                allow_alive: true,
                allow_dead: false,
                filter: TargetFilter::NonMafia,
            },
            visibility: Visibility {
                knows_teammates: true,
                sees_vote_tallies: VoteTalliesVisibility::Live,
            },
            voting: VotingRules {
                can_vote: true,
                weight: 1,
            },
            win_condition: WinCondition::EliminateTown,
        },
        RoleId::Detective => RoleDefinition {
            alignment: Alignment::Town,
            night: Some(NightActionSpec {
                r#type: NightActionType::Investigate,
                priority: NightActionType::Investigate.priority(),
                max_targets: 1,
                target_required: true,
            }),
            targets: TargetRules {
                allow_self: false,
                allow_alive: true,
                allow_dead: false,
                filter: TargetFilter::AnyAlive,
            },
            visibility: Visibility {
                knows_teammates: false,
                sees_vote_tallies: VoteTalliesVisibility::Live,
            },
            voting: VotingRules {
                can_vote: true,
                weight: 1,
            },
            win_condition: WinCondition::EliminateMafia,
        },
        RoleId::Doctor => RoleDefinition {
            alignment: Alignment::Town,
            night: Some(NightActionSpec {
                r#type: NightActionType::Protect,
                priority: NightActionType::Protect.priority(),
                max_targets: 1,
                target_required: true,
            }),
            targets: TargetRules {
                allow_self: true,
                allow_alive: true,
                allow_dead: false,
                filter: TargetFilter::AnyAlive,
            },
            visibility: Visibility {
                knows_teammates: false,
                sees_vote_tallies: VoteTalliesVisibility::Live,
            },
            voting: VotingRules {
                can_vote: true,
                weight: 1,
            },
            win_condition: WinCondition::EliminateMafia,
        },
        RoleId::Townsperson => RoleDefinition {
            alignment: Alignment::Town,
            night: None,
            targets: TargetRules {
                allow_self: false,
                allow_alive: false,
                allow_dead: false,
                filter: TargetFilter::None,
            },
            visibility: Visibility {
                knows_teammates: false,
                sees_vote_tallies: VoteTalliesVisibility::Live,
            },
            voting: VotingRules {
                can_vote: true,
                weight: 1,
            },
            win_condition: WinCondition::EliminateMafia,
        },
    }
}

/// Role distribution for `player_count` players: always 1 detective
/// + 1 doctor, `mafiaCount = max(1, floor(n/3))`, remainder townsperson.
///
/// Returns a `Vec<RoleId>` whose length equals `player_count`, in no
/// particular order — callers pair it with a shuffled player id list.
pub fn role_distribution(player_count: usize) -> Vec<RoleId> {
    let mafia_count = std::cmp::max(1, player_count / 3);
    let mut roles = Vec::with_capacity(player_count);
    roles.extend(std::iter::repeat_n(RoleId::Mafia, mafia_count));
    if player_count > mafia_count {
        roles.push(RoleId::Detective);
    }
    if player_count > mafia_count + 1 {
        roles.push(RoleId::Doctor);
    }
    while roles.len() < player_count {
        roles.push(RoleId::Townsperson);
    }
    roles.truncate(player_count);
    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mafia_filter_excludes_mafia_targets() {
        let def = definition(RoleId::Mafia);
        assert_eq!(def.targets.filter, TargetFilter::NonMafia);
        assert!(!def.targets.allow_self);
    }

    #[test]
    fn only_mafia_knows_teammates() {
        for role in [
            RoleId::Mafia,
            RoleId::Detective,
            RoleId::Doctor,
            RoleId::Townsperson,
        ] {
            let def = definition(role);
            assert_eq!(def.visibility.knows_teammates, role == RoleId::Mafia);
        }
    }

    #[test]
    fn doctor_may_target_self() {
        assert!(definition(RoleId::Doctor).targets.allow_self);
    }

    #[test]
    fn distribution_for_five_players() {
        let roles = role_distribution(5);
        assert_eq!(roles.len(), 5);
        let mafia = roles.iter().filter(|r| **r == RoleId::Mafia).count();
        let detective = roles.iter().filter(|r| **r == RoleId::Detective).count();
        let doctor = roles.iter().filter(|r| **r == RoleId::Doctor).count();
        assert_eq!(mafia, 1);
        assert_eq!(detective, 1);
        assert_eq!(doctor, 1);
    }

    #[test]
    fn distribution_scales_mafia_count() {
        // floor(9/3) = 3 mafia.
        let roles = role_distribution(9);
        let mafia = roles.iter().filter(|r| **r == RoleId::Mafia).count();
        assert_eq!(mafia, 3);
        assert_eq!(roles.len(), 9);
    }

    #[test]
    fn distribution_never_empty_of_mafia() {
        // floor(3/3) = 1, but max(1, ...) guards the floor(n/3)==0 case too.
        for n in 3..=4 {
            let roles = role_distribution(n);
            assert!(roles.iter().any(|r| *r == RoleId::Mafia));
        }
    }
}
