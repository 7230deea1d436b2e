use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a room.
pub type RoomId = Uuid;
/// Unique identifier for a player within a room.
pub type PlayerId = Uuid;
/// Unique identifier for a client-submitted action (night action or vote).
pub type ActionId = Uuid;
/// Opaque per-(player,room) session identifier.
pub type SessionId = Uuid;

/// Default deployment region identifier when one is not configured.
pub const DEFAULT_REGION_ID: &str = "default";

/// Minimum allowed length for a host or player display name.
pub const MIN_NAME_LENGTH: usize = 3;
/// Maximum allowed length for a host or player display name.
pub const MAX_NAME_LENGTH: usize = 15;

/// A player's in-game function.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleId {
    Mafia,
    Detective,
    Doctor,
    Townsperson,
}

impl RoleId {
    pub fn alignment(self) -> Alignment {
        match self {
            Self::Mafia => Alignment::Mafia,
            Self::Detective | Self::Doctor | Self::Townsperson => Alignment::Town,
        }
    }
}

/// A player's political faction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Mafia,
    Town,
    Neutral,
}

/// Whether a player is still participating in the round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Alive,
    Dead,
    Disconnected,
}

/// The room's finite-state-machine phase.
///
/// This is the six-phase model spec.md's Open Questions section settles
/// on (resolving the source's two incompatible `Phase` enums in favor of
/// the one the schemas and scheduler both use).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    Night,
    DayAnnouncement,
    DayDiscussion,
    DayVoting,
    Ended,
}

impl Phase {
    /// `true` for phases in which `timer` must be `null` (invariant 3).
    pub fn is_untimed(self) -> bool {
        matches!(self, Self::Lobby | Self::Ended)
    }

    pub fn next(self) -> Self {
        match self {
            Self::Lobby => Self::Night,
            Self::Night => Self::DayAnnouncement,
            Self::DayAnnouncement => Self::DayDiscussion,
            Self::DayDiscussion => Self::DayVoting,
            Self::DayVoting => Self::Night,
            Self::Ended => Self::Ended,
        }
    }
}

/// Night action kind. Priority order (ascending) is KILL, PROTECT, INVESTIGATE.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NightActionType {
    Kill,
    Protect,
    Investigate,
    None,
}

impl NightActionType {
    /// Deterministic tie-break priority used by night resolution.
    pub fn priority(self) -> u8 {
        match self {
            Self::Kill => 10,
            Self::Protect => 20,
            Self::Investigate => 30,
            Self::None => 255,
        }
    }
}

/// Voting mode selecting how the lynch target is chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VotingMode {
    Majority,
    Plurality,
}

/// The outcome of the game, once decided.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VictoryCondition {
    None,
    MafiaVictory,
    TownVictory,
}

/// Per-room configurable settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSettings {
    pub night_duration_ms: i64,
    pub day_duration_ms: i64,
    pub vote_duration_ms: i64,
    pub reveal_roles_on_death: bool,
    pub anonymous_voting: bool,
    pub voting_mode: VotingMode,
    pub min_players: u8,
    pub max_players: u8,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            night_duration_ms: 45_000,
            day_duration_ms: 120_000,
            vote_duration_ms: 60_000,
            reveal_roles_on_death: true,
            anonymous_voting: false,
            voting_mode: VotingMode::Majority,
            min_players: 3,
            max_players: 15,
        }
    }
}

/// The room's phase timer. `None` iff `phase ∈ {lobby, ended}` (invariant 3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhaseTimer {
    pub phase: Phase,
    pub started_at: i64,
    pub ends_at: i64,
}

/// A participant in the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role_id: Option<RoleId>,
    pub alignment: Option<Alignment>,
    pub status: PlayerStatus,
    pub connected: bool,
    pub afk_strikes: u8,
    pub session_id: Option<SessionId>,
    /// Host-imposed chat mute. Distinct from `status`/`connected`: a
    /// muted player is still alive and connected, their `ChatMessage`
    /// submissions are just dropped before relay.
    pub muted: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            role_id: None,
            alignment: None,
            status: PlayerStatus::Alive,
            connected: true,
            afk_strikes: 0,
            session_id: None,
            muted: false,
        }
    }

    /// `true` only for `status == Alive`. A player who has dropped out via
    /// repeated AFK strikes (`status == Disconnected`) is no longer a valid
    /// actor or target, distinct from a merely transport-disconnected but
    /// still-alive player (`connected == false`, `status` unchanged).
    pub fn is_alive(&self) -> bool {
        matches!(self.status, PlayerStatus::Alive)
    }
}

/// A submitted night action, keyed by `actionId` in `Room::night_actions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightAction {
    pub id: PlayerId,
    pub action_id: ActionId,
    pub player_id: PlayerId,
    pub r#type: NightActionType,
    pub target_id: Option<PlayerId>,
    pub submitted_at: i64,
    pub priority: u8,
}

/// A submitted vote, keyed by `actionId` in `Room::votes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: PlayerId,
    pub action_id: ActionId,
    pub player_id: PlayerId,
    pub target_id: Option<PlayerId>,
    pub submitted_at: i64,
}

/// One detective investigation result, visible only to its investigator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub investigator_id: PlayerId,
    pub target_id: PlayerId,
    pub is_mafia: bool,
}

/// A frozen vote weight for one candidate, captured at the moment a
/// voting round resolves. `Room::votes` is cleared once the round
/// resolves (it only ever holds the *in-progress* round), so this is
/// the only place the previous round's tally survives for display in
/// the announcement/discussion phases that follow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalVoteTally {
    pub target_id: PlayerId,
    pub weight: u32,
}

/// The authoritative, unredacted state of a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub host_id: PlayerId,
    pub phase: Phase,
    pub timer: Option<PhaseTimer>,
    pub settings: RoomSettings,
    pub players: HashMap<PlayerId, Player>,
    pub night_actions: HashMap<ActionId, NightAction>,
    pub votes: HashMap<ActionId, Vote>,
    pub investigation_results: Vec<InvestigationResult>,
    pub public_narrative: Vec<String>,
    pub victory_condition: VictoryCondition,
    pub protocol_version: u32,
    pub last_snapshot: i64,
    /// Snapshot of the most recently resolved voting round's tally.
    /// Overwritten every time `resolve_votes` runs; see
    /// [`FinalVoteTally`].
    pub last_vote_tally: Vec<FinalVoteTally>,
}

/// Current protocol version; bumped on breaking wire changes.
pub const PROTOCOL_VERSION: u32 = 1;

impl Room {
    pub fn new(id: RoomId, code: String, host_id: PlayerId, host_name: String, now_ms: i64) -> Self {
        let mut players = HashMap::new();
        players.insert(host_id, Player::new(host_id, host_name));
        Self {
            id,
            code,
            host_id,
            phase: Phase::Lobby,
            timer: None,
            settings: RoomSettings::default(),
            players,
            night_actions: HashMap::new(),
            votes: HashMap::new(),
            investigation_results: Vec::new(),
            public_narrative: Vec::new(),
            victory_condition: VictoryCondition::None,
            protocol_version: PROTOCOL_VERSION,
            last_snapshot: now_ms,
            last_vote_tally: Vec::new(),
        }
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.is_alive())
    }

    pub fn can_join(&self) -> bool {
        matches!(self.phase, Phase::Lobby) && self.players.len() < self.settings.max_players as usize
    }
}
