//! Command dispatcher: the single place a validated, session-bound
//! client command becomes a committed room mutation and a set of
//! wire events.
//!
//! Grounded on `room_service.rs`'s join/leave pipeline shape (load →
//! validate → mutate → broadcast) from the teacher's
//! `EnhancedGameServer`, with the distributed-lock-per-operation it
//! used replaced by the room leader check from [`crate::leader`] — a
//! room's phase-scheduler and command-commit paths both only ever act
//! when this instance holds that room's lease, so no separate
//! write-lock is needed per command.

use std::sync::{Arc, Mutex as StdMutex};

use rand::seq::SliceRandom;

use crate::coordination::dedup::{DedupCache, DedupCacheKey, DedupProbe, DedupState};
use crate::database::{RoomStore, StoreError};
use crate::engine::redaction;
use crate::engine::{self, Effect};
use crate::leader::LeaderElector;
use crate::policy::{self, Command};
use crate::protocol::error_codes::ErrorCode;
use crate::protocol::messages::ServerMessage;
use crate::protocol::types::{
    ActionId, NightAction, NightActionType, Phase, Player, PlayerId, Room, RoomId, RoomSettings,
    Vote, MAX_NAME_LENGTH, MIN_NAME_LENGTH,
};
use crate::roles;
use crate::scheduler::SchedulerRegistry;
use crate::session::SessionManager;

const MAX_WRITE_LOSS_RETRIES: u8 = 3;

/// Ties together the store, session layer, leader election, and
/// idempotency cache into the command pipeline every `ClientMessage`
/// (besides `Ping`) flows through.
pub struct Dispatcher {
    store: Arc<dyn RoomStore>,
    sessions: Arc<SessionManager>,
    leader: Arc<LeaderElector>,
    dedup: DedupCache,
    scheduler: Arc<SchedulerRegistry>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn RoomStore>,
        sessions: Arc<SessionManager>,
        leader: Arc<LeaderElector>,
        dedup: DedupCache,
        scheduler: Arc<SchedulerRegistry>,
    ) -> Self {
        Self {
            store,
            sessions,
            leader,
            dedup,
            scheduler,
        }
    }

    /// Create a new room with `host_id` as host and first player.
    pub async fn create_room(
        &self,
        host_id: PlayerId,
        host_name: String,
        now_ms: i64,
    ) -> Result<Room, ErrorCode> {
        validate_name(&host_name)?;
        self.store
            .create_room(Box::new(move |id, code| {
                Room::new(id, code, host_id, host_name, now_ms)
            }))
            .await
            .map_err(|error| {
                tracing::error!(%error, "room creation failed");
                ErrorCode::InternalError
            })
    }

    /// Join an existing room by its human-readable code.
    pub async fn join_room(
        &self,
        room_code: &str,
        player_id: PlayerId,
        player_name: String,
    ) -> Result<Room, ErrorCode> {
        validate_name(&player_name)?;
        let Some(room_id) = self.store.find_room_by_code(room_code).await else {
            return Err(ErrorCode::RoomNotFound);
        };
        let room = self
            .commit(room_id, move |room| {
                if !room.can_join() {
                    return Err(if room.players.len() >= room.settings.max_players as usize {
                        ErrorCode::RoomFull
                    } else {
                        ErrorCode::WrongPhase
                    });
                }
                let mut next = room.clone();
                next.players
                    .insert(player_id, Player::new(player_id, player_name.clone()));
                Ok(next)
            })
            .await?;
        self.broadcast_snapshots(&room).await;
        Ok(room)
    }

    /// Start the game: assign roles and transition `Lobby` -> `Night`.
    pub async fn start_game(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        now_ms: i64,
    ) -> Result<Room, ErrorCode> {
        let effects_out: Arc<StdMutex<Vec<Effect>>> = Arc::new(StdMutex::new(Vec::new()));
        let effects_in = effects_out.clone();

        let room = self
            .commit(room_id, move |room| {
                policy::check(room, &Command::StartGame { player_id })?;
                let mut assigned = room.clone();
                assign_roles(&mut assigned);
                let (next, effects) = engine::phase::advance(&assigned, now_ms);
                *effects_in.lock().expect("non-poisoned") = effects;
                Ok(next)
            })
            .await?;

        let effects = effects_out.lock().expect("non-poisoned").clone();
        self.broadcast_effects(room_id, &effects).await;
        broadcast_room_transition(&room, &self.sessions).await;
        self.scheduler.ensure_started(room_id);
        Ok(room)
    }

    /// Submit (or resubmit) a night action, deduped by `action_id`.
    pub async fn submit_night_action(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        action_id: ActionId,
        r#type: NightActionType,
        target_id: Option<PlayerId>,
        now_ms: i64,
    ) -> Result<(), ErrorCode> {
        self.dispatch_deduped_action(room_id, player_id, action_id, move |room| {
            let command = Command::SubmitNightAction {
                player_id,
                r#type,
                target_id,
            };
            policy::check(room, &command)?;
            let mut next = room.clone();
            next.night_actions.insert(
                action_id,
                NightAction {
                    id: player_id,
                    action_id,
                    player_id,
                    r#type,
                    target_id,
                    submitted_at: now_ms,
                    priority: r#type.priority(),
                },
            );
            Ok(next)
        })
        .await
    }

    /// Cast (or change) a day vote, deduped by `action_id`.
    pub async fn cast_vote(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        action_id: ActionId,
        target_id: Option<PlayerId>,
        now_ms: i64,
    ) -> Result<(), ErrorCode> {
        self.dispatch_deduped_action(room_id, player_id, action_id, move |room| {
            let command = Command::CastVote {
                player_id,
                target_id,
            };
            policy::check(room, &command)?;
            let mut next = room.clone();
            next.votes
                .retain(|_, vote| vote.player_id != player_id);
            next.votes.insert(
                action_id,
                Vote {
                    id: player_id,
                    action_id,
                    player_id,
                    target_id,
                    submitted_at: now_ms,
                },
            );
            Ok(next)
        })
        .await
    }

    /// Host-only settings change, applied only while in `Lobby`.
    pub async fn configure_room(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        settings: RoomSettings,
    ) -> Result<(), ErrorCode> {
        let result = self
            .commit(room_id, move |room| {
                if room.host_id != player_id {
                    return Err(ErrorCode::Unauthorized);
                }
                if room.phase != Phase::Lobby {
                    return Err(ErrorCode::WrongPhase);
                }
                let mut next = room.clone();
                next.settings = settings.clone();
                Ok(next)
            })
            .await;

        match result {
            Ok(room) => {
                self.broadcast_snapshots(&room).await;
                Ok(())
            }
            Err(code) => Err(code),
        }
    }

    /// Host-only removal of a lobby player, per [`Command::Kick`].
    pub async fn kick_player(
        &self,
        room_id: RoomId,
        host_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<(), ErrorCode> {
        let result = self
            .commit(room_id, move |room| {
                policy::check(room, &Command::Kick { host_id, target_id })?;
                let mut next = room.clone();
                next.players.remove(&target_id);
                Ok(next)
            })
            .await;

        match result {
            Ok(room) => {
                self.sessions.send_to_player(target_id, ServerMessage::Kicked).await;
                self.broadcast_snapshots(&room).await;
                Ok(())
            }
            Err(code) => Err(code),
        }
    }

    /// Host-only chat mute toggle, per [`Command::Mute`].
    pub async fn mute_player(
        &self,
        room_id: RoomId,
        host_id: PlayerId,
        target_id: PlayerId,
        muted: bool,
    ) -> Result<(), ErrorCode> {
        let result = self
            .commit(room_id, move |room| {
                policy::check(
                    room,
                    &Command::Mute {
                        host_id,
                        target_id,
                        muted,
                    },
                )?;
                let mut next = room.clone();
                if let Some(player) = next.players.get_mut(&target_id) {
                    player.muted = muted;
                }
                Ok(next)
            })
            .await;

        match result {
            Ok(room) => {
                self.broadcast_snapshots(&room).await;
                Ok(())
            }
            Err(code) => Err(code),
        }
    }

    /// Host-only direct nudge, per [`Command::Nudge`]. Carries no state
    /// change, so it reads room state but never commits a mutation.
    pub async fn nudge_player(
        &self,
        room_id: RoomId,
        host_id: PlayerId,
        target_id: PlayerId,
    ) -> Result<(), ErrorCode> {
        let Some(room) = self.store.get_room_state(room_id).await else {
            return Err(ErrorCode::RoomNotFound);
        };
        policy::check(&room, &Command::Nudge { host_id, target_id })?;
        self.sessions.send_to_player(target_id, ServerMessage::Nudged).await;
        Ok(())
    }

    /// Relay a chat line to the room without touching room state. Muted
    /// players are dropped silently rather than being told so — per the
    /// host-moderation model, a mute is invisible to the muted player.
    pub async fn chat_message(&self, room_id: RoomId, player_id: PlayerId, text: String) {
        if let Some(room) = self.store.get_room_state(room_id).await {
            if room.players.get(&player_id).map(|p| p.muted).unwrap_or(false) {
                return;
            }
        }
        self.sessions
            .broadcast(room_id, ServerMessage::ChatRelayed { player_id, text })
            .await;
    }

    async fn dispatch_deduped_action(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        action_id: ActionId,
        mutate: impl Fn(&Room) -> Result<Room, ErrorCode> + Send + Sync + 'static,
    ) -> Result<(), ErrorCode> {
        let key = DedupCacheKey {
            room_id,
            player_id,
            action_id,
        };
        match self.dedup.claim(key.clone()).await {
            DedupProbe::Known(DedupState::Completed(response)) => {
                self.sessions.send_to_player(player_id, response).await;
                return Ok(());
            }
            DedupProbe::Known(DedupState::Failed(code)) => return Err(code),
            DedupProbe::Known(DedupState::Processing) => {
                return Err(ErrorCode::IdempotentDuplicate)
            }
            DedupProbe::NotSeen => {}
        }

        let result = self.commit(room_id, mutate).await;

        match &result {
            Ok(room) => {
                let response = ServerMessage::ActionAck {
                    action_id: Some(action_id),
                    accepted: true,
                };
                self.dedup
                    .resolve(key, DedupState::Completed(response.clone()))
                    .await;
                self.sessions.send_to_player(player_id, response).await;
                self.broadcast_snapshots(room).await;
                self.scheduler.poke(room_id);
            }
            Err(code) => {
                self.dedup.resolve(key, DedupState::Failed(*code)).await;
                self.sessions
                    .send_to_player(
                        player_id,
                        ServerMessage::ActionAck {
                            action_id: Some(action_id),
                            accepted: false,
                        },
                    )
                    .await;
                self.sessions
                    .send_to_player(
                        player_id,
                        ServerMessage::Error {
                            code: *code,
                            message: code.description().to_string(),
                        },
                    )
                    .await;
            }
        }

        result.map(|_| ())
    }

    /// Load, mutate, and commit `room_id`'s state, retrying a handful of
    /// times on [`StoreError::WriteLoss`] — a concurrent mutator on
    /// another instance racing this one to commit first, not a
    /// validation failure. `mutate` runs entirely synchronously inside
    /// the store's write lock, so it must never perform I/O.
    async fn commit(
        &self,
        room_id: RoomId,
        mutate: impl Fn(&Room) -> Result<Room, ErrorCode> + Send + Sync + 'static,
    ) -> Result<Room, ErrorCode> {
        let mutate = Arc::new(mutate);
        let mut attempts = 0u8;
        loop {
            let rejected: Arc<StdMutex<Option<ErrorCode>>> = Arc::new(StdMutex::new(None));
            let rejected_in = rejected.clone();
            let mutate = mutate.clone();

            let outcome = self
                .store
                .update_room_state_safe(
                    room_id,
                    Box::new(move |room| {
                        mutate(room).map_err(|code| {
                            *rejected_in.lock().expect("non-poisoned") = Some(code);
                            StoreError::MutationRejected
                        })
                    }),
                )
                .await;

            match outcome {
                Ok(room) => return Ok(room),
                Err(StoreError::WriteLoss) if attempts < MAX_WRITE_LOSS_RETRIES => {
                    attempts += 1;
                    continue;
                }
                Err(StoreError::MutationRejected) => {
                    return Err(rejected
                        .lock()
                        .expect("non-poisoned")
                        .unwrap_or(ErrorCode::InternalError));
                }
                Err(StoreError::NotFound(_)) => return Err(ErrorCode::RoomNotFound),
                Err(error) => {
                    tracing::error!(%room_id, %error, "room commit failed after retries");
                    return Err(ErrorCode::InternalError);
                }
            }
        }
    }

    async fn broadcast_effects(&self, room_id: RoomId, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::Narrative(text) => {
                    // Narratives are folded into `public_narrative` by the
                    // reducer and delivered as part of the room snapshot;
                    // nothing further to broadcast here.
                    let _ = text;
                }
                Effect::PlayerDied { player_id, .. } => {
                    self.sessions
                        .broadcast(
                            room_id,
                            ServerMessage::PlayerStatus {
                                player_id: *player_id,
                                status: crate::protocol::types::PlayerStatus::Dead,
                            },
                        )
                        .await;
                }
                Effect::VictoryReached(_) => {}
            }
        }
    }

    async fn broadcast_snapshots(&self, room: &Room) {
        broadcast_room_transition(room, &self.sessions).await;
    }
}

fn validate_name(name: &str) -> Result<(), ErrorCode> {
    let len = name.chars().count();
    if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&len) {
        return Err(ErrorCode::InvalidName);
    }
    Ok(())
}

/// Shuffle players into roles per [`roles::role_distribution`].
/// Grounded on `examples/emersonford-mafia-game/mafia-game-server-lib/src/game.rs`'s
/// `clients.shuffle(&mut seed)` role-assignment step.
fn assign_roles(room: &mut Room) {
    let mut ids: Vec<PlayerId> = room.players.keys().copied().collect();
    ids.shuffle(&mut rand::thread_rng());
    let assigned_roles = roles::role_distribution(ids.len());
    for (id, role) in ids.into_iter().zip(assigned_roles) {
        if let Some(player) = room.players.get_mut(&id) {
            player.role_id = Some(role);
            player.alignment = Some(role.alignment());
        }
    }
}

/// Push every connected player their own redacted snapshot plus, when
/// the room's phase just changed, a `PhaseChange` event. Shared between
/// the dispatcher (after a committed command) and the scheduler (after
/// a phase transition) so both ends of the pipeline broadcast
/// identically.
pub async fn broadcast_room_transition(room: &Room, sessions: &SessionManager) {
    sessions
        .broadcast(
            room.id,
            ServerMessage::PhaseChange {
                room_id: room.id,
                phase: room.phase,
                ends_at: room.timer.map(|t| t.ends_at),
            },
        )
        .await;

    if let Some(narrative) = room.public_narrative.last() {
        let event = match room.phase {
            Phase::DayAnnouncement => ServerMessage::NightPublicResult {
                narrative: narrative.clone(),
            },
            Phase::Night | Phase::Ended => ServerMessage::LynchResult {
                narrative: narrative.clone(),
            },
            _ => ServerMessage::LynchResult {
                narrative: narrative.clone(),
            },
        };
        sessions.broadcast(room.id, event).await;
    }

    for player_id in room.players.keys().copied().collect::<Vec<_>>() {
        match redaction::build_view(room, player_id) {
            Ok(view) => {
                sessions
                    .send_to_player(player_id, ServerMessage::RoomSnapshot(Box::new(view)))
                    .await;
            }
            Err(error) => {
                tracing::error!(room_id = %room.id, %player_id, %error, "redaction self-check failed, dropping snapshot for viewer");
            }
        }
    }
}
