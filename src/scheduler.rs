//! Phase scheduler: one background task per active room that decides
//! when a phase ends — either its timer expiring or every required
//! player finishing early — and drives the transition through the same
//! reducer/commit/broadcast path the dispatcher uses for commands.
//!
//! Grounded on `coordination::dedup::DedupCache::spawn_maintenance`'s
//! interval-loop shape and `examples/emersonford-mafia-game/mafia-game-server-lib/src/game.rs`'s
//! `poll_end_cycle` (the teacher's "has everyone who needs to act,
//! acted" early-completion check) — combined into a `tokio::select!`
//! over a timer sleep and an mpsc "poke" channel the dispatcher signals
//! on every command that might satisfy a phase's completion predicate.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;

use crate::database::RoomStore;
use crate::leader::LeaderElector;
use crate::protocol::types::{Phase, Room, RoleId, RoomId};
use crate::session::SessionManager;

/// Capacity of each room's poke channel. A handful of commands can
/// arrive between scheduler wakeups; this is not a backpressure point,
/// just headroom so a burst of `try_send` calls never blocks the
/// dispatcher.
const POKE_CHANNEL_CAPACITY: usize = 16;

/// Signal sent by the dispatcher after a command that may have
/// satisfied the current phase's completion predicate (a night action
/// or vote submission). Carries no payload — the scheduler re-reads
/// room state itself.
#[derive(Debug, Clone, Copy)]
pub struct Poke;

struct SchedulerHandle {
    poke_tx: mpsc::Sender<Poke>,
    task: tokio::task::JoinHandle<()>,
}

/// Process-wide registry of running per-room scheduler tasks.
pub struct SchedulerRegistry {
    handles: DashMap<RoomId, SchedulerHandle>,
    store: Arc<dyn RoomStore>,
    sessions: Arc<SessionManager>,
    leader: Arc<LeaderElector>,
}

impl SchedulerRegistry {
    pub fn new(
        store: Arc<dyn RoomStore>,
        sessions: Arc<SessionManager>,
        leader: Arc<LeaderElector>,
    ) -> Self {
        Self {
            handles: DashMap::new(),
            store,
            sessions,
            leader,
        }
    }

    /// Start (if not already running) the scheduler task for `room_id`.
    /// Called by the dispatcher once a room leaves `Lobby`.
    pub fn ensure_started(self: &Arc<Self>, room_id: RoomId) {
        if self.handles.contains_key(&room_id) {
            return;
        }
        let (poke_tx, poke_rx) = mpsc::channel(POKE_CHANNEL_CAPACITY);
        let registry = self.clone();
        let task = tokio::spawn(async move {
            registry.run_room(room_id, poke_rx).await;
        });
        self.handles.insert(room_id, SchedulerHandle { poke_tx, task });
    }

    /// Wake the scheduler for `room_id` to re-check its completion
    /// predicate. A no-op if no scheduler is running for this room
    /// (e.g. it is still in `Lobby`).
    pub fn poke(&self, room_id: RoomId) {
        if let Some(handle) = self.handles.get(&room_id) {
            let _ = handle.poke_tx.try_send(Poke);
        }
    }

    /// Stop and drop the scheduler task for a room that has ended or
    /// been deleted.
    pub fn stop(&self, room_id: RoomId) {
        if let Some((_, handle)) = self.handles.remove(&room_id) {
            handle.task.abort();
        }
    }

    /// Abort every running scheduler task — called on graceful shutdown.
    pub fn shutdown(&self) {
        for entry in self.handles.iter() {
            entry.value().task.abort();
        }
        self.handles.clear();
    }

    async fn run_room(self: Arc<Self>, room_id: RoomId, mut poke_rx: mpsc::Receiver<Poke>) {
        loop {
            let Some(room) = self.store.get_room_state(room_id).await else {
                break;
            };
            if room.phase == Phase::Ended {
                break;
            }

            let wake_at = room.timer.map(|t| {
                TokioInstant::now()
                    + millis_until(t.ends_at, now_ms())
            });

            let fired_on_timer = match wake_at {
                Some(deadline) => tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => true,
                    poke = poke_rx.recv() => {
                        if poke.is_none() {
                            break;
                        }
                        false
                    }
                },
                None => match poke_rx.recv().await {
                    Some(_) => false,
                    None => break,
                },
            };

            if !self.leader.try_become_leader(room_id).await {
                // Another instance holds the lease; give it a moment to
                // act and re-read state on the next loop iteration.
                tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                continue;
            }

            let should_advance = if fired_on_timer {
                true
            } else {
                completion_satisfied(&room)
            };
            if !should_advance {
                continue;
            }

            let now = now_ms();
            let result = self
                .store
                .update_room_state_safe(
                    room_id,
                    Box::new(move |current| {
                        let (next, _effects) = crate::engine::phase::advance(current, now);
                        Ok(next)
                    }),
                )
                .await;

            match result {
                Ok(next_room) => {
                    crate::server::dispatcher::broadcast_room_transition(
                        &next_room,
                        &self.sessions,
                    )
                    .await;
                    if next_room.phase == Phase::Ended {
                        self.leader.resign(room_id).await;
                        self.sessions.clear_room(room_id).await;
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(%room_id, %error, "scheduler failed to commit phase transition");
                }
            }
        }
        self.handles.remove(&room_id);
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn millis_until(ends_at: i64, now: i64) -> std::time::Duration {
    let remaining = ends_at - now;
    if remaining <= 0 {
        std::time::Duration::ZERO
    } else {
        std::time::Duration::from_millis(remaining as u64)
    }
}

/// Whether every alive player required to act this phase has done so.
/// `Lobby`, `DayAnnouncement`, `DayDiscussion`, and `Ended` have no
/// early-completion predicate — only their timer ends them.
///
/// Night completion is mafia + detective only — the doctor's protect is
/// optional, so a doctor sitting out never stalls the room past its
/// timer.
fn completion_satisfied(room: &Room) -> bool {
    match room.phase {
        Phase::Night => room
            .alive_players()
            .filter(|p| matches!(p.role_id, Some(RoleId::Mafia) | Some(RoleId::Detective)))
            .all(|p| room.night_actions.values().any(|a| a.player_id == p.id)),
        Phase::DayVoting => room
            .alive_players()
            .all(|p| room.votes.values().any(|v| v.player_id == p.id)),
        Phase::Lobby | Phase::DayAnnouncement | Phase::DayDiscussion | Phase::Ended => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{NightAction, NightActionType, Player, RoleId, Vote};
    use uuid::Uuid;

    fn base_room() -> Room {
        Room::new(Uuid::new_v4(), "ABCDEF".into(), Uuid::new_v4(), "Host".into(), 0)
    }

    #[test]
    fn night_completion_requires_every_acting_role_to_submit() {
        let mut room = base_room();
        room.phase = Phase::Night;
        let mafia_id = Uuid::new_v4();
        let mut mafia = Player::new(mafia_id, "M".into());
        mafia.role_id = Some(RoleId::Mafia);
        room.players.insert(mafia_id, mafia);
        assert!(!completion_satisfied(&room));

        room.night_actions.insert(
            Uuid::new_v4(),
            NightAction {
                id: mafia_id,
                action_id: Uuid::new_v4(),
                player_id: mafia_id,
                r#type: NightActionType::Kill,
                target_id: None,
                submitted_at: 0,
                priority: 10,
            },
        );
        assert!(completion_satisfied(&room));
    }

    #[test]
    fn night_completion_ignores_roles_without_a_night_action() {
        let mut room = base_room();
        room.phase = Phase::Night;
        let townsperson_id = Uuid::new_v4();
        let mut townsperson = Player::new(townsperson_id, "T".into());
        townsperson.role_id = Some(RoleId::Townsperson);
        room.players.insert(townsperson_id, townsperson);
        assert!(completion_satisfied(&room));
    }

    #[test]
    fn voting_completion_requires_every_alive_player_to_vote() {
        let mut room = base_room();
        room.phase = Phase::DayVoting;
        let voter_id = Uuid::new_v4();
        room.players.insert(voter_id, Player::new(voter_id, "V".into()));
        assert!(!completion_satisfied(&room));

        room.votes.insert(
            Uuid::new_v4(),
            Vote {
                id: voter_id,
                action_id: Uuid::new_v4(),
                player_id: voter_id,
                target_id: None,
                submitted_at: 0,
            },
        );
        assert!(completion_satisfied(&room));
    }

    #[test]
    fn day_announcement_has_no_early_completion() {
        let mut room = base_room();
        room.phase = Phase::DayAnnouncement;
        assert!(!completion_satisfied(&room));
    }
}
