//! End-to-end room lifecycle scenarios, exercised through the public
//! [`Dispatcher`] API plus the pure reducers it calls through to.
//! Each test below corresponds to one of the worked scenarios a room
//! can go through: a night kill, a protected kill, a detective
//! investigation, majority/plurality/tie lynches, and victory
//! detection once a round resolves.

use signal_fish_server::coordination::dedup::{DedupCache, DedupCacheSettings};
use signal_fish_server::database::{InMemoryRoomStore, RoomStore};
use signal_fish_server::distributed::InMemoryDistributedLock;
use signal_fish_server::engine::{self, redaction};
use signal_fish_server::leader::LeaderElector;
use signal_fish_server::metrics::ServerMetrics;
use signal_fish_server::protocol::{
    Alignment, NightActionType, Phase, PlayerStatus, RoleId, Room, RoomSettings, VictoryCondition,
    VotingMode,
};
use signal_fish_server::scheduler::SchedulerRegistry;
use signal_fish_server::server::dispatcher::Dispatcher;
use signal_fish_server::session::SessionManager;
use std::sync::Arc;
use uuid::Uuid;

/// A dispatcher plus the same store handle it was built with, so tests
/// can read committed state back the way the scheduler does, without
/// reaching into `Dispatcher`'s private fields.
struct Harness {
    dispatcher: Dispatcher,
    store: Arc<dyn RoomStore>,
}

impl Harness {
    fn new() -> Self {
        let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());
        let metrics = Arc::new(ServerMetrics::new());
        let sessions = Arc::new(SessionManager::new(300, 32, metrics));
        let leader = Arc::new(LeaderElector::new(
            Arc::new(InMemoryDistributedLock::new()),
            Uuid::new_v4(),
        ));
        let dedup_settings = DedupCacheSettings::default();
        let dedup = DedupCache::new(dedup_settings.capacity, dedup_settings.ttl);
        let scheduler = Arc::new(SchedulerRegistry::new(
            store.clone(),
            sessions.clone(),
            leader.clone(),
        ));
        let dispatcher = Dispatcher::new(store.clone(), sessions, leader, dedup, scheduler);
        Self { dispatcher, store }
    }

    async fn room(&self, room_id: Uuid) -> Room {
        self.store.get_room_state(room_id).await.unwrap()
    }

    /// Advance the room's phase `n` times, committing each step, and
    /// return the final state. Used to fast-forward through the
    /// untimed-by-the-test `day_announcement`/`day_discussion` legs
    /// between a night resolving and the next vote opening.
    async fn advance_n(&self, room: Room, n: usize, now_ms: i64) -> Room {
        let mut current = room;
        for _ in 0..n {
            let (next, _effects) = engine::phase::advance(&current, now_ms);
            self.store
                .update_room_state(current.id, next.clone())
                .await
                .unwrap();
            current = next;
        }
        current
    }
}

/// Seat a host plus `extra_players` more, then start the game. Returns
/// the room freshly transitioned into `Night` with roles assigned.
async fn seated_game(harness: &Harness, extra_players: usize) -> Room {
    let host_id = Uuid::new_v4();
    let room = harness
        .dispatcher
        .create_room(host_id, "Host".to_string(), 0)
        .await
        .unwrap();
    for i in 0..extra_players {
        harness
            .dispatcher
            .join_room(&room.code, Uuid::new_v4(), format!("Player{i}"))
            .await
            .unwrap();
    }
    harness
        .dispatcher
        .start_game(room.id, host_id, 0)
        .await
        .unwrap()
}

fn mafia_of(room: &Room) -> Uuid {
    room.players
        .values()
        .find(|p| p.role_id == Some(RoleId::Mafia))
        .unwrap()
        .id
}

fn doctor_of(room: &Room) -> Option<Uuid> {
    room.players
        .values()
        .find(|p| p.role_id == Some(RoleId::Doctor))
        .map(|p| p.id)
}

fn detective_of(room: &Room) -> Option<Uuid> {
    room.players
        .values()
        .find(|p| p.role_id == Some(RoleId::Detective))
        .map(|p| p.id)
}

fn town_excluding(room: &Room, excluded: &[Uuid]) -> Uuid {
    room.players
        .values()
        .find(|p| p.alignment == Some(Alignment::Town) && !excluded.contains(&p.id))
        .unwrap()
        .id
}

/// Scenario 1: a mafia kill with no doctor protection eliminates the
/// target, narrates the death, and the room advances to the next
/// (untimed-by-settings) phase.
#[tokio::test]
async fn kill_without_protect_eliminates_target_and_continues() {
    let harness = Harness::new();
    let room = seated_game(&harness, 4).await;
    assert_eq!(room.phase, Phase::Night);

    let mafia_id = mafia_of(&room);
    let target_id = town_excluding(&room, &[mafia_id]);

    harness
        .dispatcher
        .submit_night_action(
            room.id,
            mafia_id,
            Uuid::new_v4(),
            NightActionType::Kill,
            Some(target_id),
            100,
        )
        .await
        .unwrap();

    let room = harness.room(room.id).await;
    let (resolved, effects) = engine::phase::advance(&room, 200);
    assert_eq!(resolved.players[&target_id].status, PlayerStatus::Dead);
    assert!(resolved
        .public_narrative
        .iter()
        .any(|n| n.contains("eliminated during the night")));
    assert_eq!(resolved.phase, Phase::DayAnnouncement);
    assert!(!effects.is_empty());
}

/// Scenario 2: a doctor protecting the mafia's target cancels the
/// kill; the night resolves with no deaths.
#[tokio::test]
async fn protect_cancels_matching_kill() {
    let harness = Harness::new();
    let room = seated_game(&harness, 4).await;

    let mafia_id = mafia_of(&room);
    let doctor_id = doctor_of(&room).expect("5 players always seats a doctor");
    let target_id = town_excluding(&room, &[mafia_id, doctor_id]);

    harness
        .dispatcher
        .submit_night_action(
            room.id,
            mafia_id,
            Uuid::new_v4(),
            NightActionType::Kill,
            Some(target_id),
            0,
        )
        .await
        .unwrap();
    harness
        .dispatcher
        .submit_night_action(
            room.id,
            doctor_id,
            Uuid::new_v4(),
            NightActionType::Protect,
            Some(target_id),
            1,
        )
        .await
        .unwrap();

    let room = harness.room(room.id).await;
    let (resolved, _effects) = engine::phase::advance(&room, 10);
    assert_eq!(resolved.players[&target_id].status, PlayerStatus::Alive);
    assert!(resolved
        .public_narrative
        .iter()
        .any(|n| n == "No one died during the night."));
}

/// Scenario 3: a detective's investigation result is visible only in
/// that detective's own redacted view, never anyone else's.
#[tokio::test]
async fn detective_investigation_is_scoped_to_the_investigator() {
    let harness = Harness::new();
    let room = seated_game(&harness, 4).await;

    let mafia_id = mafia_of(&room);
    let detective_id = detective_of(&room).expect("5 players always seats a detective");

    harness
        .dispatcher
        .submit_night_action(
            room.id,
            detective_id,
            Uuid::new_v4(),
            NightActionType::Investigate,
            Some(mafia_id),
            0,
        )
        .await
        .unwrap();

    let room = harness.room(room.id).await;
    let (resolved, _effects) = engine::phase::advance(&room, 10);

    let detective_view = redaction::build_view(&resolved, detective_id).unwrap();
    assert_eq!(detective_view.investigation_results.len(), 1);
    assert_eq!(detective_view.investigation_results[0].target_id, mafia_id);
    assert!(detective_view.investigation_results[0].is_mafia);

    let other_town = town_excluding(&resolved, &[mafia_id, detective_id]);
    let other_view = redaction::build_view(&resolved, other_town).unwrap();
    assert!(other_view.investigation_results.is_empty());
}

/// Scenario 4: a majority lynch of the only mafia player reveals their
/// role in the narrative and ends the game in town's favor immediately.
#[tokio::test]
async fn majority_lynch_of_last_mafia_ends_the_game() {
    let harness = Harness::new();
    let room = seated_game(&harness, 4).await;
    let mafia_id = mafia_of(&room);

    // Empty night -> day_announcement -> day_discussion -> day_voting.
    let room = harness.advance_n(room, 3, 0).await;
    assert_eq!(room.phase, Phase::DayVoting);

    let voters: Vec<Uuid> = room
        .players
        .values()
        .filter(|p| p.id != mafia_id)
        .map(|p| p.id)
        .collect();
    assert_eq!(voters.len(), 4);
    for (i, voter) in voters.iter().enumerate() {
        harness
            .dispatcher
            .cast_vote(room.id, *voter, Uuid::new_v4(), Some(mafia_id), i as i64)
            .await
            .unwrap();
    }

    let room = harness.room(room.id).await;
    let (resolved, effects) = engine::phase::advance(&room, 0);
    assert_eq!(resolved.players[&mafia_id].status, PlayerStatus::Dead);
    assert!(resolved
        .public_narrative
        .iter()
        .any(|n| n.contains("was lynched with 4 votes") && n.contains("They were a mafia.")));
    assert_eq!(resolved.phase, Phase::Ended);
    assert_eq!(resolved.victory_condition, VictoryCondition::TownVictory);
    assert!(effects
        .iter()
        .any(|e| matches!(e, engine::Effect::VictoryReached(VictoryCondition::TownVictory))));
}

/// Scenario 5: a tie at the top of a plurality vote elects no one and
/// the room advances normally back into the night.
#[tokio::test]
async fn tied_plurality_vote_elects_no_one() {
    let harness = Harness::new();
    let host_id = Uuid::new_v4();
    let room = harness
        .dispatcher
        .create_room(host_id, "Host".to_string(), 0)
        .await
        .unwrap();
    for i in 0..3 {
        harness
            .dispatcher
            .join_room(&room.code, Uuid::new_v4(), format!("Player{i}"))
            .await
            .unwrap();
    }
    harness
        .dispatcher
        .configure_room(
            room.id,
            host_id,
            RoomSettings {
                voting_mode: VotingMode::Plurality,
                ..RoomSettings::default()
            },
        )
        .await
        .unwrap();
    let room = harness
        .dispatcher
        .start_game(room.id, host_id, 0)
        .await
        .unwrap();

    let room = harness.advance_n(room, 3, 0).await;
    assert_eq!(room.phase, Phase::DayVoting);

    let ids: Vec<Uuid> = room.players.keys().copied().collect();
    assert_eq!(ids.len(), 4);
    harness
        .dispatcher
        .cast_vote(room.id, ids[0], Uuid::new_v4(), Some(ids[2]), 0)
        .await
        .unwrap();
    harness
        .dispatcher
        .cast_vote(room.id, ids[1], Uuid::new_v4(), Some(ids[3]), 1)
        .await
        .unwrap();

    let room = harness.room(room.id).await;
    let (resolved, _effects) = engine::phase::advance(&room, 0);
    for id in &ids {
        assert_eq!(resolved.players[id].status, PlayerStatus::Alive);
    }
    assert!(resolved
        .public_narrative
        .iter()
        .any(|n| n == "No one was lynched. The town could not reach a decision."));
    assert_eq!(resolved.phase, Phase::Night);
}

/// Scenario 6: resubmitting the same `actionId` after it already
/// committed is idempotent end to end — dedup plus the policy gate
/// together mean exactly one action survives into resolution.
#[tokio::test]
async fn duplicate_action_id_is_idempotent_through_resolution() {
    let harness = Harness::new();
    let room = seated_game(&harness, 4).await;
    let mafia_id = mafia_of(&room);
    let target_id = town_excluding(&room, &[mafia_id]);
    let action_id = Uuid::new_v4();

    harness
        .dispatcher
        .submit_night_action(
            room.id,
            mafia_id,
            action_id,
            NightActionType::Kill,
            Some(target_id),
            0,
        )
        .await
        .unwrap();
    // Reconnect and resubmit the identical actionId.
    harness
        .dispatcher
        .submit_night_action(
            room.id,
            mafia_id,
            action_id,
            NightActionType::Kill,
            Some(target_id),
            0,
        )
        .await
        .unwrap();

    let room = harness.room(room.id).await;
    assert_eq!(room.night_actions.len(), 1);

    let (resolved, _effects) = engine::phase::advance(&room, 0);
    assert_eq!(resolved.players[&target_id].status, PlayerStatus::Dead);
}

/// Victory is re-checked after every resolution, not only at lynch
/// time: a night kill that brings mafia up to parity with the
/// remaining town also ends the game immediately.
#[tokio::test]
async fn mafia_parity_after_a_night_kill_ends_the_game() {
    let harness = Harness::new();
    // 3 players: role_distribution seats 1 mafia against 2 town-aligned
    // players, so a single night kill brings mafia to parity.
    let room = seated_game(&harness, 2).await;
    let mafia_id = mafia_of(&room);
    let target_id = town_excluding(&room, &[mafia_id]);

    harness
        .dispatcher
        .submit_night_action(
            room.id,
            mafia_id,
            Uuid::new_v4(),
            NightActionType::Kill,
            Some(target_id),
            0,
        )
        .await
        .unwrap();

    let room = harness.room(room.id).await;
    let (resolved, effects) = engine::phase::advance(&room, 0);
    assert_eq!(resolved.phase, Phase::Ended);
    assert_eq!(resolved.victory_condition, VictoryCondition::MafiaVictory);
    assert!(resolved.timer.is_none());
    assert!(effects
        .iter()
        .any(|e| matches!(e, engine::Effect::VictoryReached(VictoryCondition::MafiaVictory))));
}
