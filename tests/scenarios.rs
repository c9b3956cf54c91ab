//! End-to-end scenarios driven through the sans-IO match state

use std::collections::HashSet;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;

use arena_robots::game::world::BOUNDARY_GRID;
use arena_robots::game::{MatchState, Outbound, PhaseKind, Point, World};
use arena_robots::net::{ClientMsg, Identity, ServerMsg, Will};
use arena_robots::util::time::Timings;

const A: &str = "aaaaaaaaaaaaaaaa";
const B: &str = "bbbbbbbbbbbbbbbb";
const C: &str = "cccccccccccccccc";

fn hello(state: &mut MatchState, who: &str, want: Will) {
    state.handle(
        Identity::from(who),
        ClientMsg::Hello {
            want: Some(want),
            nick: who[..4].to_string(),
        },
    );
}

fn order(state: &mut MatchState, who: &str, target: Option<&str>, move_to: Option<Point>) {
    let turn = state.turn();
    state.handle(
        Identity::from(who),
        ClientMsg::Action {
            turn,
            target: target.map(Identity::from),
            move_to,
        },
    );
}

fn sitreps(outbox: &[Outbound]) -> Vec<(&World, u64)> {
    outbox
        .iter()
        .filter_map(|out| match &out.msg {
            ServerMsg::Sitrep { world, turn } => Some((world, *turn)),
            _ => None,
        })
        .collect()
}

/// Two players registered and the first sitrep already out
fn two_player_game() -> (MatchState, Instant) {
    let t0 = Instant::now();
    let mut state = MatchState::new(Timings::default(), ChaCha8Rng::seed_from_u64(11), t0);
    hello(&mut state, A, Will::Play);
    hello(&mut state, B, Will::Play);
    state.drain_outbox();

    let now = t0 + Duration::from_secs(10);
    state.tick(now);
    state.drain_outbox();
    (state, now)
}

#[test]
fn two_players_start_a_game_with_distinct_boundary_starts() {
    let t0 = Instant::now();
    let mut state = MatchState::new(Timings::default(), ChaCha8Rng::seed_from_u64(5), t0);
    hello(&mut state, A, Will::Play);
    hello(&mut state, B, Will::Play);
    state.drain_outbox();

    state.tick(t0 + Duration::from_secs(10));
    assert_eq!(state.phase(), PhaseKind::Game);

    let outbox = state.drain_outbox();
    let reports = sitreps(&outbox);
    assert_eq!(reports.len(), 1);

    let (world, turn) = reports[0];
    assert_eq!(turn, 1);
    assert_eq!(world.robots.len(), 2);

    let starts: HashSet<Point> = world.robots.values().map(|r| r.move_from).collect();
    assert_eq!(starts.len(), 2);
    assert!(starts.iter().all(|p| BOUNDARY_GRID.contains(p)));
    assert_eq!(
        outbox[0].recipients,
        vec![Identity::from(A), Identity::from(B)]
    );
}

#[test]
fn targeted_robot_loses_exactly_one_shot() {
    let (mut state, mut now) = two_player_game();
    let a = Identity::from(A);
    let b = Identity::from(B);
    let destination = Point::new(400, 300);

    // Turn 1 orders become robot orders when turn 2 is produced...
    order(&mut state, A, Some(B), Some(destination));
    now += Duration::from_secs(1);
    state.tick(now);
    let world = state.world().unwrap();
    assert_eq!(world.robots[&a].target, Some(b.clone()));
    assert_eq!(world.robots[&a].move_to, destination);
    assert_eq!(world.robots[&b].hp, 100);

    // ...and are carried out when turn 3 is produced.
    now += Duration::from_secs(1);
    state.tick(now);
    let world = state.world().unwrap();
    assert_eq!(world.robots[&b].hp, 90);
    assert_eq!(world.robots[&a].target, None);
    assert_eq!(world.robots[&a].move_from, destination);
    assert_eq!(state.turn(), Some(3));
}

#[test]
fn wrecked_robot_leaves_the_sitrep() {
    let t0 = Instant::now();
    let mut state = MatchState::new(Timings::default(), ChaCha8Rng::seed_from_u64(2), t0);
    for who in [A, B, C] {
        hello(&mut state, who, Will::Play);
    }
    let mut now = t0 + Duration::from_secs(10);
    state.tick(now);
    state.drain_outbox();
    let b = Identity::from(B);

    // A and C both shoot B: 20 damage per turn once the orders land.
    let mut wrecked_at = None;
    for _ in 0..10 {
        order(&mut state, A, Some(B), None);
        order(&mut state, C, Some(B), None);
        now += Duration::from_secs(1);
        state.tick(now);

        let outbox = state.drain_outbox();
        let (world, turn) = sitreps(&outbox)[0];
        if world.wrecks.contains_key(&b) {
            assert!(!world.robots.contains_key(&b));
            assert_eq!(world.wrecks[&b].hp, 0);
            wrecked_at = Some(turn);
            break;
        }
        assert!(world.robots.contains_key(&b));
    }
    assert!(wrecked_at.is_some(), "B should have been wrecked");

    // Later reports keep B among the wrecks only.
    order(&mut state, A, Some(B), None);
    now += Duration::from_secs(1);
    state.tick(now);
    let outbox = state.drain_outbox();
    let (world, _) = sitreps(&outbox)[0];
    assert_eq!(world.robots.len(), 2);
    assert!(!world.robots.contains_key(&b));
    assert_eq!(world.wrecks.len(), 1);
}

#[test]
fn latecomer_becomes_spectator() {
    let (mut state, _) = two_player_game();
    hello(&mut state, C, Will::Play);

    let record = state.registry().get(&Identity::from(C)).unwrap();
    assert_eq!(record.will, Will::Spectate);
    assert!(!state.world().unwrap().robots.contains_key(&Identity::from(C)));

    let outbox = state.drain_outbox();
    match &outbox[0].msg {
        ServerMsg::Roster { players } => {
            assert_eq!(players.len(), 3);
            assert_eq!(players[&Identity::from(C)].will, Will::Spectate);
        }
        other => panic!("expected roster, got {other:?}"),
    }
}

#[test]
fn last_robot_standing_ends_the_cycle() {
    let (mut state, mut now) = two_player_game();

    let mut results = None;
    for _ in 0..20 {
        order(&mut state, A, Some(B), None);
        now += Duration::from_secs(1);
        state.tick(now);
        let outbox = state.drain_outbox();
        if let Some(out) = outbox
            .iter()
            .find(|out| matches!(out.msg, ServerMsg::Results { .. }))
        {
            assert!(sitreps(&outbox).is_empty());
            results = Some(out.msg.clone());
            break;
        }
    }

    match results.expect("results broadcast") {
        ServerMsg::Results { world, turn } => {
            assert_eq!(world.robots.len(), 1);
            assert!(world.robots.contains_key(&Identity::from(A)));
            assert_eq!(Some(turn), state.turn());
        }
        other => panic!("expected results, got {other:?}"),
    }
    assert_eq!(state.phase(), PhaseKind::Results);

    // Nothing happens before the results dwell is over.
    state.tick(now + Duration::from_secs(2));
    assert!(state.drain_outbox().is_empty());

    now += Duration::from_secs(3);
    state.tick(now);
    let outbox = state.drain_outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].msg, ServerMsg::End);
    assert_eq!(state.phase(), PhaseKind::Registration);
    assert!(state.registry().is_empty());

    // A fresh registration cycle starts with the next hello.
    hello(&mut state, C, Will::Play);
    let outbox = state.drain_outbox();
    assert_eq!(outbox[0].recipients, vec![Identity::from(C)]);
    match &outbox[0].msg {
        ServerMsg::Roster { players } => {
            assert_eq!(players.len(), 1);
            assert_eq!(players[&Identity::from(C)].will, Will::Play);
        }
        other => panic!("expected roster, got {other:?}"),
    }

    // The new lobby dwell counts from the end of results.
    hello(&mut state, A, Will::Play);
    state.tick(now + Duration::from_secs(9));
    assert_eq!(state.phase(), PhaseKind::Registration);
    state.tick(now + Duration::from_secs(10));
    assert_eq!(state.phase(), PhaseKind::Game);
}
