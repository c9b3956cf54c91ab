//! Match state and the registration/game/results phase machine
//!
//! [`MatchState`] is sans-IO: the dispatch loop feeds it the current instant
//! through [`MatchState::tick`] and decoded messages through
//! [`MatchState::handle`], then drains the broadcasts it queued.

use std::collections::BTreeMap;
use std::fmt;

use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::net::protocol::{ClientMsg, Identity, ServerMsg, Will};
use crate::util::time::Timings;

use super::combat::TurnEvent;
use super::registry::PlayerRegistry;
use super::world::{Action, Point, World};

/// Active players needed before a game may start
pub const MIN_PLAYERS: usize = 2;

/// Which phase is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Registration,
    Game,
    Results,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Registration => "registration",
            Self::Game => "game",
            Self::Results => "results",
        })
    }
}

/// A game in progress
#[derive(Debug, Clone)]
pub struct GameRound {
    pub turn: u64,
    /// Start of the current turn; `None` makes the next tick resolve at once
    pub turn_started: Option<Instant>,
    pub world: World,
    /// Orders received for the current turn, at most one per robot owner
    pub actions: BTreeMap<Identity, Action>,
}

/// Final state of a finished game
#[derive(Debug, Clone)]
pub struct Finale {
    pub since: Instant,
    pub turn: u64,
    pub world: World,
}

/// Current phase plus the data that only exists during it
#[derive(Debug, Clone)]
pub enum Phase {
    Registration { since: Instant },
    Game(GameRound),
    Results(Finale),
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Self::Registration { .. } => PhaseKind::Registration,
            Self::Game(_) => PhaseKind::Game,
            Self::Results(_) => PhaseKind::Results,
        }
    }
}

/// A message queued for a set of recipients
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub recipients: Vec<Identity>,
    pub msg: ServerMsg,
}

/// Authoritative state of the single game this server runs
pub struct MatchState {
    phase: Phase,
    registry: PlayerRegistry,
    timings: Timings,
    rng: ChaCha8Rng,
    outbox: Vec<Outbound>,
}

impl MatchState {
    /// Create the state with registration open since `now`
    pub fn new(timings: Timings, rng: ChaCha8Rng, now: Instant) -> Self {
        let mut state = Self {
            phase: Phase::Registration { since: now },
            registry: PlayerRegistry::new(),
            timings,
            rng,
            outbox: Vec::new(),
        };
        state.begin_registration(now);
        state
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase.kind()
    }

    pub fn phase_state(&self) -> &Phase {
        &self.phase
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// World of the running or just finished game
    pub fn world(&self) -> Option<&World> {
        match &self.phase {
            Phase::Game(round) => Some(&round.world),
            Phase::Results(finale) => Some(&finale.world),
            Phase::Registration { .. } => None,
        }
    }

    pub fn turn(&self) -> Option<u64> {
        match &self.phase {
            Phase::Game(round) => Some(round.turn),
            Phase::Results(finale) => Some(finale.turn),
            Phase::Registration { .. } => None,
        }
    }

    pub fn pending_actions(&self) -> Option<&BTreeMap<Identity, Action>> {
        match &self.phase {
            Phase::Game(round) => Some(&round.actions),
            _ => None,
        }
    }

    /// Take every message queued since the last drain
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Run the current phase's time-based logic. Never blocks.
    pub fn tick(&mut self, now: Instant) {
        match self.phase.kind() {
            PhaseKind::Registration => self.tick_registration(now),
            PhaseKind::Game => self.tick_game(now),
            PhaseKind::Results => self.tick_results(now),
        }
    }

    /// Route a decoded client message to its handler
    pub fn handle(&mut self, sender: Identity, msg: ClientMsg) {
        match msg {
            ClientMsg::Hello { want, nick } => self.on_hello(sender, want, &nick),
            ClientMsg::Action {
                turn,
                target,
                move_to,
            } => self.on_action(sender, turn, target, move_to),
        }
    }

    fn broadcast(&mut self, msg: ServerMsg) {
        let recipients: Vec<Identity> = self.registry.identities().cloned().collect();
        if recipients.is_empty() {
            return;
        }
        self.outbox.push(Outbound { recipients, msg });
    }

    fn begin_registration(&mut self, now: Instant) {
        self.registry.clear();
        self.phase = Phase::Registration { since: now };
        info!(phase = %PhaseKind::Registration, "Registration open");
    }

    fn tick_registration(&mut self, now: Instant) {
        let Phase::Registration { since } = &self.phase else {
            return;
        };

        if now < *since + self.timings.registration {
            return;
        }

        if self.registry.active_count() >= MIN_PLAYERS {
            self.begin_game(now);
        }
    }

    fn on_hello(&mut self, sender: Identity, want: Option<Will>, nick: &str) {
        let registration_open = self.phase.kind() == PhaseKind::Registration;
        let will = self
            .registry
            .register(sender.clone(), want, nick, registration_open);

        info!(
            identity = %sender,
            ?want,
            ?will,
            players = self.registry.len(),
            "Player registered"
        );

        let roster = ServerMsg::Roster {
            players: self.registry.roster(),
        };
        self.broadcast(roster);
    }

    fn begin_game(&mut self, now: Instant) {
        let world = match World::generate(self.registry.active_players(), &mut self.rng) {
            Ok(world) => world,
            Err(e) => {
                error!(error = %e, "Failed to generate world, staying in registration");
                return;
            }
        };

        info!(
            phase = %PhaseKind::Game,
            robots = world.alive_count(),
            "Game started"
        );

        self.phase = Phase::Game(GameRound {
            turn: 0,
            turn_started: None,
            world,
            actions: BTreeMap::new(),
        });

        // Kick off the first turn.
        self.tick_game(now);
    }

    fn tick_game(&mut self, now: Instant) {
        let Phase::Game(round) = &mut self.phase else {
            return;
        };

        if let Some(started) = round.turn_started {
            if now < started + self.timings.turn {
                return;
            }
        }

        let actions = std::mem::take(&mut round.actions);
        for event in round.world.advance_turn(&actions) {
            log_turn_event(round.turn, &event);
        }

        if round.world.alive_count() <= 1 {
            self.begin_results(now);
            return;
        }

        round.turn += 1;
        round.turn_started = Some(now);
        debug!(turn = round.turn, robots = round.world.alive_count(), "Turn resolved");

        let sitrep = ServerMsg::Sitrep {
            world: round.world.clone(),
            turn: round.turn,
        };
        self.broadcast(sitrep);
    }

    fn on_action(
        &mut self,
        sender: Identity,
        turn: Option<u64>,
        target: Option<Identity>,
        move_to: Option<Point>,
    ) {
        let Phase::Game(round) = &mut self.phase else {
            return;
        };

        // Only players with robots can post their actions.
        if !round.world.robots.contains_key(&sender) {
            return;
        }

        // Orders are only taken for the current turn.
        if turn != Some(round.turn) {
            return;
        }

        let target = target
            .filter(|target| *target != sender && round.world.robots.contains_key(target));

        round.actions.insert(
            sender,
            Action {
                target,
                move_to: move_to.map(Point::clamp_to_arena),
            },
        );
    }

    fn begin_results(&mut self, now: Instant) {
        match std::mem::replace(&mut self.phase, Phase::Registration { since: now }) {
            Phase::Game(round) => {
                let winner = round.world.robots.keys().next().cloned();
                info!(
                    phase = %PhaseKind::Results,
                    turn = round.turn,
                    winner = ?winner,
                    wrecks = round.world.wrecks.len(),
                    "Game over"
                );

                let results = ServerMsg::Results {
                    world: round.world.clone(),
                    turn: round.turn,
                };
                self.phase = Phase::Results(Finale {
                    since: now,
                    turn: round.turn,
                    world: round.world,
                });
                self.broadcast(results);
            }
            other => self.phase = other,
        }
    }

    fn tick_results(&mut self, now: Instant) {
        let Phase::Results(finale) = &self.phase else {
            return;
        };

        if now < finale.since + self.timings.results {
            return;
        }

        self.broadcast(ServerMsg::End);
        self.begin_registration(now);
    }
}

fn log_turn_event(turn: u64, event: &TurnEvent) {
    match event {
        TurnEvent::Hit {
            shooter,
            target,
            damage,
            hp_left,
        } => debug!(turn, shooter = %shooter, target = %target, damage, hp_left, "Robot hit"),
        TurnEvent::Wrecked { owner } => info!(turn, identity = %owner, "Robot wrecked"),
    }
}
