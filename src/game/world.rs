//! World simulation engine - arena, robots and turn resolution
//!
//! Both entry points are pure state transitions: [`World::generate`] builds a
//! fresh world for a set of players and [`World::advance_turn`] resolves one
//! turn. Neither reads the clock or touches the network.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::net::protocol::Identity;

use super::combat::{CombatSystem, TurnEvent, ROBOT_DAMAGE, ROBOT_HP};

pub const ARENA_WIDTH: i32 = 1600;
pub const ARENA_HEIGHT: i32 = 900;

/// Spacing between starting slots along an edge
const GRID_STEP: i32 = 50;
/// Distance of the starting slots from the arena edge
const GRID_INSET: i32 = 25;

/// Number of starting slots, which caps the number of active players
pub const START_SLOTS: usize = 2 * ((ARENA_WIDTH - 2 * GRID_STEP) / GRID_STEP) as usize
    + 2 * ((ARENA_HEIGHT - 2 * GRID_STEP) / GRID_STEP) as usize;

/// Starting slots along all four edges of the arena
pub static BOUNDARY_GRID: [Point; START_SLOTS] = boundary_grid();

const fn boundary_grid() -> [Point; START_SLOTS] {
    let mut grid = [Point::new(0, 0); START_SLOTS];
    let mut i = 0;

    let mut x = GRID_STEP;
    while x < ARENA_WIDTH - GRID_STEP {
        grid[i] = Point::new(x + GRID_INSET, GRID_INSET);
        grid[i + 1] = Point::new(x + GRID_INSET, ARENA_HEIGHT - GRID_INSET);
        i += 2;
        x += GRID_STEP;
    }

    let mut y = GRID_STEP;
    while y < ARENA_HEIGHT - GRID_STEP {
        grid[i] = Point::new(GRID_INSET, y + GRID_INSET);
        grid[i + 1] = Point::new(ARENA_WIDTH - GRID_INSET, y + GRID_INSET);
        i += 2;
        y += GRID_STEP;
    }

    grid
}

/// Integer arena coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Pull the point inside the arena bounds
    pub fn clamp_to_arena(self) -> Self {
        Self {
            x: self.x.clamp(0, ARENA_WIDTH),
            y: self.y.clamp(0, ARENA_HEIGHT),
        }
    }
}

/// Arena dimensions (fixed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arena {
    pub width: i32,
    pub height: i32,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
        }
    }
}

/// One player's robot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Robot {
    pub owner: Identity,
    /// Position at the start of the current turn
    pub move_from: Point,
    /// Destination reached when the turn resolves
    pub move_to: Point,
    pub hp: i32,
    pub damage: i32,
    /// Robot to shoot when the turn resolves
    pub target: Option<Identity>,
}

impl Robot {
    pub fn spawn(owner: Identity, start: Point) -> Self {
        Self {
            owner,
            move_from: start,
            move_to: start,
            hp: ROBOT_HP,
            damage: ROBOT_DAMAGE,
            target: None,
        }
    }
}

/// Orders for one robot, applied by the next turn resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Action {
    pub target: Option<Identity>,
    pub move_to: Option<Point>,
}

/// Errors building a world
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("{players} players exceed the {slots} starting slots")]
    TooManyPlayers { players: usize, slots: usize },
}

/// Complete game state broadcast to every client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub arena: Arena,
    pub robots: BTreeMap<Identity, Robot>,
    pub wrecks: BTreeMap<Identity, Robot>,
}

impl World {
    /// Create a world with one robot per player, each on its own boundary slot
    pub fn generate<'a, R>(
        players: impl IntoIterator<Item = &'a Identity>,
        rng: &mut R,
    ) -> Result<Self, WorldError>
    where
        R: Rng + ?Sized,
    {
        let players: Vec<&Identity> = players.into_iter().collect();
        if players.len() > BOUNDARY_GRID.len() {
            return Err(WorldError::TooManyPlayers {
                players: players.len(),
                slots: BOUNDARY_GRID.len(),
            });
        }

        let starts: Vec<Point> = BOUNDARY_GRID
            .choose_multiple(rng, players.len())
            .copied()
            .collect();

        let robots = players
            .into_iter()
            .zip(starts)
            .map(|(owner, start)| (owner.clone(), Robot::spawn(owner.clone(), start)))
            .collect();

        Ok(Self {
            arena: Arena::default(),
            robots,
            wrecks: BTreeMap::new(),
        })
    }

    /// Resolve one turn.
    ///
    /// Every robot first commits its move and fires at its target, all
    /// against the robot set as it stood when the turn began. Robots out of
    /// hit points are then moved to `wrecks`. Finally the pending actions
    /// become the surviving robots' orders for the next turn; actions for
    /// identities without a robot are dropped.
    pub fn advance_turn(&mut self, actions: &BTreeMap<Identity, Action>) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        let mut shots = Vec::new();

        for robot in self.robots.values_mut() {
            robot.move_from = robot.move_to;
            if let Some(target) = robot.target.take() {
                shots.push((robot.owner.clone(), target, robot.damage));
            }
        }

        for (shooter, target, damage) in shots {
            if let Some(victim) = self.robots.get_mut(&target) {
                let (hp_left, _) = CombatSystem::apply_damage(victim.hp, damage);
                victim.hp = hp_left;
                events.push(TurnEvent::Hit {
                    shooter,
                    target,
                    damage,
                    hp_left,
                });
            }
        }

        let wrecked: Vec<Identity> = self
            .robots
            .iter()
            .filter(|(_, robot)| CombatSystem::is_wrecked(robot.hp))
            .map(|(owner, _)| owner.clone())
            .collect();

        for owner in wrecked {
            if let Some(robot) = self.robots.remove(&owner) {
                self.wrecks.insert(owner.clone(), robot);
                events.push(TurnEvent::Wrecked { owner });
            }
        }

        for (owner, action) in actions {
            if let Some(robot) = self.robots.get_mut(owner) {
                robot.move_to = action
                    .move_to
                    .map(Point::clamp_to_arena)
                    .unwrap_or(robot.move_from);
                robot.target = action.target.clone().filter(|target| target != owner);
            }
        }

        events
    }

    /// Robots still fighting
    pub fn alive_count(&self) -> usize {
        self.robots.len()
    }
}
