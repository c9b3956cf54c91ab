//! Combat system - hit points, damage, wrecking

use crate::net::protocol::Identity;

/// Hit points every robot starts a game with
pub const ROBOT_HP: i32 = 100;

/// Damage dealt by one shot
pub const ROBOT_DAMAGE: i32 = 10;

/// Combat rules applied during turn resolution
pub struct CombatSystem;

impl CombatSystem {
    /// Apply damage to hit points, returns (new_hp, is_wrecked).
    /// Hit points may go negative; they are reported as-is.
    pub fn apply_damage(hp: i32, damage: i32) -> (i32, bool) {
        let hp = hp - damage;
        (hp, Self::is_wrecked(hp))
    }

    pub fn is_wrecked(hp: i32) -> bool {
        hp <= 0
    }
}

/// Something that happened while a turn was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// A robot hit its target
    Hit {
        shooter: Identity,
        target: Identity,
        damage: i32,
        hp_left: i32,
    },

    /// A robot ran out of hit points and became a wreck
    Wrecked { owner: Identity },
}
