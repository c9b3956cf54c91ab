//! Player registry - who is connected and what they intend to do

use std::collections::BTreeMap;

use crate::net::protocol::{truncate_nick, Identity, PlayerRecord, Will};

use super::world::START_SLOTS;

/// Registered identities for the current registration/game/results cycle
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    players: BTreeMap<Identity, PlayerRecord>,
    /// Maximum number of active players
    capacity: usize,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::with_capacity(START_SLOTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            players: BTreeMap::new(),
            capacity,
        }
    }

    /// Register or re-register an identity, returns the intent actually stored.
    ///
    /// A missing intent means "play". Players asking to play outside the
    /// registration phase become spectators, as do newcomers once every
    /// starting slot is taken.
    pub fn register(
        &mut self,
        identity: Identity,
        want: Option<Will>,
        nick: &str,
        registration_open: bool,
    ) -> Will {
        let mut will = want.unwrap_or_default();

        if will == Will::Play && !registration_open {
            will = Will::Spectate;
        }

        if registration_open && !self.is_active(&identity) && self.active_count() >= self.capacity
        {
            will = Will::Spectate;
        }

        self.players.insert(
            identity,
            PlayerRecord {
                nick: truncate_nick(nick),
                will,
            },
        );

        will
    }

    pub fn get(&self, identity: &Identity) -> Option<&PlayerRecord> {
        self.players.get(identity)
    }

    pub fn is_active(&self, identity: &Identity) -> bool {
        self.players
            .get(identity)
            .is_some_and(|record| record.will == Will::Play)
    }

    /// Identities that will get a robot
    pub fn active_players(&self) -> impl Iterator<Item = &Identity> + '_ {
        self.players
            .iter()
            .filter(|(_, record)| record.will == Will::Play)
            .map(|(identity, _)| identity)
    }

    pub fn active_count(&self) -> usize {
        self.active_players().count()
    }

    /// Every registered identity, players and spectators alike
    pub fn identities(&self) -> impl Iterator<Item = &Identity> + '_ {
        self.players.keys()
    }

    /// Snapshot of the whole registry for a roster broadcast
    pub fn roster(&self) -> BTreeMap<Identity, PlayerRecord> {
        self.players.clone()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
