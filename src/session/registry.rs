//! Registry of live players
//!
//! Owned by the session coordinator task; nothing else holds a reference, so
//! every read is a consistent point-in-time view.

use std::collections::HashMap;

use tokio::time::Instant;

use super::player::{Player, PlayerId, PlayerState};

/// Point-in-time copy of every registered player except the requester
pub type Snapshot = HashMap<PlayerId, PlayerState>;

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a player at the origin and return a snapshot of everyone else
    pub fn add(&mut self, id: PlayerId, identity: String, now: Instant) -> Snapshot {
        let snapshot = self
            .players
            .values()
            .filter(|p| p.id != id)
            .map(|p| (p.id, p.state))
            .collect();

        self.players.insert(id, Player::spawn(id, identity, now));
        snapshot
    }

    /// Remove a player. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &PlayerId) -> Option<Player> {
        self.players.remove(id)
    }

    /// Replace state and timestamp. Returns false if the id is not present.
    pub fn update(&mut self, id: &PlayerId, state: PlayerState, now: Instant) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.state = state;
                player.last_update = now;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
