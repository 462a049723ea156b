//! Fan-out of session events to connection outboxes

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::ws::protocol::ServerMsg;

use super::player::{PlayerId, PlayerState};
use super::registry::Snapshot;

/// Server -> client queue for one connection, drained by its writer task
pub type Outbox = mpsc::Sender<ServerMsg>;

/// Per-connection outbox capacity
pub const OUTBOX_CAPACITY: usize = 256;

/// Routes messages to connected peers. Every send is fire-and-forget: a full
/// or closed outbox loses the message for that peer only.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    outboxes: HashMap<PlayerId, Outbox>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, id: PlayerId, outbox: Outbox) {
        self.outboxes.insert(id, outbox);
    }

    pub fn detach(&mut self, id: &PlayerId) {
        self.outboxes.remove(id);
    }

    pub fn unicast_snapshot(&self, id: PlayerId, snapshot: Snapshot) {
        self.unicast(id, ServerMsg::Players(snapshot));
    }

    pub fn unicast(&self, id: PlayerId, msg: ServerMsg) {
        if let Some(outbox) = self.outboxes.get(&id) {
            deliver(id, outbox, msg);
        }
    }

    pub fn broadcast_join(&self, id: PlayerId, state: PlayerState) {
        self.broadcast_excluding(id, ServerMsg::PlayerJoined { id, state });
    }

    pub fn broadcast_state_change(&self, id: PlayerId, state: PlayerState) {
        self.broadcast_excluding(id, ServerMsg::PlayerStateChanged { id, state });
    }

    pub fn broadcast_leave(&self, id: PlayerId) {
        self.broadcast_excluding(id, ServerMsg::PlayerLeft(id));
    }

    fn broadcast_excluding(&self, excluded: PlayerId, msg: ServerMsg) {
        for (peer, outbox) in self.outboxes.iter().filter(|(peer, _)| **peer != excluded) {
            deliver(*peer, outbox, msg.clone());
        }
    }
}

/// Queue `msg` on one outbox without waiting; returns whether it was queued
pub fn deliver(peer: PlayerId, outbox: &Outbox, msg: ServerMsg) -> bool {
    match outbox.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(player_id = %peer, "Outbox full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(player_id = %peer, "Outbox closed, dropping message");
            false
        }
    }
}
