//! Session coordinator: the single owner of the player registry
//!
//! Connection handlers never touch the registry directly. They send commands
//! over one channel, and the coordinator task applies them one at a time, so
//! every registry mutation (and every event for a given player) is
//! serialized. Per-connection order is preserved because each connection
//! sends its commands sequentially on the same channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::player::{Player, PlayerId, PlayerState};
use super::registry::PlayerRegistry;
use super::router::{BroadcastRouter, Outbox};
use super::validator::{MovementLimits, MovementRejection, MovementValidator};

/// Coordinator command queue capacity
pub const COMMAND_CAPACITY: usize = 1024;

/// Commands accepted by the coordinator task
#[derive(Debug)]
pub enum SessionCommand {
    /// Admit an authenticated connection
    Join {
        id: PlayerId,
        identity: String,
        outbox: Outbox,
        received_at: Instant,
    },
    /// Candidate movement update from a connected player
    State {
        id: PlayerId,
        state: PlayerState,
        received_at: Instant,
    },
    /// Connection closed
    Leave { id: PlayerId },
    GetPlayer {
        id: PlayerId,
        respond: oneshot::Sender<Option<PlayerView>>,
    },
    ListPlayers {
        respond: oneshot::Sender<Vec<PlayerView>>,
    },
}

/// Read-only view of a registry entry for queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub identity: String,
    pub state: PlayerState,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            identity: player.identity.clone(),
            state: player.state,
        }
    }
}

/// What happened to a submitted state update. Never sent to the client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOutcome {
    Accepted,
    Rejected(MovementRejection),
    UnknownConnection,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session coordinator is not running")]
    CoordinatorClosed,
}

/// Cloneable handle used by connection handlers and HTTP routes
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    player_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    /// Number of registered players (lock-free, may lag by one command)
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub async fn join(
        &self,
        id: PlayerId,
        identity: String,
        outbox: Outbox,
        received_at: Instant,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::Join {
            id,
            identity,
            outbox,
            received_at,
        })
        .await
    }

    pub async fn submit_state(
        &self,
        id: PlayerId,
        state: PlayerState,
        received_at: Instant,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::State {
            id,
            state,
            received_at,
        })
        .await
    }

    pub async fn leave(&self, id: PlayerId) -> Result<(), SessionError> {
        self.send(SessionCommand::Leave { id }).await
    }

    pub async fn get_player(&self, id: PlayerId) -> Result<Option<PlayerView>, SessionError> {
        let (respond, rx) = oneshot::channel();
        self.send(SessionCommand::GetPlayer { id, respond }).await?;
        rx.await.map_err(|_| SessionError::CoordinatorClosed)
    }

    pub async fn list_players(&self) -> Result<Vec<PlayerView>, SessionError> {
        let (respond, rx) = oneshot::channel();
        self.send(SessionCommand::ListPlayers { respond }).await?;
        rx.await.map_err(|_| SessionError::CoordinatorClosed)
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::CoordinatorClosed)
    }
}

/// The authoritative session
pub struct SessionCoordinator {
    registry: PlayerRegistry,
    router: BroadcastRouter,
    validator: MovementValidator,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    player_count: Arc<AtomicUsize>,
}

impl SessionCoordinator {
    pub fn new(limits: MovementLimits) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = SessionHandle {
            cmd_tx,
            player_count: player_count.clone(),
        };

        let coordinator = Self {
            registry: PlayerRegistry::new(),
            router: BroadcastRouter::new(),
            validator: MovementValidator::new(limits),
            cmd_rx,
            player_count,
        };

        (coordinator, handle)
    }

    /// Spawn the coordinator onto the runtime and return its handle
    pub fn spawn(limits: MovementLimits) -> SessionHandle {
        let (coordinator, handle) = Self::new(limits);
        tokio::spawn(coordinator.run());
        handle
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        info!(
            max_speed = self.validator.limits().max_speed,
            world_bound = self.validator.limits().world_bound,
            "Session coordinator started"
        );

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle(cmd);
        }

        info!("Session coordinator stopped");
    }

    fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Join {
                id,
                identity,
                outbox,
                received_at,
            } => self.join(id, identity, outbox, received_at),
            SessionCommand::State {
                id,
                state,
                received_at,
            } => {
                self.submit_state(id, state, received_at);
            }
            SessionCommand::Leave { id } => {
                self.leave(id);
            }
            SessionCommand::GetPlayer { id, respond } => {
                let _ = respond.send(self.player(&id));
            }
            SessionCommand::ListPlayers { respond } => {
                let _ = respond.send(self.players());
            }
        }
    }

    /// Register a player, send them the snapshot and announce them to peers
    pub fn join(&mut self, id: PlayerId, identity: String, outbox: Outbox, now: Instant) {
        if self.registry.get(&id).is_some() {
            warn!(player_id = %id, "Player already registered");
            return;
        }

        let snapshot = self.registry.add(id, identity.clone(), now);
        self.sync_count();

        self.router.attach(id, outbox);
        self.router.unicast_snapshot(id, snapshot);
        self.router.broadcast_join(id, PlayerState::ORIGIN);

        info!(
            player_id = %id,
            identity = %identity,
            player_count = self.registry.len(),
            "Player joined session"
        );
    }

    /// Validate and, if plausible, commit and broadcast a movement update
    pub fn submit_state(&mut self, id: PlayerId, state: PlayerState, now: Instant) -> UpdateOutcome {
        let Some(previous) = self.registry.get(&id) else {
            debug!(player_id = %id, "State update for unknown connection");
            return UpdateOutcome::UnknownConnection;
        };

        if let Err(rejection) = self.validator.validate(previous, &state, now) {
            debug!(player_id = %id, reason = %rejection, "Dropped movement update");
            return UpdateOutcome::Rejected(rejection);
        }

        self.registry.update(&id, state, now);
        self.router.broadcast_state_change(id, state);
        UpdateOutcome::Accepted
    }

    /// Remove a player; announces the departure only if they were registered
    pub fn leave(&mut self, id: PlayerId) -> bool {
        self.router.detach(&id);

        match self.registry.remove(&id) {
            Some(player) => {
                self.sync_count();
                self.router.broadcast_leave(id);
                info!(
                    player_id = %id,
                    identity = %player.identity,
                    player_count = self.registry.len(),
                    "Player left session"
                );
                true
            }
            None => false,
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<PlayerView> {
        self.registry.get(id).map(PlayerView::from)
    }

    pub fn players(&self) -> Vec<PlayerView> {
        self.registry.iter().map(PlayerView::from).collect()
    }

    fn sync_count(&self) {
        self.player_count.store(self.registry.len(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::player::Vec3;
    use crate::session::registry::Snapshot;
    use crate::ws::protocol::ServerMsg;
    use std::time::Duration;

    struct Peer {
        id: PlayerId,
        rx: mpsc::Receiver<ServerMsg>,
    }

    impl Peer {
        fn next(&mut self) -> ServerMsg {
            self.rx.try_recv().expect("expected a message")
        }

        fn assert_silent(&mut self) {
            assert!(self.rx.try_recv().is_err(), "unexpected message");
        }
    }

    fn coordinator() -> SessionCoordinator {
        SessionCoordinator::new(MovementLimits::default()).0
    }

    fn connect(coordinator: &mut SessionCoordinator, identity: &str, at: Instant) -> Peer {
        let id = PlayerId::new();
        let (tx, rx) = mpsc::channel(64);
        coordinator.join(id, identity.to_string(), tx, at);
        Peer { id, rx }
    }

    fn state(x: f64, y: f64, z: f64) -> PlayerState {
        PlayerState::new(Vec3::new(x, y, z), Vec3::ZERO)
    }

    #[test]
    fn session_walkthrough() {
        let mut session = coordinator();
        let t0 = Instant::now();

        // A connects to an empty session
        let mut a = connect(&mut session, "A", t0);
        assert_eq!(a.next(), ServerMsg::Players(Snapshot::new()));
        assert_eq!(session.player(&a.id).unwrap().state, PlayerState::ORIGIN);

        // B connects and sees A at the origin; A hears about B
        let mut b = connect(&mut session, "B", t0);
        let mut expected = Snapshot::new();
        expected.insert(a.id, PlayerState::ORIGIN);
        assert_eq!(b.next(), ServerMsg::Players(expected));
        assert_eq!(
            a.next(),
            ServerMsg::PlayerJoined {
                id: b.id,
                state: PlayerState::ORIGIN
            }
        );

        // A moves 5 units in 1s
        let t1 = t0 + Duration::from_secs(1);
        let moved = state(5.0, 0.0, 0.0);
        assert_eq!(session.submit_state(a.id, moved, t1), UpdateOutcome::Accepted);
        assert_eq!(
            b.next(),
            ServerMsg::PlayerStateChanged {
                id: a.id,
                state: moved
            }
        );
        a.assert_silent();

        // A tries to jump to x=500 0.1s later
        let t2 = t1 + Duration::from_millis(100);
        assert!(matches!(
            session.submit_state(a.id, state(500.0, 0.0, 0.0), t2),
            UpdateOutcome::Rejected(MovementRejection::TooFast { .. })
        ));
        assert_eq!(session.player(&a.id).unwrap().state, moved);
        b.assert_silent();

        // A tries to leave the world 1s later
        let t3 = t2 + Duration::from_secs(1);
        assert_eq!(
            session.submit_state(a.id, state(1500.0, 0.0, 0.0), t3),
            UpdateOutcome::Rejected(MovementRejection::OutOfBounds)
        );
        assert_eq!(session.player(&a.id).unwrap().state, moved);
        b.assert_silent();

        // A disconnects
        assert!(session.leave(a.id));
        assert_eq!(b.next(), ServerMsg::PlayerLeft(a.id));
        b.assert_silent();
        assert!(session.player(&a.id).is_none());
    }

    #[test]
    fn out_of_bounds_rejected_regardless_of_elapsed_time() {
        let mut session = coordinator();
        let t0 = Instant::now();
        let a = connect(&mut session, "A", t0);

        let outcome = session.submit_state(a.id, state(0.0, 0.0, 1000.1), t0 + Duration::from_secs(86_400));
        assert_eq!(outcome, UpdateOutcome::Rejected(MovementRejection::OutOfBounds));
        assert_eq!(session.player(&a.id).unwrap().state, PlayerState::ORIGIN);
    }

    #[test]
    fn fast_first_move_is_measured_from_spawn() {
        let mut session = coordinator();
        let t0 = Instant::now();
        let a = connect(&mut session, "A", t0);

        let outcome = session.submit_state(a.id, state(20.0, 0.0, 0.0), t0 + Duration::from_secs(1));
        assert!(matches!(outcome, UpdateOutcome::Rejected(MovementRejection::TooFast { .. })));
    }

    #[test]
    fn accepted_update_is_stored_verbatim() {
        let mut session = coordinator();
        let t0 = Instant::now();
        let a = connect(&mut session, "A", t0);

        let submitted = PlayerState::new(Vec3::new(1.25, -2.5, 3.0), Vec3::new(0.1, -0.2, 3.3));
        let outcome = session.submit_state(a.id, submitted, t0 + Duration::from_secs(1));
        assert_eq!(outcome, UpdateOutcome::Accepted);
        assert_eq!(session.player(&a.id).unwrap().state, submitted);
    }

    #[test]
    fn duplicate_delivery_is_rejected() {
        let mut session = coordinator();
        let t0 = Instant::now();
        let a = connect(&mut session, "A", t0);
        let t1 = t0 + Duration::from_secs(1);

        assert_eq!(session.submit_state(a.id, state(1.0, 0.0, 0.0), t1), UpdateOutcome::Accepted);
        assert_eq!(
            session.submit_state(a.id, state(1.0, 0.0, 0.0), t1),
            UpdateOutcome::Rejected(MovementRejection::NonIncreasingTime)
        );
    }

    #[test]
    fn second_leave_is_silent() {
        let mut session = coordinator();
        let t0 = Instant::now();
        let a = connect(&mut session, "A", t0);
        let mut b = connect(&mut session, "B", t0);
        b.next();

        assert!(session.leave(a.id));
        assert!(!session.leave(a.id));
        assert_eq!(b.next(), ServerMsg::PlayerLeft(a.id));
        b.assert_silent();
    }

    #[test]
    fn updates_after_leave_are_unknown() {
        let mut session = coordinator();
        let t0 = Instant::now();
        let a = connect(&mut session, "A", t0);
        let mut b = connect(&mut session, "B", t0);
        b.next();
        session.leave(a.id);
        b.next();

        let outcome = session.submit_state(a.id, state(1.0, 0.0, 0.0), t0 + Duration::from_secs(1));
        assert_eq!(outcome, UpdateOutcome::UnknownConnection);
        assert!(session.player(&a.id).is_none());
        b.assert_silent();
    }

    #[test]
    fn back_to_back_joins_get_consistent_snapshots() {
        let mut session = coordinator();
        let t0 = Instant::now();
        let mut peers: Vec<Peer> = (0..5).map(|i| connect(&mut session, &format!("p{i}"), t0)).collect();

        for (index, peer) in peers.iter_mut().enumerate() {
            match peer.next() {
                ServerMsg::Players(snapshot) => {
                    assert_eq!(snapshot.len(), index);
                    assert!(!snapshot.contains_key(&peer.id));
                }
                other => panic!("expected snapshot, got {:?}", other),
            }
        }
        assert_eq!(session.players().len(), 5);
    }

    #[tokio::test]
    async fn handle_round_trip_through_task() {
        let handle = SessionCoordinator::spawn(MovementLimits::default());
        let id = PlayerId::new();
        let (tx, mut rx) = mpsc::channel(8);
        let t0 = Instant::now();

        handle.join(id, "pilot".into(), tx, t0).await.unwrap();
        assert_eq!(rx.recv().await, Some(ServerMsg::Players(Snapshot::new())));

        handle
            .submit_state(id, state(2.0, 0.0, 0.0), t0 + Duration::from_secs(1))
            .await
            .unwrap();

        let view = handle.get_player(id).await.unwrap().unwrap();
        assert_eq!(view.identity, "pilot");
        assert_eq!(view.state, state(2.0, 0.0, 0.0));
        assert_eq!(handle.player_count(), 1);

        handle.leave(id).await.unwrap();
        assert_eq!(handle.get_player(id).await.unwrap(), None);
        assert!(handle.list_players().await.unwrap().is_empty());
        assert_eq!(handle.player_count(), 0);
    }
}
