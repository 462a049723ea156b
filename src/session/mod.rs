//! Authoritative position-sync session

pub mod coordinator;
pub mod player;
pub mod registry;
pub mod router;
pub mod validator;

pub use coordinator::{
    PlayerView, SessionCommand, SessionCoordinator, SessionError, SessionHandle, UpdateOutcome,
};
pub use player::{Player, PlayerId, PlayerState, Vec3};
pub use registry::{PlayerRegistry, Snapshot};
pub use router::{deliver, BroadcastRouter, Outbox, OUTBOX_CAPACITY};
pub use validator::{MovementLimits, MovementRejection, MovementValidator, MAX_SPEED, WORLD_BOUND};
