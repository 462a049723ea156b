//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::session::{PlayerId, PlayerState, Snapshot, Vec3};

/// Messages sent from server to client
///
/// Frames are `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Everyone already connected, sent once on admission
    Players(Snapshot),

    /// Another player was admitted
    PlayerJoined { id: PlayerId, state: PlayerState },

    /// Another player's update was accepted
    #[serde(rename = "playerState")]
    PlayerStateChanged { id: PlayerId, state: PlayerState },

    /// Another player disconnected
    PlayerLeft(PlayerId),

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Messages sent from client to server, as they arrive off the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum RawClientMsg {
    State(RawStateUpdate),
    Ping { t: u64 },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawStateUpdate {
    position: Option<RawVec3>,
    rotation: Option<RawVec3>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct RawVec3 {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

/// A client message that passed boundary validation
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    /// Candidate position/rotation, not yet checked for plausibility
    State(PlayerState),
    Ping { t: u64 },
}

/// Client frame that could not be turned into a well-formed message
#[derive(Debug, thiserror::Error)]
pub enum MalformedUpdate {
    #[error("invalid message: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl ClientMsg {
    /// Parse and validate a text frame in one step
    pub fn parse(text: &str) -> Result<Self, MalformedUpdate> {
        match serde_json::from_str::<RawClientMsg>(text)? {
            RawClientMsg::State(raw) => {
                let position = raw
                    .position
                    .ok_or(MalformedUpdate::MissingField("position"))?
                    .into_vec3("position")?;
                let rotation = raw
                    .rotation
                    .ok_or(MalformedUpdate::MissingField("rotation"))?
                    .into_vec3("rotation")?;
                Ok(ClientMsg::State(PlayerState::new(position, rotation)))
            }
            RawClientMsg::Ping { t } => Ok(ClientMsg::Ping { t }),
        }
    }
}

impl RawVec3 {
    fn into_vec3(self, field: &'static str) -> Result<Vec3, MalformedUpdate> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => Ok(Vec3::new(x, y, z)),
            _ => Err(MalformedUpdate::MissingField(field)),
        }
    }
}
