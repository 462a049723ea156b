//! WebSocket transport

pub mod handler;
pub mod protocol;

pub use handler::ws_handler;
pub use protocol::{ClientMsg, MalformedUpdate, ServerMsg};
