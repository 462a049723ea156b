//! Ship sync server library.
//!
//! Authoritative position synchronization for multiplayer ship sessions:
//! authenticated WebSocket connections submit movement, the session
//! coordinator validates and commits it, and peers receive the result.

pub mod app;
pub mod auth;
pub mod config;
pub mod http;
pub mod session;
pub mod store;
pub mod util;
pub mod ws;
