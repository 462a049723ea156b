//! Application state shared across routes

use std::sync::Arc;

use crate::auth::{ConnectionGate, JwtVerifier};
use crate::config::Config;
use crate::session::{SessionCoordinator, SessionHandle};
use crate::store::AccountStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gate: ConnectionGate,
    pub accounts: AccountStore,
    pub session: SessionHandle,
}

impl AppState {
    /// Wire up state and spawn the session coordinator (requires a runtime)
    pub fn new(config: Config, accounts: AccountStore) -> Self {
        let config = Arc::new(config);

        // Tokens we issue are the credentials the gate accepts
        let gate = ConnectionGate::new(JwtVerifier::new(config.jwt_secret.clone()));

        let session = SessionCoordinator::spawn(config.movement);

        Self {
            config,
            gate,
            accounts,
            session,
        }
    }
}
