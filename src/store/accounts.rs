//! Account store backing credential issuance
//!
//! Accounts live in a `DashMap` and are written through to a JSON file after
//! every registration. A missing or unreadable file starts an empty store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Stored account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    /// Hex SHA-256 digest of the password
    #[serde(rename = "password")]
    pub password_hash: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("username and password required")]
    MissingCredentials,

    #[error("User already exists")]
    AlreadyExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Failed to persist accounts: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode accounts: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Account store operations
#[derive(Clone)]
pub struct AccountStore {
    accounts: Arc<DashMap<String, Account>>,
    path: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl AccountStore {
    /// Store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(DashMap::new()),
            path: None,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load accounts from `path`, starting empty if it cannot be read
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let accounts = DashMap::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<Account>>(&bytes) {
                Ok(list) => {
                    for account in list {
                        accounts.insert(account.username.clone(), account);
                    }
                    info!(path = %path.display(), count = accounts.len(), "Loaded accounts");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable accounts file, starting empty");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read accounts file, starting empty");
            }
        }

        Self {
            accounts: Arc::new(accounts),
            path: Some(path),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create an account
    pub async fn register(&self, username: &str, password: &str) -> Result<(), AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingCredentials);
        }

        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => return Err(AccountError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(Account {
                    username: username.to_string(),
                    password_hash: hash_password(password),
                    created_at: Utc::now(),
                });
            }
        }

        // An account that never reached disk must not stay live
        if let Err(e) = self.persist().await {
            self.accounts.remove(username);
            return Err(e);
        }
        Ok(())
    }

    /// Check a username/password pair
    pub fn authenticate(&self, username: &str, password: &str) -> Result<(), AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingCredentials);
        }

        let account = self
            .accounts
            .get(username)
            .ok_or(AccountError::InvalidCredentials)?;

        if account.password_hash != hash_password(password) {
            return Err(AccountError::InvalidCredentials);
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    async fn persist(&self) -> Result<(), AccountError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Snapshot under the lock so a slower writer cannot overwrite newer data
        let _guard = self.write_lock.lock().await;
        let mut list: Vec<Account> = self.accounts.iter().map(|a| a.value().clone()).collect();
        list.sort_by(|a, b| a.username.cmp(&b.username));

        let json = serde_json::to_vec_pretty(&list)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

/// Hex-encoded SHA-256 of a password
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
