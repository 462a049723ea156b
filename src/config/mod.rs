//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::session::{MovementLimits, MAX_SPEED, WORLD_BOUND};
use crate::util::rate_limit::INPUT_RATE_LIMIT;

/// Secret used when JWT_SECRET is unset; fine for local play only
pub const DEV_JWT_SECRET: &str = "dev-secret";

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,

    /// HS256 secret for issuing and verifying session tokens
    pub jwt_secret: String,
    /// Lifetime of issued tokens
    pub token_ttl_secs: u64,
    /// JSON file holding registered accounts
    pub users_file: PathBuf,

    /// Allowed client origins for CORS; empty means any origin
    pub client_origins: Vec<String>,

    /// Movement validation limits
    pub movement: MovementLimits,
    /// Max inbound messages per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when both are set
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
        };

        let client_origins = env::var("CLIENT_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let movement = MovementLimits {
            max_speed: parse_or("MAX_SPEED", MAX_SPEED)?,
            world_bound: parse_or("WORLD_BOUND", WORLD_BOUND)?,
        };
        if !(movement.max_speed > 0.0 && movement.world_bound > 0.0) {
            return Err(ConfigError::Invalid("MAX_SPEED/WORLD_BOUND"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,

            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string()),
            token_ttl_secs: parse_or("TOKEN_TTL_SECS", 3600)?,
            users_file: env::var("USERS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("users.json")),

            client_origins,

            movement,
            input_rate_limit: parse_or("INPUT_RATE_LIMIT", INPUT_RATE_LIMIT)?,
        })
    }

    /// True when running with the built-in development secret
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_secs: 3600,
            users_file: PathBuf::from("users.json"),
            client_origins: Vec::new(),
            movement: MovementLimits::default(),
            input_rate_limit: INPUT_RATE_LIMIT,
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
