//! Configuration loading from the process environment.
//!
//! This hub's external surface is small: a database URL, a listen port,
//! and a token signing secret (§6 "Environment"). The database URL is
//! required; its absence is a fatal startup error.

use std::env;

/// Resolved server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection string (e.g. `sqlite://data/hub.db`). Required.
    pub database_url: String,
    /// Port the WebSocket/HTTP gateway listens on. Defaults to 3000.
    pub listen_port: u16,
    /// HMAC secret used to sign and verify auth tokens. Required.
    pub token_secret: String,
}

/// Errors produced while resolving configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required but was not set")]
    MissingRequired(&'static str),
    #[error("{0} is set but not a valid u16: {1}")]
    InvalidPort(&'static str, String),
}

impl Config {
    /// Load configuration from the environment, failing fast on anything
    /// missing or malformed so the process never starts half-configured.
    pub fn from_env() -> Result<Self, Vec<ConfigError>> {
        let mut errors = Vec::new();

        let database_url = match env::var("DATABASE_URL") {
            Ok(v) if !v.is_empty() => Some(v),
            _ => {
                errors.push(ConfigError::MissingRequired("DATABASE_URL"));
                None
            }
        };

        let token_secret = match env::var("TOKEN_SECRET") {
            Ok(v) if !v.is_empty() => Some(v),
            _ => {
                errors.push(ConfigError::MissingRequired("TOKEN_SECRET"));
                None
            }
        };

        let listen_port = match env::var("LISTEN_PORT") {
            Ok(raw) => match raw.parse::<u16>() {
                Ok(p) => p,
                Err(_) => {
                    errors.push(ConfigError::InvalidPort("LISTEN_PORT", raw));
                    3000
                }
            },
            Err(_) => 3000,
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Config {
            database_url: database_url.expect("checked above"),
            listen_port,
            token_secret: token_secret.expect("checked above"),
        })
    }
}
