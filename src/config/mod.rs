//! Configuration module for the roster service and the roster watcher.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("missing required {0}")]
    Missing(&'static str),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Buffered change events per feed before slow subscribers lag
    pub feed_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("ROSTER_API_PSK").ok();

        let db_path = env::var("ROSTER_DB_PATH")
            .unwrap_or_else(|_| "./data/roster.sqlite".to_string())
            .into();

        let index_path = env::var("ROSTER_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = parse_var("ROSTER_BIND_ADDR", "127.0.0.1:8080")?;
        let log_level = env::var("ROSTER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let feed_capacity = parse_var("ROSTER_FEED_CAPACITY", "256")?;

        Ok(Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
            feed_capacity,
        })
    }
}

/// Configuration of the `roster-watch` binary.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Base URL of the roster service
    pub server_url: String,
    /// Service pre-shared key, if the server enforces one
    pub api_psk: Option<String>,
    /// Coach session token
    pub session_token: String,
    /// How long the resolved coach identity stays cached
    pub identity_ttl: Duration,
    pub log_level: String,
}

impl WatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let server_url = env::var("ROSTER_SERVER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        let api_psk = env::var("ROSTER_API_PSK").ok();
        let session_token =
            env::var("ROSTER_SESSION_TOKEN").map_err(|_| ConfigError::Missing("ROSTER_SESSION_TOKEN"))?;
        let ttl_secs: u64 = parse_var("ROSTER_IDENTITY_TTL_SECS", "300")?;
        let log_level = env::var("ROSTER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            server_url,
            api_psk,
            session_token,
            identity_ttl: Duration::from_secs(ttl_secs),
            log_level,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
