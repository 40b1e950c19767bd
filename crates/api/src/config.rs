//! Process configuration, read from environment variables.

use std::net::SocketAddr;

use thiserror::Error;

pub const BIND_ADDR: &str = "STOCKROOM_BIND_ADDR";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "STOCKROOM_DB_MAX_CONNECTIONS";
pub const MAX_CONFLICT_RETRIES: &str = "STOCKROOM_MAX_CONFLICT_RETRIES";
pub const DEFAULT_PAGE_SIZE: &str = "STOCKROOM_DEFAULT_PAGE_SIZE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory backend.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub max_conflict_retries: u32,
    pub default_page_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            db_max_connections: 10,
            max_conflict_retries: 5,
            default_page_size: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let bind_addr = match get(BIND_ADDR) {
            Some(v) => v.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: BIND_ADDR,
                value: v.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.bind_addr,
        };

        let default_page_size = parse_u32(&get, DEFAULT_PAGE_SIZE, defaults.default_page_size)?;
        if !(1..=100).contains(&default_page_size) {
            return Err(ConfigError::Invalid {
                key: DEFAULT_PAGE_SIZE,
                value: default_page_size.to_string(),
                reason: "must be between 1 and 100".to_string(),
            });
        }

        let db_max_connections = parse_u32(&get, DB_MAX_CONNECTIONS, defaults.db_max_connections)?;
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: DB_MAX_CONNECTIONS,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            database_url: get(DATABASE_URL),
            db_max_connections,
            max_conflict_retries: parse_u32(&get, MAX_CONFLICT_RETRIES, defaults.max_conflict_retries)?,
            default_page_size,
        })
    }
}

fn parse_u32(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match get(key) {
        Some(v) => v.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
            key,
            value: v.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
