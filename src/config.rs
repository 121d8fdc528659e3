//! Environment-driven configuration for the server and the client dispatcher

use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};

use crate::error::{RelayError, Result};
use crate::store::DEFAULT_KEY_PREFIX;

/// Environment variables holding the cluster stack, in preference order
pub const DATABASE_URL_VARS: [&str; 8] = [
    "DATABASE_URL",
    "DATABASE_URL_2",
    "DATABASE_URL_3",
    "DATABASE_URL_4",
    "DATABASE_URL_5",
    "DATABASE_URL_6",
    "DATABASE_URL_7",
    "DATABASE_URL_8",
];

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8080/api/query";
pub const DEFAULT_DATA_DIR: &str = "./local-data";
const DEFAULT_ACQUIRE_TIMEOUT_MS: &str = "5000";

/// Remote endpoint configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Cluster URLs, primary first. Never logged verbatim.
    pub database_urls: Vec<String>,
    /// How long a request waits for a pooled connection before the cluster counts as failed
    pub acquire_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_urls: Vec::new(),
            acquire_timeout: Duration::from_millis(5000),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let acquire_ms: u64 = try_load("RELAYSQL_ACQUIRE_TIMEOUT_MS", DEFAULT_ACQUIRE_TIMEOUT_MS)?;
        Ok(Self {
            bind_addr: try_load("RELAYSQL_BIND", DEFAULT_BIND)?,
            database_urls: database_urls_from_env(),
            acquire_timeout: Duration::from_millis(acquire_ms),
        })
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub data_dir: PathBuf,
    pub key_prefix: String,
    /// Whole-request HTTP timeout; `None` leaves it to the transport
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let timeout = match var("RELAYSQL_TIMEOUT_MS") {
            Some(raw) => Some(Duration::from_millis(parse_value("RELAYSQL_TIMEOUT_MS", &raw)?)),
            None => None,
        };
        Ok(Self {
            endpoint: try_load("RELAYSQL_ENDPOINT", DEFAULT_ENDPOINT)?,
            data_dir: try_load("RELAYSQL_DATA_DIR", DEFAULT_DATA_DIR)?,
            key_prefix: try_load("RELAYSQL_KEY_PREFIX", DEFAULT_KEY_PREFIX)?,
            timeout,
        })
    }
}

/// Read the cluster stack from `DATABASE_URL`, `DATABASE_URL_2`, ...; unset
/// or blank entries are dropped
pub fn database_urls_from_env() -> Vec<String> {
    let urls: Vec<String> = DATABASE_URL_VARS.iter().filter_map(|key| var(key)).collect();
    if urls.is_empty() {
        warn!("No DATABASE_URL configured; the cluster stack is empty");
    } else {
        info!("Cluster stack has {} configured clusters", urls.len());
    }
    urls
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{} not set, using default: {}", key, default);
        default.to_string()
    });
    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {} value: {}", key, e);
        RelayError::Config(format!("Invalid {} value '{}': {}", key, raw, e))
    })
}
