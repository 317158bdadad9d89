//! Configuration for records and session backends.

use serde::Deserialize;
use std::time::Duration;

const DEFAULT_DETAIL_TTL_MS: u64 = 3000;

/// Connection configuration for database backends.
#[derive(Debug, Clone)]
pub enum ConnectionConfig {
    /// Connect using a database URL string.
    Url(String),
}

impl From<&str> for ConnectionConfig {
    fn from(url: &str) -> Self {
        ConnectionConfig::Url(url.to_string())
    }
}

impl From<String> for ConnectionConfig {
    fn from(url: String) -> Self {
        ConnectionConfig::Url(url)
    }
}

impl From<&String> for ConnectionConfig {
    fn from(url: &String) -> Self {
        ConnectionConfig::Url(url.clone())
    }
}

/// Per-record behaviour, typically deserialized from the application's
/// configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Use the detail cache whenever a cache store is attached.
    pub cache_enabled: bool,
    /// Lifetime of cached single-row lookups, in milliseconds.
    pub detail_ttl_ms: u64,
    /// Permit update/delete statements without conditions.
    pub allow_unfiltered_writes: bool,
}

impl ModelConfig {
    pub fn detail_ttl(&self) -> Duration {
        Duration::from_millis(self.detail_ttl_ms)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            detail_ttl_ms: DEFAULT_DETAIL_TTL_MS,
            allow_unfiltered_writes: false,
        }
    }
}
