//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &["ha.toml", "./config/ha.toml", "/etc/ha-node/ha.toml"];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with(|key| env::var(key).ok())
    }

    /// Same as [`load`](Self::load) but reads overrides through `lookup`
    /// instead of the process environment.
    pub fn load_with<F>(&self, lookup: F) -> Result<AppConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file(&lookup) {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, &lookup);
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file<F>(&self, lookup: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Some(path) = lookup("HA_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            warn!(?path, "HA_CONFIG points to a missing file, ignoring");
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `key` into `target`, leaving it untouched when unset or malformed.
fn parse_into<T, F>(lookup: &F, key: &str, target: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(key) {
        match val.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value = %val, "Ignoring unparseable environment override"),
        }
    }
}

fn string_into<F>(lookup: &F, key: &str, target: &mut String)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(key) {
        *target = val;
    }
}

/// Apply environment variable overrides
fn apply_overrides<F>(config: &mut AppConfig, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    // Store
    string_into(lookup, "HA_STORE_HOST", &mut config.store.host);
    parse_into(lookup, "HA_STORE_PORT", &mut config.store.port);
    string_into(lookup, "HA_STORE_PASSWORD", &mut config.store.password);
    parse_into(lookup, "HA_STORE_DB", &mut config.store.db);
    string_into(lookup, "HA_HEARTBEAT_KEY", &mut config.store.heartbeat_key);
    string_into(lookup, "HA_LOCK_KEY", &mut config.store.lock_key);

    // Broker
    string_into(lookup, "HA_BROKER_HOST", &mut config.broker.host);
    parse_into(lookup, "HA_BROKER_PORT", &mut config.broker.port);
    string_into(lookup, "HA_BROKER_USERNAME", &mut config.broker.username);
    string_into(lookup, "HA_BROKER_PASSWORD", &mut config.broker.password);
    string_into(lookup, "HA_BROKER_VHOST", &mut config.broker.vhost);
    string_into(lookup, "HA_BROKER_CONNECTION_NAME", &mut config.broker.connection_name);
    parse_into(lookup, "HA_BROKER_TIMEOUT_MS", &mut config.broker.timeout_ms);

    // Election
    string_into(lookup, "HA_INSTANCE_ID", &mut config.election.instance_id);
    parse_into(lookup, "HA_LOCK_TTL_SECS", &mut config.election.lock_ttl_seconds);
    parse_into(
        lookup,
        "HA_HEARTBEAT_INTERVAL_SECS",
        &mut config.election.heartbeat_interval_seconds,
    );
    parse_into(lookup, "HA_STORE_TIMEOUT_MS", &mut config.election.store_timeout_ms);
    parse_into(
        lookup,
        "HA_RETRACT_LOCK_ON_CONNECT_FAILURE",
        &mut config.election.retract_lock_on_connect_failure,
    );

    // HTTP
    parse_into(lookup, "HA_HTTP_ENABLED", &mut config.http.enabled);
    string_into(lookup, "HA_HTTP_HOST", &mut config.http.host);
    parse_into(lookup, "HA_HTTP_PORT", &mut config.http.port);
}
