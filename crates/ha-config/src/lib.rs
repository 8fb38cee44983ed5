//! ha-node Configuration
//!
//! Environment-style configuration for the failover node. Every key can be
//! set through an `HA_*` environment variable; an optional TOML file seeds
//! the same keys before the environment overrides are applied.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub broker: BrokerConfig,
    pub election: ElectionSettings,
    pub http: HttpConfig,
}

/// Shared lock store (Redis) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
    /// Key whose presence means "some instance is active"
    pub heartbeat_key: String,
    /// Key holding the current leader's instance id
    pub lock_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            heartbeat_key: "ha:heartbeat".to_string(),
            lock_key: "ha:leader_lock".to_string(),
        }
    }
}

impl StoreConfig {
    /// Build a `redis://` URL from the configured parts, percent-encoding
    /// the password.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(&self.password),
                self.host,
                self.port,
                self.db
            )
        }
    }
}

/// Downstream messaging broker (AMQP) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Connection name shown in the broker's management UI
    pub connection_name: String,
    /// Upper bound on connecting to and disconnecting from the broker
    pub timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            connection_name: "ha-node".to_string(),
            timeout_ms: 5000,
        }
    }
}

/// Leader election timing and behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionSettings {
    /// Instance id; a random UUID is generated when empty
    pub instance_id: String,
    /// TTL applied to both the lock and the heartbeat key
    pub lock_ttl_seconds: u64,
    /// Interval of both the poll loop and the heartbeat loop
    pub heartbeat_interval_seconds: u64,
    /// Upper bound on a single store round trip
    pub store_timeout_ms: u64,
    /// Release the lock right away when the broker connect fails during promotion
    pub retract_lock_on_connect_failure: bool,
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self {
            instance_id: String::new(),
            lock_ttl_seconds: 15,
            heartbeat_interval_seconds: 5,
            store_timeout_ms: 3000,
            retract_lock_on_connect_failure: false,
        }
    }
}

/// Health/status HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings under which the failover protocol cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let election = &self.election;

        if election.lock_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "election.lock_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        if election.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "election.heartbeat_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if election.store_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "election.store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.broker.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "broker.timeout_ms must be greater than zero".to_string(),
            ));
        }
        // Heartbeats must land before the previous one expires.
        if election.lock_ttl_seconds <= election.heartbeat_interval_seconds {
            return Err(ConfigError::ValidationError(format!(
                "election.lock_ttl_seconds ({}) must exceed election.heartbeat_interval_seconds ({})",
                election.lock_ttl_seconds, election.heartbeat_interval_seconds
            )));
        }
        // A connect still running when the lock expires would promote without it.
        if self.broker.timeout_ms >= election.lock_ttl_seconds.saturating_mul(1000) {
            return Err(ConfigError::ValidationError(format!(
                "broker.timeout_ms ({}) must be shorter than election.lock_ttl_seconds ({})",
                self.broker.timeout_ms, election.lock_ttl_seconds
            )));
        }
        if self.store.heartbeat_key == self.store.lock_key {
            return Err(ConfigError::ValidationError(
                "store.heartbeat_key and store.lock_key must differ".to_string(),
            ));
        }
        if self.store.heartbeat_key.is_empty() || self.store.lock_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "store keys must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# ha-node configuration
# HA_* environment variables override these settings

[store]
host = "localhost"
port = 6379
password = ""
db = 0
heartbeat_key = "ha:heartbeat"
lock_key = "ha:leader_lock"

[broker]
host = "localhost"
port = 5672
username = "guest"
password = "guest"
vhost = "/"
connection_name = "ha-node"
timeout_ms = 5000

[election]
instance_id = ""                 # random UUID when empty
lock_ttl_seconds = 15
heartbeat_interval_seconds = 5
store_timeout_ms = 3000
retract_lock_on_connect_failure = false

[http]
enabled = true
host = "0.0.0.0"
port = 8080
"#
        .to_string()
    }
}
