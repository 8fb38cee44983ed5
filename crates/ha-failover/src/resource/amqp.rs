//! AMQP broker connection held while active
//!
//! Opens a connection and a single channel on promotion and closes both on
//! demotion. The channel is exposed so the application can publish or
//! consume while this instance is the active one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::ResourceLifecycle;
use crate::error::ResourceError;

/// Configuration for the broker connection
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Connection name reported to the broker
    pub connection_name: String,
    /// Upper bound on connecting and on each close handshake
    pub timeout: Duration,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            connection_name: "ha-node".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl AmqpConfig {
    /// AMQP URI with credentials and vhost percent-encoded.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.vhost),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct AmqpHandle {
    connection: Connection,
    channel: Channel,
}

/// Broker connection + channel pair, present only while active.
pub struct AmqpResource {
    config: AmqpConfig,
    handle: RwLock<Option<AmqpHandle>>,
    connected: AtomicBool,
}

impl AmqpResource {
    pub fn new(config: AmqpConfig) -> Self {
        Self {
            config,
            handle: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Close with a bounded wait; on timeout the connection is dropped.
    async fn close_connection(&self, connection: Connection, reason: &str) {
        match tokio::time::timeout(self.config.timeout, connection.close(200, reason)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to close broker connection"),
            Err(_) => warn!(timeout = ?self.config.timeout, "Broker connection close timed out, dropping it"),
        }
    }

    /// Channel of the current connection, if any.
    pub async fn channel(&self) -> Option<Channel> {
        self.handle.read().await.as_ref().map(|h| h.channel.clone())
    }
}

#[async_trait]
impl ResourceLifecycle for AmqpResource {
    async fn connect(&self) -> Result<(), ResourceError> {
        let mut handle = self.handle.write().await;
        if handle.is_some() {
            debug!(endpoint = %self.config.endpoint(), "Broker connection already open");
            return Ok(());
        }

        info!(endpoint = %self.config.endpoint(), vhost = %self.config.vhost, "Connecting to AMQP broker");

        let timeout = self.config.timeout;
        let timeout_ms = timeout.as_millis() as u64;

        let uri = self.config.uri();
        let connect = Connection::connect(
            &uri,
            ConnectionProperties::default()
                .with_connection_name(self.config.connection_name.clone().into()),
        );
        let connection = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| ResourceError::Timeout(timeout_ms))?
            .map_err(|e| ResourceError::Connection(e.to_string()))?;

        let channel = match tokio::time::timeout(timeout, connection.create_channel()).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                // Do not leave a half-open connection behind.
                self.close_connection(connection, "Channel open failed").await;
                return Err(ResourceError::Channel(e.to_string()));
            }
            Err(_) => {
                self.close_connection(connection, "Channel open timed out").await;
                return Err(ResourceError::Timeout(timeout_ms));
            }
        };

        *handle = Some(AmqpHandle { connection, channel });
        self.connected.store(true, Ordering::SeqCst);

        info!(endpoint = %self.config.endpoint(), "Connected to AMQP broker");
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(AmqpHandle { connection, channel }) = self.handle.write().await.take() else {
            debug!("Broker connection already closed");
            return;
        };
        self.connected.store(false, Ordering::SeqCst);

        match tokio::time::timeout(self.config.timeout, channel.close(200, "Standby")).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to close broker channel"),
            Err(_) => warn!(timeout = ?self.config.timeout, "Broker channel close timed out"),
        }
        self.close_connection(connection, "Standby").await;

        info!(endpoint = %self.config.endpoint(), "Disconnected from AMQP broker");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
