//! Heartbeat publisher
//!
//! While this instance is ACTIVE, rewrites the heartbeat key on every tick
//! so standbys keep seeing a live leader. In STANDBY it writes nothing and
//! lets the key expire; that expiry is what the other instances react to.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::role::{InstanceIdentity, RoleCell};
use crate::store::{bounded, LockStore};

/// Value stored under the heartbeat key
pub const HEARTBEAT_MARKER: &str = "active";

pub struct HeartbeatPublisher {
    identity: InstanceIdentity,
    heartbeat_key: String,
    ttl: Duration,
    interval: Duration,
    store_timeout: Duration,
    store: Arc<dyn LockStore>,
    role: Arc<RoleCell>,
}

impl HeartbeatPublisher {
    pub fn new(
        identity: InstanceIdentity,
        heartbeat_key: String,
        ttl: Duration,
        interval: Duration,
        store_timeout: Duration,
        store: Arc<dyn LockStore>,
        role: Arc<RoleCell>,
    ) -> Self {
        Self {
            identity,
            heartbeat_key,
            ttl,
            interval,
            store_timeout,
            store,
            role,
        }
    }

    /// Publish once if ACTIVE. Returns whether a heartbeat was written.
    pub async fn publish_cycle(&self) -> Result<bool> {
        if !self.role.is_active() {
            return Ok(false);
        }

        bounded(
            self.store_timeout,
            self.store.set(&self.heartbeat_key, HEARTBEAT_MARKER, self.ttl),
        )
        .await?;

        debug!(instance_id = %self.identity, key = %self.heartbeat_key, "Heartbeat published");
        Ok(true)
    }

    /// Publish on a fixed interval until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(instance_id = %self.identity, interval = ?self.interval, "Starting heartbeat publisher");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_cycle().await {
                        warn!(instance_id = %self.identity, error = %e, "Failed to publish heartbeat");
                    }
                }
                _ = shutdown.recv() => {
                    info!(instance_id = %self.identity, "Heartbeat publisher shutting down");
                    break;
                }
            }
        }
    }
}
