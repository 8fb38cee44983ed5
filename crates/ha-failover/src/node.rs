//! Failover node
//!
//! Wires the role cell, leader elector and heartbeat publisher together and
//! runs the two loops as independent tasks. The loops share nothing but the
//! role cell.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::elector::{ElectionConfig, LeaderElector};
use crate::error::{FailoverError, Result};
use crate::heartbeat::HeartbeatPublisher;
use crate::resource::ResourceLifecycle;
use crate::role::{InstanceIdentity, Role, RoleCell};
use crate::store::LockStore;

pub struct FailoverNode {
    identity: InstanceIdentity,
    role: Arc<RoleCell>,
    elector: Arc<LeaderElector>,
    heartbeat: Arc<HeartbeatPublisher>,
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FailoverNode {
    pub fn new(
        identity: InstanceIdentity,
        config: ElectionConfig,
        store: Arc<dyn LockStore>,
        resource: Arc<dyn ResourceLifecycle>,
    ) -> Self {
        let role = Arc::new(RoleCell::new());

        let heartbeat = Arc::new(HeartbeatPublisher::new(
            identity.clone(),
            config.heartbeat_key.clone(),
            config.lock_ttl,
            config.heartbeat_interval,
            config.store_timeout,
            store.clone(),
            role.clone(),
        ));
        let elector = Arc::new(LeaderElector::new(
            identity.clone(),
            config,
            store,
            role.clone(),
            resource,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            identity,
            role,
            elector,
            heartbeat,
            running: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the election and heartbeat loops.
    pub fn start(&self) -> Result<()> {
        self.elector.config().validate()?;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(FailoverError::AlreadyRunning);
        }

        info!(instance_id = %self.identity, "Starting failover node in STANDBY");

        let elector = tokio::spawn(self.elector.clone().run(self.shutdown_tx.subscribe()));
        let heartbeat = tokio::spawn(self.heartbeat.clone().run(self.shutdown_tx.subscribe()));
        self.tasks.lock().extend([elector, heartbeat]);

        Ok(())
    }

    /// Stop both loops, then give up the active role if held.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!(instance_id = %self.identity, role = %self.role(), "Stopping failover node");
        // No receivers only means the loops already exited.
        let _ = self.shutdown_tx.send(());

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(instance_id = %self.identity, error = %e, "Failover task ended abnormally");
            }
        }

        // Both loops are stopped, so no heartbeat can be republished behind this.
        self.elector.step_down().await;
        info!(instance_id = %self.identity, "Failover node stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn role(&self) -> Role {
        self.role.get()
    }

    pub fn is_active(&self) -> bool {
        self.role.is_active()
    }

    pub fn resource_connected(&self) -> bool {
        self.elector.state().resource().is_connected()
    }

    pub fn elector(&self) -> &Arc<LeaderElector> {
        &self.elector
    }

    /// Subscribe to role changes
    pub fn subscribe(&self) -> watch::Receiver<Role> {
        self.role.subscribe()
    }

    /// Wait until this instance becomes active
    pub async fn wait_for_active(&self) {
        let mut rx = self.subscribe();
        // wait_for checks the current value first
        let _ = rx.wait_for(|role| role.is_active()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MockResource;
    use crate::store::MemoryLockStore;
    use std::time::Duration;

    fn node(store: Arc<MemoryLockStore>) -> (FailoverNode, Arc<MockResource>) {
        let resource = Arc::new(MockResource::new());
        let node = FailoverNode::new(
            InstanceIdentity::from_configured("node-a"),
            ElectionConfig::default(),
            store,
            resource.clone(),
        );
        (node, resource)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails() {
        let (node, _) = node(Arc::new(MemoryLockStore::new()));
        node.start().unwrap();
        assert!(matches!(node.start(), Err(FailoverError::AlreadyRunning)));
        node.shutdown().await;
        assert!(!node.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_zero_interval() {
        let node = FailoverNode::new(
            InstanceIdentity::from_configured("node-a"),
            ElectionConfig::default().with_timing(Duration::from_secs(15), Duration::ZERO),
            Arc::new(MemoryLockStore::new()),
            Arc::new(MockResource::new()),
        );

        assert!(matches!(node.start(), Err(FailoverError::Config(_))));
        assert!(!node.is_running());
        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_node_becomes_active_and_heartbeats() {
        let store = Arc::new(MemoryLockStore::new());
        let (node, resource) = node(store.clone());
        assert_eq!(node.role(), Role::Standby);

        node.start().unwrap();
        tokio::time::timeout(Duration::from_secs(1), node.wait_for_active())
            .await
            .unwrap();
        assert!(resource.is_connected());
        assert!(node.resource_connected());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(store.peek("ha:heartbeat").as_deref(), Some("active"));
        assert_eq!(store.peek("ha:leader_lock").as_deref(), Some("node-a"));

        node.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_releases_everything() {
        let store = Arc::new(MemoryLockStore::new());
        let (node, resource) = node(store.clone());
        node.start().unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(node.is_active());

        node.shutdown().await;
        assert_eq!(node.role(), Role::Standby);
        assert!(!resource.is_connected());
        assert!(store.peek("ha:leader_lock").is_none());
        assert!(store.peek("ha:heartbeat").is_none());

        // Second shutdown is a no-op
        node.shutdown().await;
        assert_eq!(resource.disconnect_calls(), 1);
    }
}
