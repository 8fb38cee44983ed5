//! Shared fixtures for the failover integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ha_failover::{
    ElectionConfig, HeartbeatPublisher, InstanceIdentity, LeaderElector, MemoryLockStore,
    MockResource, Role, RoleCell,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const HEARTBEAT_KEY: &str = "ha:heartbeat";
pub const LOCK_KEY: &str = "ha:leader_lock";

/// One simulated process: elector + heartbeat publisher over a shared store.
pub struct Instance {
    pub id: String,
    pub role: Arc<RoleCell>,
    pub resource: Arc<MockResource>,
    pub elector: Arc<LeaderElector>,
    pub heartbeat: Arc<HeartbeatPublisher>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Instance {
    pub fn new(id: &str, store: Arc<MemoryLockStore>) -> Self {
        Self::with_config(id, store, ElectionConfig::default())
    }

    pub fn with_config(id: &str, store: Arc<MemoryLockStore>, config: ElectionConfig) -> Self {
        let identity = InstanceIdentity::from_configured(id);
        let role = Arc::new(RoleCell::new());
        let resource = Arc::new(MockResource::new());
        resource.observe_role(role.clone());

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
            identity,
            config,
            store,
            role.clone(),
            resource.clone(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            id: id.to_string(),
            role,
            resource,
            elector,
            heartbeat,
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Spawn both loops.
    pub fn spawn(&mut self) {
        let elector = tokio::spawn(self.elector.clone().run(self.shutdown_tx.subscribe()));
        let heartbeat = tokio::spawn(self.heartbeat.clone().run(self.shutdown_tx.subscribe()));
        self.tasks.push(elector);
        self.tasks.push(heartbeat);
    }

    /// Stop both loops without releasing anything, like a crashed process.
    pub fn kill(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    pub fn role(&self) -> Role {
        self.role.get()
    }

    pub async fn wait_for_active(&self) {
        let mut rx = self.role.subscribe();
        rx.wait_for(|role| role.is_active()).await.unwrap();
    }
}

pub async fn advance_to(start: tokio::time::Instant, secs: u64) {
    tokio::time::sleep_until(start + Duration::from_secs(secs)).await;
}
