//! Leader election over the shared heartbeat and lock keys
//!
//! Each poll cycle reads the heartbeat key and reconciles the local role:
//!
//! | heartbeat | role    | action                                 |
//! |-----------|---------|----------------------------------------|
//! | absent    | STANDBY | try `SET lock NX EX`; promote on win   |
//! | present   | ACTIVE  | renew the lock; demote if not owner    |
//! | present   | STANDBY | nothing                                |
//! | absent    | ACTIVE  | nothing                                |
//!
//! Store failures never change the role: the cycle is skipped and retried
//! on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{FailoverError, Result};
use crate::resource::ResourceLifecycle;
use crate::role::{InstanceIdentity, Role, RoleCell};
use crate::state::RoleStateMachine;
use crate::store::{bounded, LockStore};

/// Configuration for leader election
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Key whose presence means some instance is active
    pub heartbeat_key: String,

    /// Key holding the owner's instance id
    pub lock_key: String,

    /// TTL of both the lock and the heartbeat
    pub lock_ttl: Duration,

    /// Poll and heartbeat interval (must be less than the TTL)
    pub heartbeat_interval: Duration,

    /// Upper bound on a single store call
    pub store_timeout: Duration,

    /// Upper bound on a resource connect or disconnect
    pub resource_timeout: Duration,

    /// Release the lock immediately if the resource connect fails on promotion
    pub retract_lock_on_connect_failure: bool,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_key: "ha:heartbeat".to_string(),
            lock_key: "ha:leader_lock".to_string(),
            lock_ttl: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(5),
            store_timeout: Duration::from_secs(3),
            resource_timeout: Duration::from_secs(5),
            retract_lock_on_connect_failure: false,
        }
    }
}

impl ElectionConfig {
    pub fn with_keys(mut self, heartbeat_key: String, lock_key: String) -> Self {
        self.heartbeat_key = heartbeat_key;
        self.lock_key = lock_key;
        self
    }

    pub fn with_timing(mut self, lock_ttl: Duration, heartbeat_interval: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    pub fn with_timeouts(mut self, store_timeout: Duration, resource_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self.resource_timeout = resource_timeout;
        self
    }

    pub fn with_retract_on_connect_failure(mut self, retract: bool) -> Self {
        self.retract_lock_on_connect_failure = retract;
        self
    }

    /// Reject timings the election loops cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(FailoverError::Config(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if self.lock_ttl <= self.heartbeat_interval {
            return Err(FailoverError::Config(format!(
                "lock TTL ({:?}) must exceed the heartbeat interval ({:?})",
                self.lock_ttl, self.heartbeat_interval
            )));
        }
        if self.store_timeout.is_zero() || self.resource_timeout.is_zero() {
            return Err(FailoverError::Config(
                "store and resource timeouts must be greater than zero".to_string(),
            ));
        }
        // A connect still pending when the lock expires would promote without it.
        if self.resource_timeout >= self.lock_ttl {
            return Err(FailoverError::Config(format!(
                "resource timeout ({:?}) must be shorter than the lock TTL ({:?})",
                self.resource_timeout, self.lock_ttl
            )));
        }
        if self.heartbeat_key == self.lock_key {
            return Err(FailoverError::Config(
                "heartbeat and lock keys must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a single poll cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Won the lock and connected the resource
    Promoted,
    /// Won the lock but the resource connect failed
    PromotionAborted,
    /// Heartbeat absent but another instance holds the lock
    LostRace,
    /// Still the lock owner, TTL refreshed
    Renewed,
    /// Lock owned by someone else, stepped down
    Demoted,
    /// Nothing to do for this heartbeat/role combination
    Idle,
    /// A store call failed; assumed no ownership change
    StoreUnavailable,
}

pub struct LeaderElector {
    identity: InstanceIdentity,
    config: ElectionConfig,
    store: Arc<dyn LockStore>,
    state: RoleStateMachine,
}

impl LeaderElector {
    pub fn new(
        identity: InstanceIdentity,
        config: ElectionConfig,
        store: Arc<dyn LockStore>,
        role: Arc<RoleCell>,
        resource: Arc<dyn ResourceLifecycle>,
    ) -> Self {
        let state =
            RoleStateMachine::new(identity.clone(), role, resource, config.resource_timeout);
        Self {
            identity,
            config,
            store,
            state,
        }
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.state.role()
    }

    pub fn state(&self) -> &RoleStateMachine {
        &self.state
    }

    /// Claim the lock with `SET NX EX`. `Ok(false)` means another instance
    /// holds it; there is no retry within the cycle.
    pub async fn acquire_lock(&self) -> Result<bool> {
        bounded(
            self.config.store_timeout,
            self.store
                .set_if_absent(&self.config.lock_key, self.identity.as_str(), self.config.lock_ttl),
        )
        .await
    }

    /// Refresh the lock TTL if this instance still owns it. `Ok(false)`
    /// means the recorded owner is someone else (or nobody) and nothing was
    /// changed.
    pub async fn renew_lock(&self) -> Result<bool> {
        bounded(
            self.config.store_timeout,
            self.store
                .renew_if_owner(&self.config.lock_key, self.identity.as_str(), self.config.lock_ttl),
        )
        .await
    }

    /// Delete the lock if this instance owns it.
    pub async fn release_lock(&self) -> Result<bool> {
        bounded(
            self.config.store_timeout,
            self.store
                .release_if_owner(&self.config.lock_key, self.identity.as_str()),
        )
        .await
    }

    async fn heartbeat_present(&self) -> Result<bool> {
        let value = bounded(
            self.config.store_timeout,
            self.store.get(&self.config.heartbeat_key),
        )
        .await?;
        Ok(value.is_some())
    }

    /// Run one election cycle.
    pub async fn poll_cycle(&self) -> PollOutcome {
        let heartbeat_present = match self.heartbeat_present().await {
            Ok(present) => present,
            Err(e) => {
                warn!(instance_id = %self.identity, error = %e, "Failed to read heartbeat, skipping cycle");
                return PollOutcome::StoreUnavailable;
            }
        };

        match (heartbeat_present, self.state.role()) {
            (false, Role::Standby) => self.try_promote().await,
            (true, Role::Active) => self.confirm_ownership().await,
            (true, Role::Standby) => {
                debug!(instance_id = %self.identity, "Active instance is alive");
                PollOutcome::Idle
            }
            (false, Role::Active) => {
                debug!(instance_id = %self.identity, "Heartbeat not yet published");
                PollOutcome::Idle
            }
        }
    }

    async fn try_promote(&self) -> PollOutcome {
        info!(
            instance_id = %self.identity,
            "Active instance is down, attempting to become active"
        );

        match self.acquire_lock().await {
            Ok(true) => {}
            Ok(false) => {
                info!(instance_id = %self.identity, "Lock held by another instance, staying STANDBY");
                return PollOutcome::LostRace;
            }
            Err(e) => {
                warn!(instance_id = %self.identity, error = %e, "Lock acquisition failed, staying STANDBY");
                return PollOutcome::StoreUnavailable;
            }
        }

        match self.state.promote().await {
            Ok(_) => PollOutcome::Promoted,
            Err(_) => {
                if self.config.retract_lock_on_connect_failure {
                    self.retract_lock().await;
                }
                PollOutcome::PromotionAborted
            }
        }
    }

    async fn retract_lock(&self) {
        match self.release_lock().await {
            Ok(true) => info!(instance_id = %self.identity, "Retracted lock after failed promotion"),
            Ok(false) => debug!(instance_id = %self.identity, "Lock no longer ours, nothing to retract"),
            Err(e) => warn!(instance_id = %self.identity, error = %e, "Failed to retract lock, leaving it to expire"),
        }
    }

    async fn confirm_ownership(&self) -> PollOutcome {
        match self.renew_lock().await {
            Ok(true) => {
                debug!(instance_id = %self.identity, "Renewed leader lock");
                PollOutcome::Renewed
            }
            Ok(false) => {
                warn!(instance_id = %self.identity, "Lock owned by another instance, stepping down");
                self.state.demote().await;
                PollOutcome::Demoted
            }
            Err(e) => {
                warn!(instance_id = %self.identity, error = %e, "Lock renewal failed, keeping current role");
                PollOutcome::StoreUnavailable
            }
        }
    }

    /// Poll on a fixed interval until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            instance_id = %self.identity,
            lock_key = %self.config.lock_key,
            heartbeat_key = %self.config.heartbeat_key,
            "Starting leader election"
        );

        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.poll_cycle().await;
                    debug!(instance_id = %self.identity, ?outcome, role = %self.role(), "Poll cycle complete");
                }
                _ = shutdown.recv() => {
                    info!(instance_id = %self.identity, "Leader election shutting down");
                    break;
                }
            }
        }
    }

    /// Give up the active role on a clean shutdown: disconnect the resource,
    /// clear the heartbeat and release the lock so a standby can take over
    /// on its next poll instead of waiting for the TTL.
    pub async fn step_down(&self) {
        if self.state.role() != Role::Active {
            return;
        }

        self.state.demote().await;

        let heartbeat = bounded(
            self.config.store_timeout,
            self.store.delete(&self.config.heartbeat_key),
        )
        .await;
        if let Err(e) = heartbeat {
            error!(instance_id = %self.identity, error = %e, "Failed to clear heartbeat on shutdown");
        }

        match self.release_lock().await {
            Ok(true) => info!(instance_id = %self.identity, "Released leader lock"),
            Ok(false) => debug!(instance_id = %self.identity, "Leader lock was already released"),
            Err(e) => error!(instance_id = %self.identity, error = %e, "Failed to release leader lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MockResource;
    use crate::store::MemoryLockStore;

    struct Fixture {
        elector: LeaderElector,
        store: Arc<MemoryLockStore>,
        role: Arc<RoleCell>,
        resource: Arc<MockResource>,
    }

    fn fixture(id: &str, store: Arc<MemoryLockStore>, config: ElectionConfig) -> Fixture {
        let role = Arc::new(RoleCell::new());
        let resource = Arc::new(MockResource::new());
        let elector = LeaderElector::new(
            InstanceIdentity::from_configured(id),
            config,
            store.clone(),
            role.clone(),
            resource.clone(),
        );
        Fixture {
            elector,
            store,
            role,
            resource,
        }
    }

    async fn heartbeat(store: &MemoryLockStore) {
        store
            .set("ha:heartbeat", "active", Duration::from_secs(15))
            .await
            .unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let config = ElectionConfig::default();
        assert_eq!(config.lock_ttl, Duration::from_secs(15));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat_key, "ha:heartbeat");
        assert_eq!(config.lock_key, "ha:leader_lock");
        assert!(!config.retract_lock_on_connect_failure);
    }

    #[test]
    fn test_config_builder() {
        let config = ElectionConfig::default()
            .with_keys("svc:hb".to_string(), "svc:lock".to_string())
            .with_timing(Duration::from_secs(30), Duration::from_secs(10))
            .with_retract_on_connect_failure(true);

        assert_eq!(config.heartbeat_key, "svc:hb");
        assert_eq!(config.lock_key, "svc:lock");
        assert_eq!(config.lock_ttl, Duration::from_secs(30));
        assert!(config.retract_lock_on_connect_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validate_rejects_unusable_timings() {
        assert!(ElectionConfig::default().validate().is_ok());

        let zero_interval =
            ElectionConfig::default().with_timing(Duration::from_secs(15), Duration::ZERO);
        assert!(matches!(zero_interval.validate(), Err(FailoverError::Config(_))));

        let ttl_not_above_interval = ElectionConfig::default()
            .with_timing(Duration::from_secs(5), Duration::from_secs(5));
        assert!(ttl_not_above_interval.validate().is_err());

        let slow_resource = ElectionConfig::default()
            .with_timeouts(Duration::from_secs(3), Duration::from_secs(15));
        assert!(slow_resource.validate().is_err());

        let zero_store_timeout =
            ElectionConfig::default().with_timeouts(Duration::ZERO, Duration::from_secs(5));
        assert!(zero_store_timeout.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_heartbeat_promotes_standby() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());

        assert_eq!(f.elector.poll_cycle().await, PollOutcome::Promoted);
        assert_eq!(f.role.get(), Role::Active);
        assert!(f.resource.is_connected());
        assert_eq!(f.store.peek("ha:leader_lock").as_deref(), Some("a"));
        assert_eq!(f.store.ttl("ha:leader_lock"), Some(Duration::from_secs(15)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_heartbeat_keeps_standby_idle() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        heartbeat(&f.store).await;

        assert_eq!(f.elector.poll_cycle().await, PollOutcome::Idle);
        assert_eq!(f.role.get(), Role::Standby);
        assert!(f.store.peek("ha:leader_lock").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_race_stays_standby() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        f.store
            .set_if_absent("ha:leader_lock", "b", Duration::from_secs(15))
            .await
            .unwrap();

        assert_eq!(f.elector.poll_cycle().await, PollOutcome::LostRace);
        assert_eq!(f.role.get(), Role::Standby);
        assert_eq!(f.resource.connect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_with_heartbeat_renews_lock() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        f.elector.poll_cycle().await;
        heartbeat(&f.store).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(f.elector.poll_cycle().await, PollOutcome::Renewed);
        assert_eq!(f.store.ttl("ha:leader_lock"), Some(Duration::from_secs(15)));
        assert_eq!(f.role.get(), Role::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_without_heartbeat_is_noop() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        f.elector.poll_cycle().await;

        assert_eq!(f.elector.poll_cycle().await, PollOutcome::Idle);
        assert_eq!(f.role.get(), Role::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_fails_only_for_foreign_owner() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        assert!(f.elector.acquire_lock().await.unwrap());
        assert!(f.elector.renew_lock().await.unwrap());

        f.store.delete("ha:leader_lock").await.unwrap();
        f.store
            .set_if_absent("ha:leader_lock", "b", Duration::from_secs(15))
            .await
            .unwrap();
        assert!(!f.elector.renew_lock().await.unwrap());
        // Renewal must not touch someone else's lock
        assert_eq!(f.store.peek("ha:leader_lock").as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_lock_demotes_with_disconnect() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        f.resource.observe_role(f.role.clone());
        f.elector.poll_cycle().await;

        // Lock expired and was claimed by b while our heartbeat is still live
        f.store.delete("ha:leader_lock").await.unwrap();
        f.store
            .set_if_absent("ha:leader_lock", "b", Duration::from_secs(15))
            .await
            .unwrap();
        heartbeat(&f.store).await;

        assert_eq!(f.elector.poll_cycle().await, PollOutcome::Demoted);
        assert_eq!(f.role.get(), Role::Standby);
        assert!(!f.resource.is_connected());
        assert_eq!(f.resource.roles_at_disconnect(), vec![Role::Active]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_keeps_lock_by_default() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        f.resource.set_fail_connect(true);

        assert_eq!(f.elector.poll_cycle().await, PollOutcome::PromotionAborted);
        assert_eq!(f.role.get(), Role::Standby);
        assert_eq!(f.store.peek("ha:leader_lock").as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_retracts_lock_when_configured() {
        let config = ElectionConfig::default().with_retract_on_connect_failure(true);
        let f = fixture("a", Arc::new(MemoryLockStore::new()), config);
        f.resource.set_fail_connect(true);

        assert_eq!(f.elector.poll_cycle().await, PollOutcome::PromotionAborted);
        assert!(f.store.peek("ha:leader_lock").is_none());

        f.resource.set_fail_connect(false);
        assert_eq!(f.elector.poll_cycle().await, PollOutcome::Promoted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_outage_changes_nothing() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        f.store.set_unavailable(true);
        assert_eq!(f.elector.poll_cycle().await, PollOutcome::StoreUnavailable);
        assert_eq!(f.role.get(), Role::Standby);

        f.store.set_unavailable(false);
        f.elector.poll_cycle().await;
        heartbeat(&f.store).await;

        f.store.set_unavailable(true);
        assert_eq!(f.elector.poll_cycle().await, PollOutcome::StoreUnavailable);
        assert_eq!(f.role.get(), Role::Active);
        assert!(f.resource.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_down_releases_lock_and_heartbeat() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        f.elector.poll_cycle().await;
        heartbeat(&f.store).await;

        f.elector.step_down().await;
        assert_eq!(f.role.get(), Role::Standby);
        assert!(!f.resource.is_connected());
        assert!(f.store.peek("ha:leader_lock").is_none());
        assert!(f.store.peek("ha:heartbeat").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_down_as_standby_leaves_store_alone() {
        let f = fixture("a", Arc::new(MemoryLockStore::new()), ElectionConfig::default());
        heartbeat(&f.store).await;

        f.elector.step_down().await;
        assert!(f.store.peek("ha:heartbeat").is_some());
        assert_eq!(f.resource.disconnect_calls(), 0);
    }
}
