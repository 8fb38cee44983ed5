//! Active/Standby Failover
//!
//! Runs N equivalent instances of a service with exactly one of them active.
//! Coordination happens entirely through two keys in a shared store:
//!
//! - **Heartbeat key**: refreshed by the active instance every interval with
//!   a TTL. Its absence tells standbys the active instance is gone.
//! - **Lock key**: claimed with an atomic set-if-absent and holding the
//!   owner's instance id. Only the owner may refresh its TTL.
//!
//! The active instance also owns a downstream broker connection, opened on
//! promotion and closed on demotion.
//!
//! # Features
//!
//! - **Leader election**: heartbeat-triggered `SET NX EX` lock acquisition
//!   with owner-checked renewal
//! - **Automatic failover**: a standby takes over once the heartbeat and the
//!   lock of a dead leader expire
//! - **Resource lifecycle**: AMQP connection + channel tied to the active role
//! - **Graceful step-down**: releases lock and heartbeat on clean shutdown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ha_failover::{
//!     AmqpConfig, AmqpResource, ElectionConfig, FailoverNode, InstanceIdentity,
//!     RedisLockStore,
//! };
//!
//! async fn example() -> ha_failover::Result<()> {
//!     let store = Arc::new(RedisLockStore::connect("redis://localhost:6379").await?);
//!     let resource = Arc::new(AmqpResource::new(AmqpConfig::default()));
//!
//!     let node = FailoverNode::new(
//!         InstanceIdentity::generate(),
//!         ElectionConfig::default(),
//!         store,
//!         resource,
//!     );
//!     node.start()?;
//!
//!     node.wait_for_active().await;
//!     // ... serve while active ...
//!
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! Failover gives no fencing: a demoted leader may still hold its broker
//! connection briefly after another instance promoted.

pub mod api;
mod elector;
mod error;
mod heartbeat;
mod node;
pub mod resource;
mod role;
mod state;
pub mod store;

pub use elector::{ElectionConfig, LeaderElector, PollOutcome};
pub use error::{FailoverError, ResourceError, Result};
pub use heartbeat::{HeartbeatPublisher, HEARTBEAT_MARKER};
pub use node::FailoverNode;
pub use resource::{AmqpConfig, AmqpResource, MockResource, ResourceLifecycle};
pub use role::{InstanceIdentity, Role, RoleCell};
pub use state::{RoleStateMachine, Transition};
pub use store::{LockStore, MemoryLockStore, RedisLockStore};
