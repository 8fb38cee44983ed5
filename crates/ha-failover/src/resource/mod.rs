//! Downstream resource owned by the active instance

use async_trait::async_trait;

use crate::error::ResourceError;

pub mod amqp;
pub mod mock;

pub use amqp::{AmqpConfig, AmqpResource};
pub use mock::MockResource;

/// Connect/disconnect hooks run on promotion and demotion.
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    /// Open the resource. An error aborts the promotion in progress.
    async fn connect(&self) -> Result<(), ResourceError>;

    /// Close the resource if open. Safe to call repeatedly; failures are
    /// logged by the implementation, never returned.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
