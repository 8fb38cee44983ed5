//! Shared lock store
//!
//! The failover protocol only needs four primitives from the store: GET,
//! unconditional SET with a TTL, SET-if-absent with a TTL, and EXPIRE.
//! Owner-checked renewal and release have default implementations on top of
//! those; backends that can do them atomically (Redis via Lua) override them.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FailoverError, Result};

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryLockStore;
pub use self::redis_store::RedisLockStore;

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Current value of `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditionally set `key` with the given TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Set `key` only if it does not exist. Returns whether this call created it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Refresh the TTL of `key`. Returns false if the key was absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Refresh the TTL of `key` only if its value is `owner`.
    async fn renew_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        match self.get(key).await? {
            Some(current) if current == owner => self.expire(key, ttl).await,
            _ => Ok(false),
        }
    }

    /// Delete `key` only if its value is `owner`.
    async fn release_if_owner(&self, key: &str, owner: &str) -> Result<bool> {
        match self.get(key).await? {
            Some(current) if current == owner => self.delete(key).await,
            _ => Ok(false),
        }
    }
}

/// Run a store call with an upper bound on how long it may block.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(FailoverError::StoreTimeout(timeout.as_millis() as u64)),
    }
}

/// Whole seconds for Redis `EX`, never below one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}
