//! In-process lock store
//!
//! Keeps keys in a mutex-guarded map with `tokio::time::Instant` expiries, so
//! it follows tokio's paused clock in tests. Every operation, including the
//! owner-checked ones, runs under a single lock acquisition and is therefore
//! atomic with respect to other callers sharing the same store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::LockStore;
use crate::error::{FailoverError, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Lock store backed by process memory. Clone an `Arc` of it across
/// simulated instances to share one namespace.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remaining TTL of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Live value of `key`, bypassing the availability switch.
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FailoverError::StoreUnavailable(
                "memory store switched off".to_string(),
            ));
        }
        Ok(())
    }

    /// Lock the map and drop anything already expired under `key`.
    fn live_entries(&self, key: &str) -> parking_lot::MutexGuard<'_, HashMap<String, Entry>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        entries
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.live_entries(key).get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.live_entries(key).insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let mut entries = self.live_entries(key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        match self.live_entries(key).get_mut(key) {
            Some(entry) => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.live_entries(key).remove(key).is_some())
    }

    async fn renew_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        match self.live_entries(key).get_mut(key) {
            Some(entry) if entry.value == owner => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_if_owner(&self, key: &str, owner: &str) -> Result<bool> {
        self.check_available()?;
        let mut entries = self.live_entries(key);
        if entries.get(key).is_some_and(|entry| entry.value == owner) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}
