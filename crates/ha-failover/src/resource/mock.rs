use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::ResourceLifecycle;
use crate::error::ResourceError;
use crate::role::{Role, RoleCell};

/// In-memory resource that records lifecycle calls, for local runs and tests.
#[derive(Default)]
pub struct MockResource {
    connected: AtomicBool,
    fail_connect: AtomicBool,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
    role_observer: Mutex<Option<Arc<RoleCell>>>,
    roles_at_disconnect: Mutex<Vec<Role>>,
}

impl MockResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail (or succeed again).
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Record the role held in `cell` each time `disconnect` runs.
    pub fn observe_role(&self, cell: Arc<RoleCell>) {
        *self.role_observer.lock() = Some(cell);
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn roles_at_disconnect(&self) -> Vec<Role> {
        self.roles_at_disconnect.lock().clone()
    }
}

#[async_trait]
impl ResourceLifecycle for MockResource {
    async fn connect(&self) -> Result<(), ResourceError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ResourceError::Connection("mock broker unreachable".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        info!("Mock resource connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(cell) = self.role_observer.lock().as_ref() {
            self.roles_at_disconnect.lock().push(cell.get());
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Mock resource disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
