//! Process role and identity

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

/// Role of this process in the active/standby pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Standby,
    Active,
}

impl Role {
    fn as_u8(self) -> u8 {
        match self {
            Role::Standby => 0,
            Role::Active => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Role::Active,
            _ => Role::Standby,
        }
    }

    pub fn is_active(self) -> bool {
        self == Role::Active
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Standby => f.write_str("STANDBY"),
            Role::Active => f.write_str("ACTIVE"),
        }
    }
}

/// Shared storage for the current role.
///
/// Reads are a single atomic load so the heartbeat loop never sees a torn
/// value. Writes go through [`RoleStateMachine`](crate::RoleStateMachine)
/// only; observers that want to await a change use [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct RoleCell {
    role: AtomicU8,
    changes: watch::Sender<Role>,
}

impl RoleCell {
    pub fn new() -> Self {
        Self {
            role: AtomicU8::new(Role::Standby.as_u8()),
            changes: watch::Sender::new(Role::Standby),
        }
    }

    pub fn get(&self) -> Role {
        Role::from_u8(self.role.load(Ordering::SeqCst))
    }

    pub fn is_active(&self) -> bool {
        self.get().is_active()
    }

    /// Store `role`, returning the previous value.
    pub(crate) fn set(&self, role: Role) -> Role {
        let previous = Role::from_u8(self.role.swap(role.as_u8(), Ordering::SeqCst));
        self.changes.send_replace(role);
        previous
    }

    pub fn subscribe(&self) -> watch::Receiver<Role> {
        self.changes.subscribe()
    }
}

impl Default for RoleCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Globally unique token naming this process as a lock owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceIdentity(String);

impl InstanceIdentity {
    /// Fresh random identity, generated once at process start.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use an operator-supplied id, falling back to a random one when blank.
    pub fn from_configured(id: &str) -> Self {
        let id = id.trim();
        if id.is_empty() {
            Self::generate()
        } else {
            Self(id.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
