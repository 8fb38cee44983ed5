//! Role state machine
//!
//! Two states, STANDBY (initial) and ACTIVE, with no terminal state:
//!
//! - STANDBY -> ACTIVE: connect the resource first, flip the role only once
//!   the connect succeeded. A connect error leaves the role untouched.
//! - ACTIVE -> STANDBY: disconnect the resource (best effort), then flip.
//!
//! Both resource calls are bounded by a timeout. A connect that runs past it
//! counts as failed; a disconnect that runs past it is abandoned and the
//! role flips anyway. Requests for the state already held are no-ops.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::ResourceError;
use crate::resource::ResourceLifecycle;
use crate::role::{InstanceIdentity, Role, RoleCell};

/// Result of a transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Promoted,
    Demoted,
    Unchanged,
}

pub struct RoleStateMachine {
    identity: InstanceIdentity,
    role: Arc<RoleCell>,
    resource: Arc<dyn ResourceLifecycle>,
    timeout: Duration,
}

impl RoleStateMachine {
    pub fn new(
        identity: InstanceIdentity,
        role: Arc<RoleCell>,
        resource: Arc<dyn ResourceLifecycle>,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            role,
            resource,
            timeout,
        }
    }

    pub fn role(&self) -> Role {
        self.role.get()
    }

    pub fn resource(&self) -> &Arc<dyn ResourceLifecycle> {
        &self.resource
    }

    /// STANDBY -> ACTIVE.
    pub async fn promote(&self) -> Result<Transition, ResourceError> {
        if self.role.is_active() {
            return Ok(Transition::Unchanged);
        }

        let connected = match tokio::time::timeout(self.timeout, self.resource.connect()).await {
            Ok(result) => result,
            Err(_) => Err(ResourceError::Timeout(self.timeout.as_millis() as u64)),
        };

        if let Err(e) = connected {
            error!(
                instance_id = %self.identity,
                error = %e,
                "Resource connect failed, staying STANDBY"
            );
            return Err(e);
        }

        self.role.set(Role::Active);
        info!(instance_id = %self.identity, "Promoted to ACTIVE");
        Ok(Transition::Promoted)
    }

    /// ACTIVE -> STANDBY. Never fails: a stuck disconnect must not keep a
    /// node that already lost the lock advertising itself as active.
    pub async fn demote(&self) -> Transition {
        if !self.role.is_active() {
            return Transition::Unchanged;
        }

        if tokio::time::timeout(self.timeout, self.resource.disconnect())
            .await
            .is_err()
        {
            error!(
                instance_id = %self.identity,
                timeout_ms = self.timeout.as_millis() as u64,
                "Resource disconnect timed out, abandoning it"
            );
        } else if self.resource.is_connected() {
            warn!(instance_id = %self.identity, "Resource still reports connected after disconnect");
        }

        self.role.set(Role::Standby);
        warn!(instance_id = %self.identity, "Demoted to STANDBY");
        Transition::Demoted
    }
}
