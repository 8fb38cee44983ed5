//! Error types for the failover crate

use thiserror::Error;

/// Failures of the shared lock store or of the node as a whole.
///
/// Losing a lock race or finding another owner on renewal is not an error;
/// those come back as `Ok(false)` from the election operations.
#[derive(Error, Debug)]
pub enum FailoverError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store operation timed out after {0} ms")]
    StoreTimeout(u64),

    #[error("Redis operation error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failover node already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FailoverError {
    /// True for any failure to reach or use the store. A cycle that hits one
    /// of these assumes no ownership change happened and retries next tick.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            FailoverError::StoreUnavailable(_)
                | FailoverError::StoreTimeout(_)
                | FailoverError::Redis(_)
        )
    }
}

/// Failures of the downstream messaging resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Failed to open channel: {0}")]
    Channel(String),

    #[error("Broker operation timed out after {0} ms")]
    Timeout(u64),
}

pub type Result<T> = std::result::Result<T, FailoverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_unavailable_classification() {
        assert!(FailoverError::StoreUnavailable("down".into()).is_store_unavailable());
        assert!(FailoverError::StoreTimeout(3000).is_store_unavailable());
        assert!(!FailoverError::AlreadyRunning.is_store_unavailable());
        assert!(!FailoverError::Config("bad".into()).is_store_unavailable());
    }
}
