//! Shared key-value store used by the revocation ledger and the login throttle.
//!
//! Every primitive is a single-key operation; nothing in the service needs a
//! multi-key transaction. Callers bound each call with [`with_deadline`] so a
//! slow backend surfaces as [`StoreError::Timeout`] instead of stalling the
//! calling task.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use crate::error::StoreError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Result of an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    /// Counter value after the increment.
    pub value: u64,
    /// True only for the call that brought the key into existence.
    pub created: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically increments the integer at `key`, creating it at 1 (without
    /// expiry) when absent.
    async fn increment(&self, key: &str) -> Result<Increment, StoreError>;

    /// Arms `ttl` on `key` unless it already carries one. Returns whether an
    /// expiry was set.
    async fn expire_if_no_ttl(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Atomically removes `key` and returns the value it held. Of several
    /// concurrent callers at most one sees `Some`.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Runs a store call under a deadline.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let result: Result<(), StoreError> = with_deadline(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(StoreError::Timeout(Duration::from_millis(100))));
    }

    #[tokio::test]
    async fn test_deadline_passes_through_result() {
        let ok = with_deadline(Duration::from_secs(1), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = with_deadline(Duration::from_secs(1), async {
            Err::<(), _>(StoreError::Unavailable("refused".into()))
        })
        .await;
        assert!(matches!(err, Err(StoreError::Unavailable(_))));
    }
}
