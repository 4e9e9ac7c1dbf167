use super::{Increment, KeyValueStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process store for tests and single-node development.
///
/// Expiry follows `tokio::time`, so paused-clock tests can advance through a
/// TTL deterministically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time to live, `None` if absent or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at - now)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<Increment, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(key).filter(|e| e.is_live(now)) {
            let current: u64 = entry.value.parse().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                reason: "value is not an integer".into(),
            })?;
            let value = current + 1;
            entry.value = value.to_string();
            return Ok(Increment { value, created: false });
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: "1".to_string(),
                expires_at: None,
            },
        );
        Ok(Increment { value: 1, created: true })
    }

    async fn expire_if_no_ttl(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) && entry.expires_at.is_none() => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).filter(|e| e.is_live(now)).map(|e| e.value))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_set_get_expires() {
        let store = MemoryStore::new();
        store.set("refresh:abc", "u-1", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("refresh:abc").await.unwrap().as_deref(), Some("u-1"));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.get("refresh:abc").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_increment_reports_creation() {
        let store = MemoryStore::new();
        let first = store.increment("login_attempts:alice").await.unwrap();
        let second = store.increment("login_attempts:alice").await.unwrap();

        assert_eq!(first, Increment { value: 1, created: true });
        assert_eq!(second, Increment { value: 2, created: false });
    }

    #[tokio::test]
    async fn test_concurrent_increments_single_creator() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.increment("counter").await.unwrap() }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.get("counter").await.unwrap().as_deref(), Some("32"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_if_no_ttl_keeps_existing_ttl() {
        let store = MemoryStore::new();
        store.increment("counter").await.unwrap();

        assert!(store.expire_if_no_ttl("counter", Duration::from_secs(60)).await.unwrap());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!store.expire_if_no_ttl("counter", Duration::from_secs(60)).await.unwrap());
        assert_eq!(store.ttl("counter").await, Some(Duration::from_secs(30)));

        assert!(!store.expire_if_no_ttl("missing", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("k", "not-a-number", Duration::from_secs(5)).await.unwrap();
        assert!(matches!(store.increment("k").await, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_take_single_winner() {
        let store = Arc::new(MemoryStore::new());
        store.set("refresh:abc", "u-1", Duration::from_secs(60)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.take("refresh:abc").await.unwrap() }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            winners.extend(handle.await.unwrap());
        }
        assert_eq!(winners, vec!["u-1".to_string()]);
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_ignores_expired() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(5)).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
