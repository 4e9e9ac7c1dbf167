use super::{Increment, KeyValueStore};
use crate::error::StoreError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Sets a TTL only when the key exists and has none.
///
/// KEYS[1]: key, ARGV[1]: ttl in milliseconds. Returns 1 when armed, 0 otherwise.
const EXPIRE_IF_NO_TTL: &str = r#"
if redis.call('PTTL', KEYS[1]) == -1 then
    return redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return 0
"#;

/// Redis-backed store.
///
/// Cheap to clone; the multiplexed connection is shared by all clones and is
/// cloned per command rather than locked.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    expire_if_no_ttl_script: Script,
}

fn ttl_millis(ttl: Duration) -> u64 {
    // Redis rejects a zero expiry
    (ttl.as_millis() as u64).max(1)
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            // the url may carry a password; log the error only
            error!(target: "identity.store.redis", error = %e, "Failed to open Redis client");
            StoreError::Unavailable(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "identity.store.redis", error = %e, "Failed to connect to Redis");
                StoreError::Unavailable(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            expire_if_no_ttl_script: Script::new(EXPIRE_IF_NO_TTL),
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| {
            warn!(target: "identity.store.redis", error = %e, "GET failed");
            StoreError::from(e)
        })?;
        Ok(value)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
            .await
            .map_err(|e| {
                warn!(target: "identity.store.redis", error = %e, "PSETEX failed");
                StoreError::from(e)
            })
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn increment(&self, key: &str) -> Result<Increment, StoreError> {
        let mut conn = self.connection.clone();
        let value: i64 = conn.incr(key, 1).await.map_err(|e| {
            warn!(target: "identity.store.redis", error = %e, "INCR failed");
            StoreError::from(e)
        })?;

        // INCR is atomic, so exactly one caller observes the key at 1
        let value = u64::try_from(value).map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("negative counter {value}"),
        })?;
        Ok(Increment { value, created: value == 1 })
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn expire_if_no_ttl(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let armed: i64 = self
            .expire_if_no_ttl_script
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(target: "identity.store.redis", error = %e, "expire-if-no-ttl script failed");
                StoreError::from(e)
            })?;
        Ok(armed == 1)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get_del(key).await.map_err(|e| {
            warn!(target: "identity.store.redis", error = %e, "GETDEL failed");
            StoreError::from(e)
        })?;
        Ok(value)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await.map_err(|e| {
            warn!(target: "identity.store.redis", error = %e, "DEL failed");
            StoreError::from(e)
        })
    }
}
