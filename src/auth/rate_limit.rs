use crate::error::StoreError;
use crate::store::{with_deadline, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const KEY_PREFIX: &str = "login_attempts:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 5,  // 5 attempts per window
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed { remaining: u32 },
    Blocked,
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed { .. })
    }
}

pub fn attempts_key(login_key: &str) -> String {
    format!("{KEY_PREFIX}{login_key}")
}

/// Fixed-window attempt counter per login key.
///
/// The window is armed by the first attempt and never extended by later ones,
/// so a key is unblocked one window after its first attempt. Every attempt
/// re-checks the expiry, so a counter left without one after a failed arm is
/// picked up by the next attempt.
#[derive(Clone)]
pub struct LoginThrottle {
    store: Arc<dyn KeyValueStore>,
    config: RateLimitConfig,
    op_timeout: Duration,
}

impl LoginThrottle {
    pub fn new(store: Arc<dyn KeyValueStore>, config: RateLimitConfig, op_timeout: Duration) -> Self {
        Self {
            store,
            config,
            op_timeout,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Counts an attempt against the configured limit and window.
    pub async fn check(&self, login_key: &str) -> Result<ThrottleDecision, StoreError> {
        self.allow(login_key, self.config.limit, self.config.window).await
    }

    #[instrument(skip_all, fields(limit = limit))]
    pub async fn allow(
        &self,
        login_key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<ThrottleDecision, StoreError> {
        let key = attempts_key(login_key);

        let attempt = with_deadline(self.op_timeout, self.store.increment(&key)).await?;
        // never extends a live window; re-arms a counter whose first arm was lost
        let armed = with_deadline(self.op_timeout, self.store.expire_if_no_ttl(&key, window)).await?;
        if armed && !attempt.created {
            warn!(target: "identity.auth.throttle", attempts = attempt.value, "Re-armed attempt window on orphaned counter");
        }

        if attempt.value > u64::from(limit) {
            warn!(target: "identity.auth.throttle", attempts = attempt.value, "Login attempts exceeded limit");
            return Ok(ThrottleDecision::Blocked);
        }

        let remaining = limit - attempt.value as u32;
        debug!(target: "identity.auth.throttle", remaining, "Login attempt allowed");
        Ok(ThrottleDecision::Allowed { remaining })
    }
}
