//! Revocation ledger for refresh tokens.
//!
//! One record per issued refresh token: `refresh:<token id>` maps to the
//! subject it was issued to and lives exactly as long as the token. A missing
//! record means the token was revoked or has expired; the two are not
//! distinguished.

use crate::error::StoreError;
use crate::store::{with_deadline, KeyValueStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

const KEY_PREFIX: &str = "refresh:";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevocationError {
    #[error("token revoked or expired")]
    Revoked,

    #[error("token id is bound to a different subject")]
    Mismatch,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn record_key(token_id: &str) -> String {
    format!("{KEY_PREFIX}{token_id}")
}

#[derive(Clone)]
pub struct RevocationStore {
    store: Arc<dyn KeyValueStore>,
    op_timeout: Duration,
}

impl RevocationStore {
    pub fn new(store: Arc<dyn KeyValueStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    #[instrument(skip_all, fields(token_id = %token_id))]
    pub async fn record(&self, token_id: &str, subject: &str, ttl: Duration) -> Result<(), StoreError> {
        with_deadline(self.op_timeout, self.store.set(&record_key(token_id), subject, ttl)).await?;
        debug!(target: "identity.auth.revocation", "Recorded refresh token");
        Ok(())
    }

    #[instrument(skip_all, fields(token_id = %token_id))]
    pub async fn check(&self, token_id: &str, subject: &str) -> Result<(), RevocationError> {
        let stored = with_deadline(self.op_timeout, self.store.get(&record_key(token_id))).await?;
        match stored {
            None => Err(RevocationError::Revoked),
            Some(owner) if owner != subject => {
                debug!(target: "identity.auth.revocation", "Refresh token subject mismatch");
                Err(RevocationError::Mismatch)
            }
            Some(_) => Ok(()),
        }
    }

    /// Removes the record and checks it in one atomic step.
    ///
    /// A mismatched record is removed as well.
    #[instrument(skip_all, fields(token_id = %token_id))]
    pub async fn consume(&self, token_id: &str, subject: &str) -> Result<(), RevocationError> {
        let stored = with_deadline(self.op_timeout, self.store.take(&record_key(token_id))).await?;
        match stored {
            None => Err(RevocationError::Revoked),
            Some(owner) if owner != subject => {
                debug!(target: "identity.auth.revocation", "Refresh token subject mismatch");
                Err(RevocationError::Mismatch)
            }
            Some(_) => Ok(()),
        }
    }

    #[instrument(skip_all, fields(token_id = %token_id))]
    pub async fn revoke(&self, token_id: &str) -> Result<(), StoreError> {
        with_deadline(self.op_timeout, self.store.delete(&record_key(token_id))).await?;
        debug!(target: "identity.auth.revocation", "Revoked refresh token");
        Ok(())
    }
}
