use crate::error::AuthError;
use tracing::instrument;

#[instrument(skip_all)]
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Returns `Ok(false)` on a mismatch; errors only for an unreadable hash.
#[instrument(skip_all)]
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Hashing(e.to_string()))
}
