use crate::auth::codec::{Claims, TokenCodec, TokenKind};
use crate::auth::revocation::{RevocationError, RevocationStore};
use crate::config::AuthConfig;
use crate::error::AuthError;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and validates access/refresh token pairs.
///
/// Access tokens are validated by signature and expiry alone. Refresh tokens
/// additionally need a live record in the [`RevocationStore`].
pub struct TokenService {
    access: TokenCodec,
    refresh: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
    revocations: RevocationStore,
}

impl TokenService {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
        revocations: RevocationStore,
    ) -> Self {
        Self {
            access: TokenCodec::new(TokenKind::Access, access_secret),
            refresh: TokenCodec::new(TokenKind::Refresh, refresh_secret),
            access_ttl,
            refresh_ttl,
            revocations,
        }
    }

    pub fn from_config(config: &AuthConfig, revocations: RevocationStore) -> Self {
        Self::new(
            config.access_secret.as_bytes(),
            config.refresh_secret.as_bytes(),
            config.access_ttl(),
            config.refresh_ttl(),
            revocations,
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mints an access/refresh pair and records the refresh token.
    ///
    /// Fails as a whole when the revocation record cannot be written: a
    /// refresh token without a record could not be revoked.
    #[instrument(skip_all)]
    pub async fn issue_pair(&self, subject: &str) -> Result<TokenPair, AuthError> {
        let now = Utc::now().timestamp();
        let token_id = Uuid::new_v4().to_string();

        let access_claims = Claims {
            sub: subject.to_string(),
            kind: TokenKind::Access,
            iat: now,
            exp: expiry(now, self.access_ttl)?,
            jti: None,
        };
        let refresh_claims = Claims {
            sub: subject.to_string(),
            kind: TokenKind::Refresh,
            iat: now,
            exp: expiry(now, self.refresh_ttl)?,
            jti: Some(token_id.clone()),
        };

        let access_token = self.access.encode(&access_claims)?;
        let refresh_token = self.refresh.encode(&refresh_claims)?;

        self.revocations
            .record(&token_id, subject, self.refresh_ttl)
            .await
            .map_err(|e| {
                warn!(target: "identity.auth.tokens", error = %e, "Failed to record refresh token");
                AuthError::StoreUnavailable(e)
            })?;

        debug!(target: "identity.auth.tokens", subject = %subject, token_id = %token_id, "Issued token pair");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Stateless check: signature and expiry only.
    pub fn validate_access(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.access.decode(token)?;
        Ok(claims.sub)
    }

    #[instrument(skip_all)]
    pub async fn validate_refresh(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.refresh.decode(token)?;
        let token_id = claims.jti.as_deref().ok_or(AuthError::InvalidToken)?;

        self.revocations
            .check(token_id, &claims.sub)
            .await
            .map_err(from_revocation)?;

        Ok(claims.sub)
    }

    /// Validates a refresh token and spends its record in one step.
    ///
    /// Of several concurrent calls with the same token at most one succeeds,
    /// so a token can be exchanged for a new pair only once.
    #[instrument(skip_all)]
    pub async fn redeem_refresh(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.refresh.decode(token)?;
        let token_id = claims.jti.as_deref().ok_or(AuthError::InvalidToken)?;

        self.revocations
            .consume(token_id, &claims.sub)
            .await
            .map_err(from_revocation)?;

        debug!(target: "identity.auth.tokens", token_id = %token_id, "Refresh token redeemed");
        Ok(claims.sub)
    }

    /// Deletes the revocation record of a refresh token.
    ///
    /// Works on tokens past their expiry so stale tokens can still be cleaned
    /// up; the signature must verify.
    #[instrument(skip_all)]
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.refresh.decode_allow_expired(token)?;
        self.revoke_claims(&claims).await
    }

    /// Like [`revoke`](Self::revoke), but only for a token issued to `subject`.
    #[instrument(skip_all)]
    pub async fn revoke_for(&self, token: &str, subject: &str) -> Result<(), AuthError> {
        let claims = self.refresh.decode_allow_expired(token)?;
        if claims.sub != subject {
            debug!(target: "identity.auth.tokens", "Refusing to revoke another subject's token");
            return Err(AuthError::SubjectMismatch);
        }
        self.revoke_claims(&claims).await
    }

    async fn revoke_claims(&self, claims: &Claims) -> Result<(), AuthError> {
        let token_id = claims.jti.as_deref().ok_or(AuthError::InvalidToken)?;

        self.revocations.revoke(token_id).await?;
        debug!(target: "identity.auth.tokens", token_id = %token_id, "Refresh token revoked");
        Ok(())
    }
}

fn from_revocation(err: RevocationError) -> AuthError {
    match err {
        RevocationError::Revoked => AuthError::Revoked,
        RevocationError::Mismatch => AuthError::SubjectMismatch,
        RevocationError::Store(e) => AuthError::StoreUnavailable(e),
    }
}

/// `now + ttl` as a unix timestamp, refusing values that do not fit.
fn expiry(now: i64, ttl: Duration) -> Result<i64, AuthError> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(|secs| now.checked_add(secs))
        .ok_or_else(|| AuthError::Signing(format!("token lifetime {}s out of range", ttl.as_secs())))
}
