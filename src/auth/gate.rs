//! Per-call authentication gate.
//!
//! Every inbound call is checked against a method policy table before it is
//! dispatched. Public methods pass without looking at credentials; protected
//! methods need a valid access token in the `authorization` metadata.
//!
//! # Security
//!
//! - Policy lookup is an exact match on the method name. A method that merely
//!   contains a public method's name (`GetLoginHistory`) stays protected.
//! - Methods missing from the table are protected.
//! - Every failure is reported as the same `Unauthenticated` error; the
//!   reason (missing, malformed, expired, bad signature) is only logged.

use crate::auth::codec::MAX_TOKEN_SIZE_BYTES;
use crate::auth::service::TokenService;
use crate::error::AuthError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const AUTHORIZATION_HEADER: &str = "authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodPolicy {
    Public,
    Protected,
}

/// Methods callable without credentials.
pub const PUBLIC_METHODS: &[&str] = &["Register", "Login", "RefreshToken"];

/// Identity resolved for a call by the gate.
///
/// Only the gate constructs it, and handlers look it up by type, so it cannot
/// collide with unrelated request-scoped values.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject(String);

impl AuthenticatedSubject {
    pub(crate) fn new(subject: String) -> Self {
        Self(subject)
    }

    pub fn user_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthenticatedSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthenticatedSubject").field(&self.0).finish()
    }
}

/// Outcome of a successful gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallIdentity {
    Anonymous,
    Authenticated(AuthenticatedSubject),
}

impl CallIdentity {
    pub fn subject(&self) -> Option<&AuthenticatedSubject> {
        match self {
            CallIdentity::Anonymous => None,
            CallIdentity::Authenticated(subject) => Some(subject),
        }
    }
}

/// Extracts the token from a `Bearer <token>` value.
///
/// The scheme is case-sensitive; an empty or oversized token counts as absent.
pub fn bearer_token(value: &str) -> Option<&str> {
    let token = value.strip_prefix("Bearer ")?;
    if token.is_empty() || token.len() > MAX_TOKEN_SIZE_BYTES {
        return None;
    }
    Some(token)
}

pub struct AuthGate {
    tokens: Arc<TokenService>,
    policies: HashMap<String, MethodPolicy>,
}

impl AuthGate {
    /// Gate for the user service: [`PUBLIC_METHODS`] are public, everything
    /// else is protected.
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self::with_policies(
            tokens,
            PUBLIC_METHODS.iter().map(|m| (m.to_string(), MethodPolicy::Public)),
        )
    }

    pub fn with_policies<I>(tokens: Arc<TokenService>, policies: I) -> Self
    where
        I: IntoIterator<Item = (String, MethodPolicy)>,
    {
        Self {
            tokens,
            policies: policies.into_iter().collect(),
        }
    }

    pub fn policy(&self, method: &str) -> MethodPolicy {
        self.policies
            .get(method)
            .copied()
            .unwrap_or(MethodPolicy::Protected)
    }

    /// Decides whether `method` may proceed given the raw `authorization`
    /// metadata value, if any.
    #[instrument(skip_all, name = "identity.auth.gate", fields(method = %method))]
    pub fn authorize(&self, method: &str, authorization: Option<&str>) -> Result<CallIdentity, AuthError> {
        if self.policy(method) == MethodPolicy::Public {
            return Ok(CallIdentity::Anonymous);
        }

        let token = authorization.and_then(bearer_token).ok_or_else(|| {
            debug!(target: "identity.auth.gate", "Missing or malformed bearer credential");
            AuthError::MissingCredentials
        })?;

        let subject = self.tokens.validate_access(token).map_err(|e| {
            debug!(target: "identity.auth.gate", error = %e, "Access token rejected");
            e
        })?;

        Ok(CallIdentity::Authenticated(AuthenticatedSubject::new(subject)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::revocation::RevocationStore;
    use crate::error::RpcCode;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn tokens() -> Arc<TokenService> {
        Arc::new(TokenService::new(
            b"access-secret",
            b"refresh-secret",
            Duration::from_secs(900),
            Duration::from_secs(3600),
            RevocationStore::new(Arc::new(MemoryStore::new()), Duration::from_millis(200)),
        ))
    }

    #[test]
    fn test_public_method_needs_no_credential() {
        let gate = AuthGate::new(tokens());
        assert_eq!(gate.authorize("Register", None).unwrap(), CallIdentity::Anonymous);
        assert_eq!(gate.authorize("Login", Some("garbage")).unwrap(), CallIdentity::Anonymous);
    }

    #[test]
    fn test_protected_method_without_credential() {
        let gate = AuthGate::new(tokens());
        let err = gate.authorize("GetProfile", None).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials));
        assert_eq!(err.code(), RpcCode::Unauthenticated);
    }

    #[test]
    fn test_policy_is_exact_match() {
        let gate = AuthGate::new(tokens());
        assert_eq!(gate.policy("Login"), MethodPolicy::Public);
        assert_eq!(gate.policy("GetLoginHistory"), MethodPolicy::Protected);
        assert_eq!(gate.policy("RegisterDevice"), MethodPolicy::Protected);
        assert_eq!(gate.policy("login"), MethodPolicy::Protected);
        assert_eq!(gate.policy("Unknown"), MethodPolicy::Protected);
    }

    #[tokio::test]
    async fn test_valid_token_resolves_subject() {
        let tokens = tokens();
        let gate = AuthGate::new(tokens.clone());
        let pair = tokens.issue_pair("u-1").await.unwrap();

        let header = format!("Bearer {}", pair.access_token);
        let identity = gate.authorize("GetProfile", Some(&header)).unwrap();
        assert_eq!(identity.subject().map(|s| s.user_id()), Some("u-1"));
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_credential() {
        let tokens = tokens();
        let gate = AuthGate::new(tokens.clone());
        let pair = tokens.issue_pair("u-1").await.unwrap();

        let header = format!("Bearer {}", pair.refresh_token);
        let err = gate.authorize("GetProfile", Some(&header)).unwrap_err();
        assert_eq!(err.code(), RpcCode::Unauthenticated);
    }

    #[test]
    fn test_invalid_token_rejected() {
        let gate = AuthGate::new(tokens());
        let err = gate.authorize("GetProfile", Some("Bearer not.a.jwt")).unwrap_err();
        assert_eq!(err.code(), RpcCode::Unauthenticated);
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("bearer abc123"), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token(&format!("Bearer {}", "a".repeat(MAX_TOKEN_SIZE_BYTES + 1))), None);
    }

    #[test]
    fn test_custom_policy_table() {
        let gate = AuthGate::with_policies(
            tokens(),
            [("Ping".to_string(), MethodPolicy::Public)],
        );
        assert_eq!(gate.policy("Ping"), MethodPolicy::Public);
        assert_eq!(gate.policy("Login"), MethodPolicy::Protected);
    }
}
