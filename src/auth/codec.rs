//! Signing and verification of token claim sets.
//!
//! Tokens are HMAC-signed JWTs. Access and refresh tokens use distinct
//! secrets, so a token of one kind never verifies as the other. Verification
//! only accepts the HMAC family; a header naming any other algorithm is
//! rejected before the signature is considered.

use crate::error::TokenError;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Signing algorithm used for newly issued tokens.
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Tokens larger than this are rejected without parsing.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Subject (user id)
    pub kind: TokenKind,
    pub iat: i64,     // Issued at
    pub exp: i64,     // Expiration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,  // Refresh tokens only
}

impl Claims {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// Stateless signer/verifier for one token kind.
#[derive(Clone)]
pub struct TokenCodec {
    kind: TokenKind,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(kind: TokenKind, secret: &[u8]) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // expiry is checked by `decode` itself so that `exp == now` counts as expired
        // and `decode_allow_expired` can still read stale tokens
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("exp".to_string());

        Self {
            kind,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verifies signature, algorithm family, token kind and expiry.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode_allow_expired(token)?;
        if claims.is_expired_at(Utc::now().timestamp()) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Like [`decode`](Self::decode) but accepts tokens past their `exp`.
    pub fn decode_allow_expired(&self, token: &str) -> Result<Claims, TokenError> {
        if token.is_empty() || token.len() > MAX_TOKEN_SIZE_BYTES {
            return Err(TokenError::Malformed);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            }
        })?;

        if data.claims.kind != self.kind {
            return Err(TokenError::Malformed);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(kind: TokenKind, exp_offset: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: "u-1".to_string(),
            kind,
            iat: now,
            exp: now + exp_offset,
            jti: None,
        }
    }

    #[test]
    fn test_encode_decode() {
        let codec = TokenCodec::new(TokenKind::Access, b"access-secret");
        let original = claims(TokenKind::Access, 900);
        let token = codec.encode(&original).unwrap();

        assert_eq!(codec.decode(&token).unwrap(), original);
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = TokenCodec::new(TokenKind::Access, b"access-secret");
        let token = codec.encode(&claims(TokenKind::Access, -10)).unwrap();

        assert_eq!(codec.decode(&token), Err(TokenError::Expired));
        // still readable for cleanup
        assert_eq!(codec.decode_allow_expired(&token).unwrap().sub, "u-1");
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        let c = claims(TokenKind::Access, 0);
        assert!(c.is_expired_at(c.exp));
        assert!(!c.is_expired_at(c.exp - 1));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = TokenCodec::new(TokenKind::Access, b"attacker-secret");
        let verifier = TokenCodec::new(TokenKind::Access, b"access-secret");
        let token = signer.encode(&claims(TokenKind::Access, 900)).unwrap();

        assert_eq!(verifier.decode(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_wrong_secret_checked_before_expiry() {
        let signer = TokenCodec::new(TokenKind::Access, b"attacker-secret");
        let verifier = TokenCodec::new(TokenKind::Access, b"access-secret");
        let token = signer.encode(&claims(TokenKind::Access, -10)).unwrap();

        assert_eq!(verifier.decode(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_non_hmac_algorithm_rejected() {
        let verifier = TokenCodec::new(TokenKind::Access, b"access-secret");
        // {"alg":"none","typ":"JWT"} with a valid payload and empty signature
        let header = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0";
        let payload = "eyJzdWIiOiJ1LTEiLCJraW5kIjoiYWNjZXNzIiwiaWF0IjoxLCJleHAiOjk5OTk5OTk5OTl9";
        let token = format!("{header}.{payload}.");

        assert!(verifier.decode(&token).is_err());

        // {"alg":"RS256","typ":"JWT"}
        let rs_header = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9";
        let token = format!("{rs_header}.{payload}.c2ln");
        assert_eq!(verifier.decode(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let codec = TokenCodec::new(TokenKind::Refresh, b"shared");
        let token = TokenCodec::new(TokenKind::Access, b"shared")
            .encode(&claims(TokenKind::Access, 900))
            .unwrap();

        assert_eq!(codec.decode(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = TokenCodec::new(TokenKind::Access, b"access-secret");
        assert_eq!(codec.decode("not.a.jwt"), Err(TokenError::Malformed));
        assert_eq!(codec.decode(""), Err(TokenError::Malformed));
        assert_eq!(codec.decode(&"a".repeat(MAX_TOKEN_SIZE_BYTES + 1)), Err(TokenError::Malformed));
    }

    #[test]
    fn test_debug_hides_keys() {
        let codec = TokenCodec::new(TokenKind::Access, b"access-secret");
        let debug = format!("{:?}", codec);
        assert!(debug.contains("Access"));
        assert!(!debug.contains("access-secret"));
    }
}
