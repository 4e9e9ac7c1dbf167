//! Authentication and session lifecycle.
//!
//! Token issuance and validation, the refresh-token revocation ledger, the
//! per-call gate and the login throttle.

pub mod codec;
pub mod gate;
pub mod password;
pub mod rate_limit;
pub mod revocation;
mod service;

pub use codec::{Claims, TokenCodec, TokenKind};
pub use gate::{AuthGate, AuthenticatedSubject, CallIdentity, MethodPolicy};
pub use rate_limit::{LoginThrottle, RateLimitConfig, ThrottleDecision};
pub use revocation::{RevocationError, RevocationStore};
pub use service::{TokenPair, TokenService};
