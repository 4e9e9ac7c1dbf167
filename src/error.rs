use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// Classification surfaced to RPC callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcCode {
    Unauthenticated,
    InvalidArgument,
    ResourceExhausted,
    AlreadyExists,
    NotFound,
    Internal,
    Unavailable,
}

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcCode::Unauthenticated => "UNAUTHENTICATED",
            RpcCode::InvalidArgument => "INVALID_ARGUMENT",
            RpcCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            RpcCode::AlreadyExists => "ALREADY_EXISTS",
            RpcCode::NotFound => "NOT_FOUND",
            RpcCode::Internal => "INTERNAL",
            RpcCode::Unavailable => "UNAVAILABLE",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),
}

impl AppError {
    /// Maps every error onto the caller-visible taxonomy.
    pub fn code(&self) -> RpcCode {
        match self {
            AppError::AuthError(e) => e.code(),
            AppError::StoreError(_) => RpcCode::Unavailable,
            AppError::DatabaseError(DatabaseError::NotFound) => RpcCode::NotFound,
            AppError::DatabaseError(DatabaseError::Duplicate) => RpcCode::AlreadyExists,
            AppError::DatabaseError(DatabaseError::ConnectionError(_)) => RpcCode::Unavailable,
            AppError::DatabaseError(_) => RpcCode::Internal,
            AppError::ValidationError(_) => RpcCode::InvalidArgument,
            AppError::AlreadyExists(_) => RpcCode::AlreadyExists,
            AppError::UnknownMethod(_) => RpcCode::NotFound,
            AppError::ConfigError(_) | AppError::InternalError(_) => RpcCode::Internal,
        }
    }

    fn public_message(&self) -> String {
        match self.code() {
            // one message for every authentication failure, so callers can't tell
            // an expired token from a forged one
            RpcCode::Unauthenticated => "unauthenticated".to_string(),
            RpcCode::Internal => "internal error".to_string(),
            RpcCode::Unavailable => "service temporarily unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

// Implement conversion from sqlx::Error
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(DatabaseError::from(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::AuthError(AuthError::from(err))
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let response = json!({
            "error": {
                "code": self.code().as_str(),
                "message": self.public_message()
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self.code() {
            RpcCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            RpcCode::InvalidArgument => StatusCode::BAD_REQUEST,
            RpcCode::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            RpcCode::AlreadyExists => StatusCode::CONFLICT,
            RpcCode::NotFound => StatusCode::NOT_FOUND,
            RpcCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            RpcCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token revoked")]
    Revoked,

    #[error("Token subject mismatch")]
    SubjectMismatch,

    #[error("Rate limited")]
    RateLimited,

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl AuthError {
    pub fn code(&self) -> RpcCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::MissingCredentials
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::Revoked
            | AuthError::SubjectMismatch => RpcCode::Unauthenticated,
            AuthError::RateLimited => RpcCode::ResourceExhausted,
            AuthError::Signing(_) | AuthError::Hashing(_) => RpcCode::Internal,
            AuthError::StoreUnavailable(_) => RpcCode::Unavailable,
        }
    }
}

/// Failures of the token codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("malformed token")]
    Malformed,

    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidSignature | TokenError::Malformed => AuthError::InvalidToken,
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Signing(msg) => AuthError::Signing(msg),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => DatabaseError::Duplicate,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionError(err.to_string())
            }
            _ => DatabaseError::QueryError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let db_err = sqlx::Error::RowNotFound;
        let app_err: AppError = db_err.into();
        assert!(matches!(app_err, AppError::DatabaseError(DatabaseError::NotFound)));

        let app_err: AppError = TokenError::Expired.into();
        assert!(matches!(app_err, AppError::AuthError(AuthError::TokenExpired)));
    }

    #[test]
    fn test_error_codes() {
        for err in [
            AuthError::InvalidToken,
            AuthError::TokenExpired,
            AuthError::Revoked,
            AuthError::SubjectMismatch,
            AuthError::MissingCredentials,
            AuthError::InvalidCredentials,
        ] {
            assert_eq!(AppError::AuthError(err).code(), RpcCode::Unauthenticated);
        }

        let err = AppError::AuthError(AuthError::RateLimited);
        assert_eq!(err.code(), RpcCode::ResourceExhausted);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err = AppError::from(StoreError::Timeout(Duration::from_millis(250)));
        assert_eq!(err.code(), RpcCode::Unavailable);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::AuthError(AuthError::StoreUnavailable(StoreError::Unavailable("down".into())));
        assert_eq!(err.code(), RpcCode::Unavailable);

        let err = AppError::ValidationError("invalid input".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = AppError::DatabaseError(DatabaseError::Duplicate);
        assert_eq!(err.code(), RpcCode::AlreadyExists);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unauthenticated_message_is_generic() {
        let expired = AppError::AuthError(AuthError::TokenExpired);
        let forged = AppError::AuthError(AuthError::InvalidToken);
        assert_eq!(expired.public_message(), forged.public_message());
        assert_eq!(expired.public_message(), "unauthenticated");
    }

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert_eq!(err.to_string(), "Validation error: test error");

        let err = AppError::AuthError(AuthError::InvalidCredentials);
        assert_eq!(err.to_string(), "Authentication error: Invalid credentials");

        let err = AppError::DatabaseError(DatabaseError::NotFound);
        assert_eq!(err.to_string(), "Database error: Record not found");
    }
}
