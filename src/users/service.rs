use crate::auth::password::{hash_password, verify_password};
use crate::auth::{AuthenticatedSubject, LoginThrottle, ThrottleDecision, TokenPair, TokenService};
use crate::db::{NewUser, ProfileField, User, UserRepository};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::events::{EventPublisher, UserEvent};
use crate::geo::GeoLocator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Caller metadata captured by the transport.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl AuthResult {
    fn new(tokens: TokenPair, user: User) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user,
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationError(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Registration, login and profile operations on top of the token core.
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    throttle: Arc<LoginThrottle>,
    events: Arc<dyn EventPublisher>,
    geo: Arc<dyn GeoLocator>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        throttle: Arc<LoginThrottle>,
        events: Arc<dyn EventPublisher>,
        geo: Arc<dyn GeoLocator>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            repo,
            tokens,
            throttle,
            events,
            geo,
            bcrypt_cost,
        }
    }

    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest, client: ClientInfo) -> Result<AuthResult, AppError> {
        let email = normalize_email(&req.email);
        require("username", &req.username)?;
        require("email", &email)?;
        require("password", &req.password)?;

        if self.repo.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::AlreadyExists("email already registered".into()));
        }

        let password_hash = hash_password(&req.password, self.bcrypt_cost)?;
        let location = match client.ip.as_deref() {
            Some(ip) => self.geo.locate(ip).await,
            None => None,
        };

        let user = User::new(NewUser {
            username: req.username.trim().to_string(),
            email,
            password_hash,
            full_name: non_empty(req.full_name),
            avatar_url: non_empty(req.avatar_url),
            language: non_empty(req.language),
            platform: req.platform,
            device_id: req.device_id,
            registered_ip: client.ip,
            user_agent: client.user_agent,
            location,
        });

        // a concurrent registration can still win the unique index
        let user = self.repo.create_user(&user).await.map_err(|e| match e {
            DatabaseError::Duplicate => AppError::AlreadyExists("email already registered".into()),
            other => AppError::DatabaseError(other),
        })?;

        self.events.publish(UserEvent::UserRegistered {
            user_id: user.id.to_string(),
            email: user.email.clone(),
            username: user.username.clone(),
        });

        let tokens = self.tokens.issue_pair(&user.id.to_string()).await?;
        info!(target: "identity.users", user_id = %user.id, "User registered");
        Ok(AuthResult::new(tokens, user))
    }

    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResult, AppError> {
        let email = normalize_email(&req.email);
        require("email", &email)?;
        require("password", &req.password)?;

        match self.throttle.check(&email).await.map_err(AuthError::from)? {
            ThrottleDecision::Blocked => return Err(AuthError::RateLimited.into()),
            ThrottleDecision::Allowed { .. } => {}
        }

        // unknown email and wrong password are indistinguishable to the caller
        let user = self
            .repo
            .get_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&req.password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.tokens.issue_pair(&user.id.to_string()).await?;

        self.events.publish(UserEvent::UserLoggedIn {
            user_id: user.id.to_string(),
            platform: req.platform,
            device_id: req.device_id,
        });
        info!(target: "identity.users", user_id = %user.id, "User logged in");
        Ok(AuthResult::new(tokens, user))
    }

    /// Exchanges a live refresh token for a new pair.
    ///
    /// The presented token is spent before the new pair is minted, so it can
    /// be exchanged only once even under concurrent calls.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResult, AppError> {
        require("refresh_token", refresh_token)?;
        let subject = self.tokens.redeem_refresh(refresh_token).await?;

        let user_id = Uuid::parse_str(&subject).map_err(|_| AuthError::InvalidToken)?;
        let user = self.repo.get_user_by_id(user_id).await?.ok_or_else(|| {
            warn!(target: "identity.users", user_id = %user_id, "Refresh for unknown user");
            AuthError::InvalidToken
        })?;

        let tokens = self.tokens.issue_pair(&subject).await?;
        Ok(AuthResult::new(tokens, user))
    }

    /// Revokes a refresh token belonging to the caller.
    #[instrument(skip_all)]
    pub async fn logout(&self, subject: &AuthenticatedSubject, refresh_token: &str) -> Result<(), AppError> {
        require("refresh_token", refresh_token)?;
        self.tokens.revoke_for(refresh_token, subject.user_id()).await?;
        info!(target: "identity.users", user_id = %subject.user_id(), "User logged out");
        Ok(())
    }

    pub async fn get_profile(&self, subject: &AuthenticatedSubject) -> Result<User, AppError> {
        let id = Self::user_id(subject)?;
        self.repo
            .get_user_by_id(id)
            .await?
            .ok_or(AppError::DatabaseError(DatabaseError::NotFound))
    }

    /// Updates one profile field and returns the fresh record.
    ///
    /// An empty avatar clears it; every other field is required.
    #[instrument(skip_all, fields(field = field.column()))]
    pub async fn update_profile(
        &self,
        subject: &AuthenticatedSubject,
        field: ProfileField,
        value: &str,
    ) -> Result<User, AppError> {
        let id = Self::user_id(subject)?;
        let value = match field {
            ProfileField::AvatarUrl => non_empty(Some(value.to_string())),
            ProfileField::Email => {
                let email = normalize_email(value);
                require(field.column(), &email)?;
                Some(email)
            }
            _ => {
                require(field.column(), value)?;
                Some(value.trim().to_string())
            }
        };

        self.repo.update_field(id, field, value).await.map_err(|e| match e {
            DatabaseError::Duplicate => AppError::AlreadyExists(format!("{} already in use", field.column())),
            other => AppError::DatabaseError(other),
        })?;
        self.get_profile(subject).await
    }

    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        subject: &AuthenticatedSubject,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        require("new_password", new_password)?;
        let user = self.get_profile(subject).await?;

        if !verify_password(old_password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }

        let hash = hash_password(new_password, self.bcrypt_cost)?;
        self.repo.update_password(user.id, &hash).await?;
        info!(target: "identity.users", user_id = %user.id, "Password changed");
        Ok(())
    }

    pub async fn delete_account(&self, subject: &AuthenticatedSubject) -> Result<(), AppError> {
        let id = Self::user_id(subject)?;
        self.repo.delete_user(id).await?;
        info!(target: "identity.users", user_id = %id, "Account deleted");
        Ok(())
    }

    fn user_id(subject: &AuthenticatedSubject) -> Result<Uuid, AppError> {
        Uuid::parse_str(subject.user_id()).map_err(|_| AuthError::InvalidToken.into())
    }
}
