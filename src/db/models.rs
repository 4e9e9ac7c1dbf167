use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub language: Option<String>,
    pub platform: String,
    pub device_id: String,
    pub registered_ip: Option<String>,
    pub user_agent: String,
    pub location: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied at registration, after normalisation.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub language: Option<String>,
    pub platform: String,
    pub device_id: String,
    pub registered_ip: Option<String>,
    pub user_agent: String,
    pub location: Option<String>,
}

impl User {
    pub fn new(new_user: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            full_name: new_user.full_name,
            avatar_url: new_user.avatar_url,
            language: new_user.language,
            platform: new_user.platform,
            device_id: new_user.device_id,
            registered_ip: new_user.registered_ip,
            user_agent: new_user.user_agent,
            location: new_user.location,
            registered_at: now,
            updated_at: now,
        }
    }
}

/// Profile columns that can be updated one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Username,
    Email,
    FullName,
    AvatarUrl,
    Language,
}

impl ProfileField {
    pub fn column(&self) -> &'static str {
        match self {
            ProfileField::Username => "username",
            ProfileField::Email => "email",
            ProfileField::FullName => "full_name",
            ProfileField::AvatarUrl => "avatar_url",
            ProfileField::Language => "language",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new(NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$2b$04$secret".into(),
            ..Default::default()
        });
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(user.registered_at, user.updated_at);
    }
}
