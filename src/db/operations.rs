use crate::db::models::{ProfileField, User};
use crate::error::DatabaseError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, avatar_url, language, \
     platform, device_id, registered_ip, user_agent, location, registered_at, updated_at";

/// User directory consumed by the user service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<User, DatabaseError>;

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    /// `None` clears the column.
    async fn update_field(
        &self,
        id: Uuid,
        field: ProfileField,
        value: Option<String>,
    ) -> Result<(), DatabaseError>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DatabaseError>;

    async fn delete_user(&self, id: Uuid) -> Result<(), DatabaseError>;
}

pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }

    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))
    }
}

#[async_trait]
impl UserRepository for DbOperations {
    async fn create_user(&self, user: &User) -> Result<User, DatabaseError> {
        let query = format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&query)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(&user.avatar_url)
            .bind(&user.language)
            .bind(&user.platform)
            .bind(&user.device_id)
            .bind(&user.registered_ip)
            .bind(&user.user_agent)
            .bind(&user.location)
            .bind(user.registered_at)
            .bind(user.updated_at)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(created)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(user)
    }

    async fn update_field(
        &self,
        id: Uuid,
        field: ProfileField,
        value: Option<String>,
    ) -> Result<(), DatabaseError> {
        // column names come from a closed enum, never from input
        let query = format!(
            "UPDATE users SET {} = $1, updated_at = $2 WHERE id = $3",
            field.column()
        );
        let result = sqlx::query(&query)
            .bind(value)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }
}
