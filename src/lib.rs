pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod geo;
pub mod rpc;
pub mod store;
pub mod users;

use actix_web::HttpResponse;
use std::sync::Arc;
use tracing::info;

pub use config::Settings;
pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;

use auth::{AuthGate, LoginThrottle, RateLimitConfig, RevocationStore, TokenService};
use config::StoreBackend;
use db::{DbOperations, UserRepository};
use events::{ChannelEventPublisher, EventPublisher, LogSink};
use geo::{GeoLocator, IpApiLocator, NoopLocator};
use store::{KeyValueStore, MemoryStore, RedisStore};
use users::UserService;

/// Health check endpoint handler
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub tokens: Arc<TokenService>,
    pub gate: Arc<AuthGate>,
    pub users: Arc<UserService>,
    db: Option<Arc<DbOperations>>,
}

impl AppState {
    /// Connects to Postgres and the configured key-value store, runs
    /// migrations and starts the event delivery task.
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            std::time::Duration::from_secs(5),
        )
        .await?;
        db.run_migrations().await?;
        let db = Arc::new(db);

        let store: Arc<dyn KeyValueStore> = match config.store.backend {
            StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis.url).await?),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let (publisher, _delivery) = ChannelEventPublisher::spawn(config.events.buffer, Arc::new(LogSink));

        let geo: Arc<dyn GeoLocator> = if config.geo.enabled {
            Arc::new(IpApiLocator::from_config(&config.geo)?)
        } else {
            Arc::new(NoopLocator)
        };

        info!(
            store = ?config.store.backend,
            geo = config.geo.enabled,
            "Application state initialized"
        );

        let mut state = Self::from_parts(config, db.clone(), store, Arc::new(publisher), geo);
        state.db = Some(db);
        Ok(state)
    }

    /// Assembles the state from already-built collaborators.
    pub fn from_parts(
        config: Settings,
        repo: Arc<dyn UserRepository>,
        store: Arc<dyn KeyValueStore>,
        events: Arc<dyn EventPublisher>,
        geo: Arc<dyn GeoLocator>,
    ) -> Self {
        let op_timeout = config.store.operation_timeout();
        let revocations = RevocationStore::new(store.clone(), op_timeout);
        let tokens = Arc::new(TokenService::from_config(&config.auth, revocations));
        let throttle = Arc::new(LoginThrottle::new(
            store,
            RateLimitConfig {
                limit: config.throttle.limit,
                window: config.throttle.window(),
            },
            op_timeout,
        ));
        let gate = Arc::new(AuthGate::new(tokens.clone()));
        let users = Arc::new(UserService::new(
            repo,
            tokens.clone(),
            throttle,
            events,
            geo,
            config.auth.bcrypt_cost,
        ));

        Self {
            config: Arc::new(config),
            tokens,
            gate,
            users,
            db: None,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.pool().close().await;
        }
        Ok(())
    }
}
