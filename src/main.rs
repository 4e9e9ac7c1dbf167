use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use identity_service::{health_check, rpc, AppError, AppState, Settings};
use std::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> identity_service::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging; RUST_LOG overrides the default level
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new()?;
    info!(environment = %config.environment, "Configuration loaded successfully");

    let state = AppState::new(config.clone()).await?;
    let data = web::Data::new(state.clone());

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!(
        "Serving {} at http://{}:{}",
        rpc::SERVICE_PATH,
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/health", web::get().to(health_check))
            .configure(rpc::configure)
    })
    .listen(listener)?
    .workers(config.server.workers.max(1) as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    info!("Server stopped, closing connections");
    state.shutdown().await
}
