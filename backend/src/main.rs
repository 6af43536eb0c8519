//! Halal Certification Platform - Backend Server
//!
//! Accepts certification applications from food businesses, drives them
//! through inspection to an issued certificate, and answers public
//! verification lookups.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use halal_backend::{
    config::Config,
    create_app,
    repository::{MemoryRepository, PgRepository, Repository},
    AppState, Collaborators,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // Initialize tracing
    let json_logs = config.logging.json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "halal_server=debug,halal_backend=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!("Starting Halal Certification Server");
    tracing::info!("Environment: {}", config.environment);

    let repo: Arc<dyn Repository> = if config.database.is_in_memory() {
        tracing::warn!("Using in-memory storage; data is lost on restart");
        Arc::new(MemoryRepository::new())
    } else {
        // Create database connection pool
        tracing::info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.database.url)
            .await?;
        tracing::info!("Database connection established");

        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");

        Arc::new(PgRepository::new(db_pool))
    };

    let collaborators = Collaborators::from_config(&config)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let bootstrap = config.bootstrap_admin.clone();

    // Create application state
    let state = AppState::new(config, repo, collaborators);
    state.auth.ensure_bootstrap_admin(bootstrap.as_ref()).await?;

    // Build application
    let app = create_app(state);

    // Start server
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
