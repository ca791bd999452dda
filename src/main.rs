//! Library server entry point

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use library_server::{
    api,
    config::AppConfig,
    repository::Repository,
    services::{
        cache::{CacheStore, MemoryCache, RedisCache},
        email::{LogMailer, Mailer, SmtpMailer},
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("library_server={},tower_http=debug", config.logging.level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting library server v{}", env!("CARGO_PKG_VERSION"));

    let repository = if config.database.is_memory() {
        tracing::warn!("Using the in-memory store; data is lost on shutdown");
        Repository::memory()
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await
            .context("Failed to connect to database")?;
        tracing::info!("Connected to database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations completed");

        Repository::postgres(pool)
    };

    let cache: Arc<dyn CacheStore> = if config.redis.url.is_empty() {
        tracing::info!("Using the in-memory cache");
        Arc::new(MemoryCache::new())
    } else {
        let redis = RedisCache::new(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?;
        tracing::info!("Connected to Redis");
        Arc::new(redis)
    };

    let mailer: Arc<dyn Mailer> = if config.email.enabled {
        Arc::new(SmtpMailer::new(config.email.clone()))
    } else {
        tracing::info!("Email disabled; outgoing mail is logged");
        Arc::new(LogMailer)
    };

    let services = Services::new(
        repository,
        cache,
        mailer,
        Duration::from_secs(config.cache.ttl_seconds),
    );

    let added = services
        .users
        .sync_operation_claims()
        .await
        .context("Failed to synchronize operation claims")?;
    tracing::info!(added, "Operation claims synchronized");

    if let (Some(email), Some(password)) = (
        config.auth.admin_email.as_deref(),
        config.auth.admin_password.as_deref(),
    ) {
        let admin = services
            .users
            .bootstrap_admin(email, password)
            .await
            .context("Failed to bootstrap administrator")?;
        tracing::info!(user_id = %admin.id, "Administrator ready");
    }

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };
    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
