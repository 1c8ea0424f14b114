use std::sync::Arc;

use anyhow::{Context, Result};
use backend::db::{establish_connection_pool, PgRoster, PgStore};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use homeday_sync::config::PollingConfig;
use homeday_sync::crypto::Cipher;
use homeday_sync::google::{GoogleCalendar, HttpGoogleApi};
use homeday_sync::ics::HttpFeedFetcher;
use homeday_sync::{PollingScheduler, SyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install crypto provider"))?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homeday_sync=debug,backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting homeday calendar sync");

    dotenv::dotenv().ok();
    let config = PollingConfig::from_env()?;
    let cipher = Arc::new(
        Cipher::from_key_material(&config.encryption_key)
            .context("ENCRYPTION_KEY must be 64 hex characters or base64 of 32 bytes")?,
    );

    let pool = establish_connection_pool(&config.database_url, config.database_pool_size)?;
    tracing::info!("Database connection pool initialized");
    let store = Arc::new(PgStore::new(pool.clone()));
    let roster = Arc::new(PgRoster::new(pool));

    if config.google_client_id.is_none() || config.google_client_secret.is_none() {
        tracing::warn!("Google OAuth client is not configured; Google token refresh will fail");
    }
    let google_api = HttpGoogleApi::new(
        config.google_client_id.clone().unwrap_or_default(),
        config.google_client_secret.clone().unwrap_or_default(),
        config.sync.fetch_timeout(),
    )?;
    let google = GoogleCalendar::new(Arc::new(google_api), cipher.clone(), store.clone());
    let feeds = HttpFeedFetcher::new(config.sync.fetch_timeout())?;

    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        store.clone(),
        roster,
        cipher,
        Arc::new(feeds),
        google,
        config.sync.clone(),
    ));
    let scheduler = PollingScheduler::new(engine, store);

    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run().await {
            tracing::error!("Scheduler error: {:?}", e);
        }
    });

    tracing::info!("Calendar sync running. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping...");
    scheduler_handle.abort();

    tracing::info!("Calendar sync stopped");
    Ok(())
}
