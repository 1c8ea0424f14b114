use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub database_url: String,
    pub database_pool_size: usize,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub encryption_key: String,
    pub sync: SyncSettings,
}

impl PollingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_pool_size: env::var("DATABASE_POOL_SIZE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DATABASE_POOL_SIZE must be a valid number")?,
            google_client_id: env::var("GOOGLE_CLIENT_ID").ok(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").ok(),
            encryption_key: env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set")?,
            sync: SyncSettings::from_env()?,
        })
    }
}

/// Sync tunables, read from `SYNC_*` environment variables
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncSettings {
    /// Full pass over every enabled source
    pub polling_interval_seconds: u64,
    /// How often manual "sync now" requests are picked up
    pub request_poll_interval_seconds: u64,
    /// Per HTTP request
    pub fetch_timeout_seconds: u64,
    /// Per source, fetch and reconcile together
    pub source_timeout_seconds: u64,
    pub max_concurrent_sources: usize,
    pub google_past_days: i64,
    pub google_future_days: i64,
    pub ics_past_days: i64,
    pub ics_future_days: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            polling_interval_seconds: 600,
            request_poll_interval_seconds: 15,
            fetch_timeout_seconds: 30,
            source_timeout_seconds: 120,
            max_concurrent_sources: 4,
            google_past_days: 30,
            google_future_days: 90,
            ics_past_days: 30,
            ics_future_days: 180,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        Self::load(Environment::with_prefix("SYNC"))
    }

    fn load(environment: Environment) -> Result<Self> {
        let defaults = Self::default();
        Config::builder()
            .set_default("polling_interval_seconds", defaults.polling_interval_seconds)?
            .set_default(
                "request_poll_interval_seconds",
                defaults.request_poll_interval_seconds,
            )?
            .set_default("fetch_timeout_seconds", defaults.fetch_timeout_seconds)?
            .set_default("source_timeout_seconds", defaults.source_timeout_seconds)?
            .set_default(
                "max_concurrent_sources",
                defaults.max_concurrent_sources as u64,
            )?
            .set_default("google_past_days", defaults.google_past_days)?
            .set_default("google_future_days", defaults.google_future_days)?
            .set_default("ics_past_days", defaults.ics_past_days)?
            .set_default("ics_future_days", defaults.ics_future_days)?
            .add_source(environment.try_parsing(true))
            .build()
            .context("Failed to read SYNC_* settings")?
            .try_deserialize()
            .context("Invalid SYNC_* settings")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_seconds)
    }
}
