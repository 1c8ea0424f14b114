use std::sync::Arc;
use std::time::Duration;

use backend::store::SourceStore;
use shared::CalendarSource;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::SyncSettings;
use crate::sync::{SyncBatch, SyncEngine};

/// Drives the sync engine: every enabled source on the full interval, and
/// user-requested sources on the shorter request interval.
pub struct PollingScheduler {
    engine: Arc<SyncEngine>,
    sources: Arc<dyn SourceStore>,
    settings: SyncSettings,
}

impl PollingScheduler {
    pub fn new(engine: Arc<SyncEngine>, sources: Arc<dyn SourceStore>) -> Self {
        let settings = engine.settings().clone();
        Self {
            engine,
            sources,
            settings,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let full = Duration::from_secs(self.settings.polling_interval_seconds.max(1));
        let requests = Duration::from_secs(self.settings.request_poll_interval_seconds.max(1));
        info!(?full, ?requests, "Starting sync scheduler");

        let mut full_ticker = time::interval(full);
        full_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut request_ticker = time::interval(requests);
        request_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = full_ticker.tick() => {
                    debug!("Running full sync cycle");
                    match self.sources.list_enabled_sources().await {
                        Ok(sources) => self.spawn_batch("scheduled", sources),
                        Err(e) => error!("Failed to list calendar sources: {}", e),
                    }
                }
                _ = request_ticker.tick() => {
                    match self.sources.take_sync_requests().await {
                        Ok(sources) => self.spawn_batch("requested", sources),
                        Err(e) => error!("Failed to read sync requests: {}", e),
                    }
                }
            }
        }
    }

    /// Sources already syncing from an earlier batch are skipped by the
    /// engine, so batches may overlap safely.
    fn spawn_batch(&self, trigger: &'static str, sources: Vec<CalendarSource>) {
        if sources.is_empty() {
            return;
        }
        let engine = self.engine.clone();
        tokio::spawn(async move {
            let batch = engine.sync_all(sources).await;
            log_batch(trigger, &batch);
        });
    }
}

fn log_batch(trigger: &str, batch: &SyncBatch) {
    let candidates: usize = batch.reports.iter().map(|r| r.candidates.len()).sum();
    info!(
        trigger,
        synced = batch.reports.len(),
        failed = batch.failures.len(),
        skipped = batch.skipped.len(),
        candidates,
        "Sync cycle finished"
    );
    for report in &batch.reports {
        for candidate in &report.candidates {
            debug!(
                source_id = %candidate.source_id,
                external_event_id = %candidate.external_event_id,
                home_id = ?candidate.home_id,
                reason = ?candidate.reason,
                "Home-stay candidate"
            );
        }
    }
}
