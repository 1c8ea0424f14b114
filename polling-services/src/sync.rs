//! # Sync engine
//!
//! One sync pass for one source:
//!
//! 1. fetch upstream instances inside the provider's window
//! 2. upsert each into a read-only local mirror, keyed by
//!    `(source_id, external_event_id)` so re-runs never duplicate rows
//! 3. soft-delete mirrors cancelled upstream or no longer returned, but
//!    only inside the fetched window
//! 4. classify the live instances as home-stay candidates
//!
//! Failures are scoped to the source: they are recorded as its last sync
//! error and never stop other sources.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use backend::roster::Roster;
use backend::store::{ExternalEventStore, SourceStore, UpsertOutcome};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use shared::{
    CalendarSource, EventKind, EventStatus, ExternalRef, HomeStayCandidate, NewCalendarEvent,
    SourceKind, SyncStatus, WorkflowError,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::crypto::{Cipher, CryptoError};
use crate::external::{ExternalEvent, SyncWindow};
use crate::google::{GoogleCalendar, GoogleError};
use crate::home_stay::detect_candidates;
use crate::ics::{parse_feed, FeedError, FeedFetcher};

/// Why one source's sync failed
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Google(#[from] GoogleError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Sync did not finish within {0} seconds")]
    TimedOut(u64),

    #[error("A sync of this calendar is already running")]
    InProgress,

    #[error("Source {0} is not connected to this provider")]
    WrongProvider(Uuid),

    #[error(transparent)]
    Store(#[from] WorkflowError),
}

impl SourceError {
    /// Status recorded on the source for this failure
    pub fn sync_status(&self) -> SyncStatus {
        match self {
            SourceError::Google(err) if err.requires_reauth() => SyncStatus::AuthRequired,
            SourceError::Crypto(_) => SyncStatus::AuthRequired,
            _ => SyncStatus::Failed,
        }
    }

    /// Message stored as the source's last sync error
    pub fn user_message(&self) -> String {
        match self {
            SourceError::Store(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

impl From<SourceError> for WorkflowError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Store(inner) => inner,
            SourceError::Crypto(inner) => inner.into(),
            other => WorkflowError::UpstreamFetch(other.to_string()),
        }
    }
}

/// What one sync pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub source_id: Uuid,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub candidates: Vec<HomeStayCandidate>,
}

impl SyncReport {
    fn new(source_id: Uuid) -> Self {
        Self {
            source_id,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct SourceFailure {
    pub source_id: Uuid,
    pub status: SyncStatus,
    pub message: String,
}

/// Outcome of syncing several sources together
#[derive(Debug, Default)]
pub struct SyncBatch {
    pub reports: Vec<SyncReport>,
    pub failures: Vec<SourceFailure>,
    /// Sources skipped because a sync of them was already running
    pub skipped: Vec<Uuid>,
}

/// Marks a source as syncing until dropped
struct InFlight<'a> {
    running: &'a Mutex<HashSet<Uuid>>,
    source_id: Uuid,
}

impl<'a> InFlight<'a> {
    fn claim(running: &'a Mutex<HashSet<Uuid>>, source_id: Uuid) -> Option<Self> {
        let mut set = running.lock().unwrap_or_else(PoisonError::into_inner);
        set.insert(source_id).then_some(Self { running, source_id })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.source_id);
    }
}

pub struct SyncEngine {
    events: Arc<dyn ExternalEventStore>,
    sources: Arc<dyn SourceStore>,
    roster: Arc<dyn Roster>,
    cipher: Arc<Cipher>,
    feeds: Arc<dyn FeedFetcher>,
    google: GoogleCalendar,
    settings: SyncSettings,
    running: Mutex<HashSet<Uuid>>,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        events: Arc<dyn ExternalEventStore>,
        sources: Arc<dyn SourceStore>,
        roster: Arc<dyn Roster>,
        cipher: Arc<Cipher>,
        feeds: Arc<dyn FeedFetcher>,
        google: GoogleCalendar,
        settings: SyncSettings,
    ) -> Self {
        Self {
            events,
            sources,
            roster,
            cipher,
            feeds,
            google,
            settings,
            running: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Sync one source under its timeout and record the result on it.
    pub async fn sync_source(&self, source: &CalendarSource) -> Result<SyncReport, SourceError> {
        let Some(_guard) = InFlight::claim(&self.running, source.id) else {
            debug!(source_id = %source.id, "Sync already running; skipping");
            return Err(SourceError::InProgress);
        };

        let started = Utc::now();
        self.sources
            .record_sync_result(source.id, SyncStatus::Syncing, None, started)
            .await?;

        let limit = self.settings.source_timeout();
        let result = match tokio::time::timeout(limit, self.run(source, started)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::TimedOut(limit.as_secs())),
        };

        let (status, message) = match &result {
            Ok(report) => {
                info!(
                    source_id = %source.id,
                    inserted = report.inserted,
                    updated = report.updated,
                    unchanged = report.unchanged,
                    removed = report.removed,
                    candidates = report.candidates.len(),
                    "Calendar source synced"
                );
                (SyncStatus::Success, None)
            }
            Err(err) => {
                warn!(source_id = %source.id, error = %err, "Calendar source sync failed");
                (err.sync_status(), Some(err.user_message()))
            }
        };
        if let Err(err) = self
            .sources
            .record_sync_result(source.id, status, message, Utc::now())
            .await
        {
            error!(source_id = %source.id, "Failed to record sync result: {}", err);
        }
        result
    }

    /// Sync `sources` concurrently; one source's failure never affects
    /// another.
    pub async fn sync_all(&self, sources: Vec<CalendarSource>) -> SyncBatch {
        let limit = self.settings.max_concurrent_sources.max(1);
        let outcomes: Vec<_> = stream::iter(sources)
            .map(|source| async move {
                let result = self.sync_source(&source).await;
                (source.id, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut batch = SyncBatch::default();
        for (source_id, outcome) in outcomes {
            match outcome {
                Ok(report) => batch.reports.push(report),
                Err(SourceError::InProgress) => batch.skipped.push(source_id),
                Err(err) => batch.failures.push(SourceFailure {
                    source_id,
                    status: err.sync_status(),
                    message: err.user_message(),
                }),
            }
        }
        batch
    }

    async fn run(
        &self,
        source: &CalendarSource,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, SourceError> {
        let (window, fetched) = match &source.kind {
            SourceKind::Google { .. } => {
                let window = SyncWindow::around(
                    now,
                    self.settings.google_past_days,
                    self.settings.google_future_days,
                );
                (window, self.google.fetch_events(source, window, now).await?)
            }
            SourceKind::Ics { .. } => {
                let window = SyncWindow::around(
                    now,
                    self.settings.ics_past_days,
                    self.settings.ics_future_days,
                );
                let url = self.cipher.decrypt(&source.credentials_encrypted)?;
                let body = self.feeds.fetch(&url).await?;
                (window, parse_feed(&body, window)?)
            }
        };
        self.reconcile(source, window, fetched).await
    }

    async fn reconcile(
        &self,
        source: &CalendarSource,
        window: SyncWindow,
        fetched: Vec<ExternalEvent>,
    ) -> Result<SyncReport, SourceError> {
        let mut report = SyncReport::new(source.id);
        let mut seen = HashSet::new();
        let mut live = Vec::new();

        for event in fetched {
            if event.cancelled {
                if self
                    .events
                    .remove_mapped_event(source.id, &event.external_id)
                    .await?
                {
                    report.removed += 1;
                }
                continue;
            }
            if !seen.insert(event.external_id.clone()) {
                continue;
            }

            let outcome = self
                .events
                .upsert_external_event(source.id, &event.external_id, mirror_of(source, &event))
                .await?;
            match outcome {
                UpsertOutcome::Inserted(_) => report.inserted += 1,
                UpsertOutcome::Updated(_) => report.updated += 1,
                UpsertOutcome::Unchanged(_) => report.unchanged += 1,
            }
            live.push(event);
        }

        for mapped in self.events.mapped_events(source.id).await? {
            let external_id = &mapped.mapping.external_event_id;
            if seen.contains(external_id)
                || !window.overlaps(mapped.event.start_at, mapped.event.end_at)
            {
                continue;
            }
            if self
                .events
                .remove_mapped_event(source.id, external_id)
                .await?
            {
                report.removed += 1;
            }
        }

        let homes = self.roster.homes(source.child_id).await?;
        report.candidates = detect_candidates(source.id, &live, &homes);
        Ok(report)
    }
}

/// Read-only local row for an upstream instance
fn mirror_of(source: &CalendarSource, event: &ExternalEvent) -> NewCalendarEvent {
    let calendar_id = match &source.kind {
        SourceKind::Google { calendar_id } => Some(calendar_id.clone()),
        SourceKind::Ics { .. } => None,
    };
    NewCalendarEvent {
        child_id: source.child_id,
        title: event.title.clone(),
        description: event.description.clone(),
        start_at: event.start_at,
        end_at: event.end_at,
        all_day: event.all_day,
        kind: EventKind::Event,
        status: EventStatus::Confirmed,
        proposed_by: None,
        proposal_reason: None,
        source: source.provider,
        external: Some(ExternalRef {
            provider: source.provider.as_str().to_string(),
            calendar_id,
            event_id: event.external_id.clone(),
            html_link: event.html_link.clone(),
        }),
        is_read_only: true,
        created_by: Some(source.owner_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::{GoogleApi, TokenResponse};
    use google_calendar3::api::Events;
    use crate::sources::SourceRegistry;
    use async_trait::async_trait;
    use backend::roster::StaticRoster;
    use backend::store::{EventStore, MemoryStore};
    use shared::EventQuery;
    use tokio::sync::Mutex as AsyncMutex;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    /// Serves a fixed body per URL; unknown URLs are 404
    #[derive(Default)]
    struct FakeFeeds {
        bodies: AsyncMutex<std::collections::HashMap<String, Result<String, FeedError>>>,
    }

    impl FakeFeeds {
        async fn serve(&self, url: &str, body: Result<String, FeedError>) {
            self.bodies.lock().await.insert(url.to_string(), body);
        }
    }

    #[async_trait]
    impl FeedFetcher for FakeFeeds {
        async fn fetch(&self, url: &str) -> Result<String, FeedError> {
            self.bodies
                .lock()
                .await
                .get(url)
                .cloned()
                .unwrap_or(Err(FeedError::NotFound))
        }
    }

    struct NoGoogle;

    #[async_trait]
    impl GoogleApi for NoGoogle {
        async fn refresh_access_token(&self, _: &str) -> Result<TokenResponse, GoogleError> {
            Err(GoogleError::Unauthorized)
        }

        async fn list_events(
            &self,
            _: &str,
            _: &str,
            _: SyncWindow,
            _: Option<&str>,
        ) -> Result<Events, GoogleError> {
            Err(GoogleError::Unauthorized)
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        feeds: Arc<FakeFeeds>,
        registry: SourceRegistry,
        engine: SyncEngine,
        child: Uuid,
    }

    fn harness() -> Harness {
        let child = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new());
        let cipher = Arc::new(Cipher::from_key_material(KEY).unwrap());
        let feeds = Arc::new(FakeFeeds::default());
        let roster = StaticRoster::new().with_home(child, Uuid::new_v4(), "Dad's house");
        let google = GoogleCalendar::new(Arc::new(NoGoogle), cipher.clone(), store.clone());
        let engine = SyncEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(roster),
            cipher.clone(),
            feeds.clone(),
            google,
            SyncSettings::default(),
        );
        Harness {
            registry: SourceRegistry::new(store.clone(), store.clone(), cipher),
            store,
            feeds,
            engine,
            child,
        }
    }

    fn feed(events: &[(&str, &str, DateTime<Utc>)]) -> String {
        let mut body = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n");
        for (uid, summary, start) in events {
            body.push_str(&format!(
                "BEGIN:VEVENT\r\nUID:{}\r\nSUMMARY:{}\r\nDTSTART:{}\r\nDTEND:{}\r\nEND:VEVENT\r\n",
                uid,
                summary,
                start.format("%Y%m%dT%H%M%SZ"),
                (*start + chrono::Duration::hours(2)).format("%Y%m%dT%H%M%SZ"),
            ));
        }
        body.push_str("END:VCALENDAR\r\n");
        body
    }

    fn soon(days: i64) -> DateTime<Utc> {
        use chrono::{Duration, Timelike};
        let base = Utc::now() + Duration::days(days);
        base.with_nanosecond(0).unwrap()
    }

    const URL: &str = "https://example.com/family.ics";

    #[tokio::test]
    async fn repeated_sync_of_an_unchanged_feed_adds_nothing() {
        let h = harness();
        let source = h
            .registry
            .connect_ics(h.child, Uuid::new_v4(), "School", URL)
            .await
            .unwrap();
        h.feeds
            .serve(URL, Ok(feed(&[("a", "Weekend at Dad's house", soon(3)), ("b", "Recital", soon(5))])))
            .await;

        let first = h.engine.sync_source(&source).await.unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.candidates.len(), 1);
        let rows_after_first = h.store.all_events().await.len();

        let second = h.engine.sync_source(&source).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(h.store.all_events().await.len(), rows_after_first);
        assert_eq!(h.store.mapping_count().await, 2);

        let imported = h.store.list(&EventQuery::for_child(h.child)).await.unwrap();
        assert!(imported.iter().all(|e| e.is_read_only && e.source == shared::EventSource::Apple));

        let stored = h.store.get_source(source.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Success);
        assert!(stored.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn upstream_changes_update_and_removals_clean_up() {
        let h = harness();
        let source = h
            .registry
            .connect_ics(h.child, Uuid::new_v4(), "", URL)
            .await
            .unwrap();
        h.feeds
            .serve(URL, Ok(feed(&[("a", "Recital", soon(3)), ("b", "Soccer", soon(4))])))
            .await;
        h.engine.sync_source(&source).await.unwrap();

        h.feeds
            .serve(URL, Ok(feed(&[("a", "Recital (moved)", soon(6))])))
            .await;
        let report = h.engine.sync_source(&source).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.removed, 1);

        let live = h.store.list(&EventQuery::for_child(h.child)).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].title, "Recital (moved)");
    }

    #[tokio::test]
    async fn mirrors_outside_the_window_survive_cleanup() {
        let h = harness();
        let source = h
            .registry
            .connect_ics(h.child, Uuid::new_v4(), "", URL)
            .await
            .unwrap();
        let far = soon(400);
        let row = mirror_of(
            &source,
            &ExternalEvent {
                external_id: "far".to_string(),
                title: "Far future".to_string(),
                description: None,
                location: None,
                start_at: far,
                end_at: far,
                all_day: false,
                html_link: None,
                cancelled: false,
            },
        );
        h.store
            .upsert_external_event(source.id, "far", row)
            .await
            .unwrap();
        h.feeds.serve(URL, Ok(feed(&[]))).await;

        let report = h.engine.sync_source(&source).await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(h.store.mapping_count().await, 1);
    }

    #[tokio::test]
    async fn one_broken_feed_does_not_stop_the_batch() {
        let h = harness();
        let owner = Uuid::new_v4();
        let good = h
            .registry
            .connect_ics(h.child, owner, "Good", URL)
            .await
            .unwrap();
        let bad = h
            .registry
            .connect_ics(h.child, owner, "Bad", "https://example.com/broken.ics")
            .await
            .unwrap();
        h.feeds.serve(URL, Ok(feed(&[("a", "Recital", soon(3))]))).await;
        h.feeds
            .serve("https://example.com/broken.ics", Err(FeedError::Timeout))
            .await;

        let batch = h.engine.sync_all(vec![good.clone(), bad.clone()]).await;
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].source_id, bad.id);

        let bad_state = h.store.get_source(bad.id).await.unwrap().unwrap();
        assert_eq!(bad_state.sync_status, SyncStatus::Failed);
        assert_eq!(
            bad_state.last_sync_error.as_deref(),
            Some("The calendar server did not respond in time")
        );
        let good_state = h.store.get_source(good.id).await.unwrap().unwrap();
        assert_eq!(good_state.sync_status, SyncStatus::Success);
    }

    #[tokio::test]
    async fn revoked_google_access_asks_for_reconnect() {
        let h = harness();
        let creds = crate::google::GoogleCredentials {
            access_token: "old".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: Utc::now() - chrono::Duration::hours(1),
        };
        let source = h
            .registry
            .connect_google(h.child, Uuid::new_v4(), "Work", "", &creds)
            .await
            .unwrap();

        let err = h.engine.sync_source(&source).await.unwrap_err();
        assert_eq!(err.sync_status(), SyncStatus::AuthRequired);
        let stored = h.store.get_source(source.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::AuthRequired);
        assert!(stored.last_sync_error.is_some());
    }

    #[tokio::test]
    async fn concurrent_runs_of_one_source_are_refused() {
        let h = harness();
        let source = h
            .registry
            .connect_ics(h.child, Uuid::new_v4(), "", URL)
            .await
            .unwrap();
        let _held = InFlight::claim(&h.engine.running, source.id).unwrap();
        assert!(matches!(
            h.engine.sync_source(&source).await,
            Err(SourceError::InProgress)
        ));
    }
}
