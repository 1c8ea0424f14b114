//! # Storage seams
//!
//! The workflow engine and the sync adapters talk to storage only through
//! the traits in this module, so the same logic runs against Postgres in
//! production ([`crate::db::PgStore`]) and against [`MemoryStore`] in tests.
//!
//! Status changes are check-and-set at this boundary: [`EventStore::transition`]
//! only applies while the row is still `proposed` and reports `None`
//! otherwise. An [`OverlapGuard`] is evaluated in the same step, so two
//! clashing confirmations cannot both land. Callers never read-then-write a
//! status.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    CalendarEvent, CalendarEventMapping, CalendarSource, EventDetails, EventKind, EventQuery,
    EventStatus, NewCalendarEvent, NewCalendarSource, SourceKind, StatusTransition, SyncStatus,
    WorkflowError, WorkflowResult,
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Storage of calendar event rows
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a new row; the store assigns id and audit timestamps
    async fn insert(&self, event: NewCalendarEvent) -> WorkflowResult<CalendarEvent>;

    /// Fetch a non-deleted row
    async fn get(&self, id: Uuid) -> WorkflowResult<Option<CalendarEvent>>;

    /// Non-deleted rows matching `query`, ordered by start time
    async fn list(&self, query: &EventQuery) -> WorkflowResult<Vec<CalendarEvent>>;

    /// Overwrite the editable fields of a non-deleted, writable row.
    /// Returns `None` when no such row exists.
    async fn update_details(
        &self,
        id: Uuid,
        details: EventDetails,
    ) -> WorkflowResult<Option<CalendarEvent>>;

    /// Apply `transition` only if the row is a non-deleted home-day still in
    /// `proposed`. Returns `None` when the condition did not hold, and
    /// [`overlap_error`] when `guard` finds a clashing confirmed home-day.
    async fn transition(
        &self,
        id: Uuid,
        transition: StatusTransition,
        guard: Option<OverlapGuard>,
    ) -> WorkflowResult<Option<CalendarEvent>>;

    /// Mark a row deleted. Returns whether a live row was found.
    async fn soft_delete(&self, id: Uuid) -> WorkflowResult<bool>;
}

/// Span a home-day may only take if no confirmed home-day at another home
/// for the same child shares any of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapGuard {
    pub home_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl OverlapGuard {
    pub fn for_event(event: &CalendarEvent) -> Option<Self> {
        Some(Self {
            home_id: event.kind.home_id()?,
            start_at: event.start_at,
            end_at: event.end_at,
        })
    }

    /// Whether `other` is a live confirmed home-day elsewhere within the span
    pub fn clashes_with(&self, other: &CalendarEvent) -> bool {
        !other.is_deleted
            && other.status == EventStatus::Confirmed
            && matches!(other.kind, EventKind::HomeDay { home_id } if home_id != self.home_id)
            && other.overlaps(self.start_at, self.end_at)
    }
}

pub fn overlap_error() -> WorkflowError {
    WorkflowError::validation(
        "The child is already confirmed at another home for part of this time",
    )
}

/// What an idempotent import did with one upstream event
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted(CalendarEvent),
    Updated(CalendarEvent),
    Unchanged(CalendarEvent),
}

impl UpsertOutcome {
    pub fn event(&self) -> &CalendarEvent {
        match self {
            UpsertOutcome::Inserted(e) | UpsertOutcome::Updated(e) | UpsertOutcome::Unchanged(e) => e,
        }
    }
}

/// A mapping row together with the local event it points at
#[derive(Debug, Clone, PartialEq)]
pub struct MappedEvent {
    pub mapping: CalendarEventMapping,
    pub event: CalendarEvent,
}

/// Storage of imported rows, keyed by `(source_id, external_event_id)`
#[async_trait]
pub trait ExternalEventStore: Send + Sync {
    /// Insert or refresh the local mirror of one upstream event. The row
    /// write and the mapping write happen atomically, so a re-run never
    /// duplicates rows.
    async fn upsert_external_event(
        &self,
        source_id: Uuid,
        external_event_id: &str,
        event: NewCalendarEvent,
    ) -> WorkflowResult<UpsertOutcome>;

    /// Live local rows mapped from `source_id`
    async fn mapped_events(&self, source_id: Uuid) -> WorkflowResult<Vec<MappedEvent>>;

    /// Soft-delete the local mirror and drop its mapping
    async fn remove_mapped_event(
        &self,
        source_id: Uuid,
        external_event_id: &str,
    ) -> WorkflowResult<bool>;

    /// Soft-delete every mirror of `source_id` and drop all its mappings.
    /// Returns the number of rows removed.
    async fn unlink_source(&self, source_id: Uuid) -> WorkflowResult<usize>;
}

/// Storage of connected external calendars and their sync bookkeeping
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn list_enabled_sources(&self) -> WorkflowResult<Vec<CalendarSource>>;

    async fn list_sources_for_child(&self, child_id: Uuid) -> WorkflowResult<Vec<CalendarSource>>;

    async fn get_source(&self, id: Uuid) -> WorkflowResult<Option<CalendarSource>>;

    async fn create_source(&self, source: NewCalendarSource) -> WorkflowResult<CalendarSource>;

    async fn find_source_by_url_hash(
        &self,
        child_id: Uuid,
        url_hash: &str,
    ) -> WorkflowResult<Option<CalendarSource>>;

    /// Record a sync state change. `Success` stamps `last_synced_at` and
    /// clears the last error; `Failed` and `AuthRequired` store `error`.
    async fn record_sync_result(
        &self,
        id: Uuid,
        status: SyncStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> WorkflowResult<()>;

    async fn update_credentials(&self, id: Uuid, credentials_encrypted: &str)
        -> WorkflowResult<()>;

    /// Flag enabled sources of `child_id` (or only `source_id`) for the
    /// scheduler. Returns the flagged ids.
    async fn request_sync(
        &self,
        child_id: Uuid,
        source_id: Option<Uuid>,
    ) -> WorkflowResult<Vec<Uuid>>;

    /// Enabled sources with a pending request; the flag is cleared
    async fn take_sync_requests(&self) -> WorkflowResult<Vec<CalendarSource>>;

    async fn delete_source(&self, id: Uuid) -> WorkflowResult<bool>;
}

/// Whether an existing mirror already carries everything `incoming` would
/// write.
pub fn imported_fields_match(existing: &CalendarEvent, incoming: &NewCalendarEvent) -> bool {
    existing.title == incoming.title
        && existing.description == incoming.description
        && existing.start_at == incoming.start_at
        && existing.end_at == incoming.end_at
        && existing.all_day == incoming.all_day
        && existing.kind == incoming.kind
        && existing.external == incoming.external
}

pub(crate) fn materialize(id: Uuid, event: NewCalendarEvent, now: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        id,
        child_id: event.child_id,
        title: event.title,
        description: event.description,
        start_at: event.start_at,
        end_at: event.end_at,
        all_day: event.all_day,
        kind: event.kind,
        status: event.status,
        proposed_by: event.proposed_by,
        proposal_reason: event.proposal_reason,
        confirmed_by: None,
        confirmed_at: None,
        rejected_by: None,
        rejected_at: None,
        source: event.source,
        external: event.external,
        is_read_only: event.is_read_only,
        created_by: event.created_by,
        created_at: now,
        updated_at: now,
        is_deleted: false,
    }
}

#[derive(Default)]
struct MemoryState {
    events: HashMap<Uuid, CalendarEvent>,
    mappings: HashMap<(Uuid, String), Uuid>,
    sources: HashMap<Uuid, CalendarSource>,
}

/// In-process store. Every operation runs under one lock, which makes the
/// conditional transition atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row, deleted ones included
    pub async fn all_events(&self) -> Vec<CalendarEvent> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state.events.values().cloned().collect();
        events.sort_by_key(|e| (e.start_at, e.created_at));
        events
    }

    pub async fn mapping_count(&self) -> usize {
        self.state.lock().await.mappings.len()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert(&self, event: NewCalendarEvent) -> WorkflowResult<CalendarEvent> {
        let created = materialize(Uuid::new_v4(), event, Utc::now());
        let mut state = self.state.lock().await;
        state.events.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> WorkflowResult<Option<CalendarEvent>> {
        let state = self.state.lock().await;
        Ok(state.events.get(&id).filter(|e| !e.is_deleted).cloned())
    }

    async fn list(&self, query: &EventQuery) -> WorkflowResult<Vec<CalendarEvent>> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state
            .events
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.start_at, e.created_at));
        Ok(events)
    }

    async fn update_details(
        &self,
        id: Uuid,
        details: EventDetails,
    ) -> WorkflowResult<Option<CalendarEvent>> {
        let mut state = self.state.lock().await;
        let Some(event) = state
            .events
            .get_mut(&id)
            .filter(|e| !e.is_deleted && !e.is_read_only)
        else {
            return Ok(None);
        };
        event.title = details.title;
        event.description = details.description;
        event.start_at = details.start_at;
        event.end_at = details.end_at;
        event.all_day = details.all_day;
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: StatusTransition,
        guard: Option<OverlapGuard>,
    ) -> WorkflowResult<Option<CalendarEvent>> {
        let mut state = self.state.lock().await;
        let Some(child_id) = state
            .events
            .get(&id)
            .filter(|e| {
                !e.is_deleted
                    && e.status == EventStatus::Proposed
                    && matches!(e.kind, EventKind::HomeDay { .. })
            })
            .map(|e| e.child_id)
        else {
            return Ok(None);
        };
        if let Some(guard) = guard {
            let clash = state
                .events
                .values()
                .any(|e| e.id != id && e.child_id == child_id && guard.clashes_with(e));
            if clash {
                return Err(overlap_error());
            }
        }
        let Some(event) = state.events.get_mut(&id) else {
            return Ok(None);
        };
        match transition {
            StatusTransition::Confirm { by, at } => {
                event.status = EventStatus::Confirmed;
                event.confirmed_by = Some(by);
                event.confirmed_at = Some(at);
                event.updated_at = at;
            }
            StatusTransition::Reject { by, at } => {
                event.status = EventStatus::Rejected;
                event.rejected_by = Some(by);
                event.rejected_at = Some(at);
                event.updated_at = at;
            }
        }
        Ok(Some(event.clone()))
    }

    async fn soft_delete(&self, id: Uuid) -> WorkflowResult<bool> {
        let mut state = self.state.lock().await;
        match state.events.get_mut(&id).filter(|e| !e.is_deleted) {
            Some(event) => {
                event.is_deleted = true;
                event.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ExternalEventStore for MemoryStore {
    async fn upsert_external_event(
        &self,
        source_id: Uuid,
        external_event_id: &str,
        event: NewCalendarEvent,
    ) -> WorkflowResult<UpsertOutcome> {
        let now = Utc::now();
        let key = (source_id, external_event_id.to_string());
        let mut state = self.state.lock().await;

        if let Some(existing_id) = state.mappings.get(&key).copied() {
            if let Some(existing) = state.events.get_mut(&existing_id).filter(|e| !e.is_deleted) {
                if imported_fields_match(existing, &event) {
                    return Ok(UpsertOutcome::Unchanged(existing.clone()));
                }
                existing.title = event.title;
                existing.description = event.description;
                existing.start_at = event.start_at;
                existing.end_at = event.end_at;
                existing.all_day = event.all_day;
                existing.kind = event.kind;
                existing.external = event.external;
                existing.updated_at = now;
                return Ok(UpsertOutcome::Updated(existing.clone()));
            }
            // mapping points at a deleted row; remap to a fresh one
            state.mappings.remove(&key);
        }

        let created = materialize(Uuid::new_v4(), event, now);
        state.events.insert(created.id, created.clone());
        state.mappings.insert(key, created.id);
        Ok(UpsertOutcome::Inserted(created))
    }

    async fn mapped_events(&self, source_id: Uuid) -> WorkflowResult<Vec<MappedEvent>> {
        let state = self.state.lock().await;
        let mut mapped: Vec<_> = state
            .mappings
            .iter()
            .filter(|((source, _), _)| *source == source_id)
            .filter_map(|((source, external_id), event_id)| {
                let event = state.events.get(event_id).filter(|e| !e.is_deleted)?;
                Some(MappedEvent {
                    mapping: CalendarEventMapping {
                        source_id: *source,
                        external_event_id: external_id.clone(),
                        event_id: *event_id,
                    },
                    event: event.clone(),
                })
            })
            .collect();
        mapped.sort_by_key(|m| m.event.start_at);
        Ok(mapped)
    }

    async fn remove_mapped_event(
        &self,
        source_id: Uuid,
        external_event_id: &str,
    ) -> WorkflowResult<bool> {
        let mut state = self.state.lock().await;
        let Some(event_id) = state
            .mappings
            .remove(&(source_id, external_event_id.to_string()))
        else {
            return Ok(false);
        };
        if let Some(event) = state.events.get_mut(&event_id) {
            event.is_deleted = true;
            event.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn unlink_source(&self, source_id: Uuid) -> WorkflowResult<usize> {
        let mut state = self.state.lock().await;
        let keys: Vec<_> = state
            .mappings
            .keys()
            .filter(|(source, _)| *source == source_id)
            .cloned()
            .collect();
        let now = Utc::now();
        let mut removed = 0;
        for key in keys {
            if let Some(event_id) = state.mappings.remove(&key) {
                if let Some(event) = state.events.get_mut(&event_id).filter(|e| !e.is_deleted) {
                    event.is_deleted = true;
                    event.updated_at = now;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn list_enabled_sources(&self) -> WorkflowResult<Vec<CalendarSource>> {
        let state = self.state.lock().await;
        let mut sources: Vec<_> = state.sources.values().filter(|s| s.enabled).cloned().collect();
        sources.sort_by_key(|s| s.created_at);
        Ok(sources)
    }

    async fn list_sources_for_child(&self, child_id: Uuid) -> WorkflowResult<Vec<CalendarSource>> {
        let state = self.state.lock().await;
        let mut sources: Vec<_> = state
            .sources
            .values()
            .filter(|s| s.child_id == child_id)
            .cloned()
            .collect();
        sources.sort_by_key(|s| s.created_at);
        Ok(sources)
    }

    async fn get_source(&self, id: Uuid) -> WorkflowResult<Option<CalendarSource>> {
        Ok(self.state.lock().await.sources.get(&id).cloned())
    }

    async fn create_source(&self, source: NewCalendarSource) -> WorkflowResult<CalendarSource> {
        let now = Utc::now();
        let created = CalendarSource {
            id: Uuid::new_v4(),
            child_id: source.child_id,
            owner_id: source.owner_id,
            name: source.name,
            provider: source.provider,
            kind: source.kind,
            credentials_encrypted: source.credentials_encrypted,
            enabled: true,
            sync_requested: true,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .await
            .sources
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_source_by_url_hash(
        &self,
        child_id: Uuid,
        url_hash: &str,
    ) -> WorkflowResult<Option<CalendarSource>> {
        let state = self.state.lock().await;
        Ok(state
            .sources
            .values()
            .find(|s| {
                s.child_id == child_id
                    && matches!(&s.kind, SourceKind::Ics { url_hash: hash } if hash == url_hash)
            })
            .cloned())
    }

    async fn record_sync_result(
        &self,
        id: Uuid,
        status: SyncStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let mut state = self.state.lock().await;
        if let Some(source) = state.sources.get_mut(&id) {
            source.sync_status = status;
            match status {
                SyncStatus::Success => {
                    source.last_synced_at = Some(at);
                    source.last_sync_error = None;
                }
                SyncStatus::Failed | SyncStatus::AuthRequired => source.last_sync_error = error,
                SyncStatus::Pending | SyncStatus::Syncing => {}
            }
            source.updated_at = at;
        }
        Ok(())
    }

    async fn update_credentials(
        &self,
        id: Uuid,
        credentials_encrypted: &str,
    ) -> WorkflowResult<()> {
        let mut state = self.state.lock().await;
        if let Some(source) = state.sources.get_mut(&id) {
            source.credentials_encrypted = credentials_encrypted.to_string();
            source.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn request_sync(
        &self,
        child_id: Uuid,
        source_id: Option<Uuid>,
    ) -> WorkflowResult<Vec<Uuid>> {
        let mut state = self.state.lock().await;
        let mut flagged = Vec::new();
        for source in state.sources.values_mut() {
            if source.child_id != child_id || !source.enabled {
                continue;
            }
            if source_id.is_some_and(|id| id != source.id) {
                continue;
            }
            source.sync_requested = true;
            flagged.push(source.id);
        }
        flagged.sort();
        Ok(flagged)
    }

    async fn take_sync_requests(&self) -> WorkflowResult<Vec<CalendarSource>> {
        let mut state = self.state.lock().await;
        let mut taken = Vec::new();
        for source in state.sources.values_mut() {
            if source.enabled && source.sync_requested {
                source.sync_requested = false;
                taken.push(source.clone());
            }
        }
        taken.sort_by_key(|s| s.created_at);
        Ok(taken)
    }

    async fn delete_source(&self, id: Uuid) -> WorkflowResult<bool> {
        Ok(self.state.lock().await.sources.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use shared::{EventSource, ExternalRef};

    fn home_day(child_id: Uuid, proposer: Uuid) -> NewCalendarEvent {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        NewCalendarEvent {
            status: EventStatus::Proposed,
            proposed_by: Some(proposer),
            ..NewCalendarEvent::manual(
                child_id,
                "Dad's house",
                start,
                start + Duration::days(2),
                EventKind::HomeDay {
                    home_id: Uuid::new_v4(),
                },
                proposer,
            )
        }
    }

    fn imported(child_id: Uuid, title: &str) -> NewCalendarEvent {
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 15, 0, 0).unwrap();
        NewCalendarEvent {
            source: EventSource::Ics,
            is_read_only: true,
            created_by: None,
            external: Some(ExternalRef {
                provider: "ics".to_string(),
                calendar_id: None,
                event_id: "uid-1".to_string(),
                html_link: None,
            }),
            ..NewCalendarEvent::manual(
                child_id,
                title,
                start,
                start + Duration::hours(1),
                EventKind::Event,
                Uuid::nil(),
            )
        }
    }

    #[tokio::test]
    async fn transition_applies_only_while_proposed() {
        let store = MemoryStore::new();
        let event = store
            .insert(home_day(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        let by = Uuid::new_v4();
        let at = Utc::now();
        let confirmed = store
            .transition(event.id, StatusTransition::Confirm { by, at }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.status, EventStatus::Confirmed);
        assert_eq!(confirmed.confirmed_by, Some(by));

        let again = store
            .transition(event.id, StatusTransition::Reject { by, at }, None)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn guarded_transition_refuses_a_clash_at_another_home() {
        let store = MemoryStore::new();
        let child = Uuid::new_v4();
        let by = Uuid::new_v4();
        let at = Utc::now();

        let moms = store.insert(home_day(child, by)).await.unwrap();
        let dads = store.insert(home_day(child, by)).await.unwrap();
        let moms = store
            .transition(
                moms.id,
                StatusTransition::Confirm { by, at },
                OverlapGuard::for_event(&moms),
            )
            .await
            .unwrap()
            .unwrap();

        let err = store
            .transition(
                dads.id,
                StatusTransition::Confirm { by, at },
                OverlapGuard::for_event(&dads),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        let dads = store.get(dads.id).await.unwrap().unwrap();
        assert_eq!(dads.status, EventStatus::Proposed);

        // another stay at the same home never clashes with itself
        let same_home = store
            .insert(NewCalendarEvent {
                kind: moms.kind.clone(),
                ..home_day(child, by)
            })
            .await
            .unwrap();
        let guard = OverlapGuard::for_event(&same_home);
        assert!(store
            .transition(same_home.id, StatusTransition::Confirm { by, at }, guard)
            .await
            .unwrap()
            .is_some());

        // rejections carry no guard
        assert!(store
            .transition(dads.id, StatusTransition::Reject { by, at }, None)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn deleted_rows_are_invisible() {
        let store = MemoryStore::new();
        let event = store
            .insert(home_day(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        assert!(store.soft_delete(event.id).await.unwrap());
        assert!(store.get(event.id).await.unwrap().is_none());
        assert!(!store.soft_delete(event.id).await.unwrap());
        assert!(store
            .list(&EventQuery::for_child(event.child_id))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_source_and_external_id() {
        let store = MemoryStore::new();
        let child = Uuid::new_v4();
        let source = Uuid::new_v4();

        let first = store
            .upsert_external_event(source, "uid-1", imported(child, "Piano"))
            .await
            .unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted(_)));

        let second = store
            .upsert_external_event(source, "uid-1", imported(child, "Piano"))
            .await
            .unwrap();
        assert!(matches!(second, UpsertOutcome::Unchanged(_)));

        let third = store
            .upsert_external_event(source, "uid-1", imported(child, "Piano lesson"))
            .await
            .unwrap();
        assert!(matches!(third, UpsertOutcome::Updated(_)));
        assert_eq!(third.event().id, first.event().id);

        assert_eq!(store.all_events().await.len(), 1);
        assert_eq!(store.mapping_count().await, 1);
    }

    #[tokio::test]
    async fn unlinking_a_source_soft_deletes_its_rows() {
        let store = MemoryStore::new();
        let child = Uuid::new_v4();
        let source = Uuid::new_v4();
        store
            .upsert_external_event(source, "a", imported(child, "A"))
            .await
            .unwrap();
        store
            .upsert_external_event(source, "b", imported(child, "B"))
            .await
            .unwrap();

        assert_eq!(store.unlink_source(source).await.unwrap(), 2);
        assert_eq!(store.mapping_count().await, 0);
        assert!(store.mapped_events(source).await.unwrap().is_empty());
        assert!(store.all_events().await.iter().all(|e| e.is_deleted));
    }
}
