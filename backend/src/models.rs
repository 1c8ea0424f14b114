// Database models for Diesel
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::row::{event_to_row, EventRow};
use shared::{CalendarEvent, CalendarEventMapping, CalendarSource, EventSource, SourceKind};
use uuid::Uuid;

/// Database representation of calendar_events.
/// Decoded into the domain model through [`shared::row::row_to_event`].
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::calendar_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventRecord {
    pub id: Uuid,
    pub child_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub event_type: String,
    pub home_id: Option<Uuid>,
    pub from_home_id: Option<Uuid>,
    pub to_home_id: Option<Uuid>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub status: String,
    pub proposed_by: Option<Uuid>,
    pub proposal_reason: Option<String>,
    pub confirmed_by: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub source: String,
    pub external_provider: Option<String>,
    pub external_calendar_id: Option<String>,
    pub external_event_id: Option<String>,
    pub external_html_link: Option<String>,
    pub is_read_only: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl EventRecord {
    /// Whether an import would leave this row as it is
    pub fn same_import(&self, other: &EventRecord) -> bool {
        self.title == other.title
            && self.description == other.description
            && self.start_at == other.start_at
            && self.end_at == other.end_at
            && self.all_day == other.all_day
            && self.event_type == other.event_type
            && self.home_id == other.home_id
            && self.from_home_id == other.from_home_id
            && self.to_home_id == other.to_home_id
            && self.from_location == other.from_location
            && self.to_location == other.to_location
            && self.external_provider == other.external_provider
            && self.external_calendar_id == other.external_calendar_id
            && self.external_event_id == other.external_event_id
            && self.external_html_link == other.external_html_link
    }
}

impl From<EventRecord> for EventRow {
    fn from(record: EventRecord) -> Self {
        EventRow {
            id: Some(record.id),
            child_id: Some(record.child_id),
            title: Some(record.title),
            description: record.description,
            start_at: Some(record.start_at),
            end_at: Some(record.end_at),
            all_day: Some(record.all_day),
            event_type: Some(record.event_type),
            home_id: record.home_id,
            from_home_id: record.from_home_id,
            to_home_id: record.to_home_id,
            from_location: record.from_location,
            to_location: record.to_location,
            status: Some(record.status),
            proposed_by: record.proposed_by,
            proposal_reason: record.proposal_reason,
            confirmed_by: record.confirmed_by,
            confirmed_at: record.confirmed_at,
            rejected_by: record.rejected_by,
            rejected_at: record.rejected_at,
            source: Some(record.source),
            external_provider: record.external_provider,
            external_calendar_id: record.external_calendar_id,
            external_event_id: record.external_event_id,
            external_html_link: record.external_html_link,
            is_read_only: Some(record.is_read_only),
            created_by: record.created_by,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
            is_deleted: Some(record.is_deleted),
        }
    }
}

impl From<&CalendarEvent> for EventRecord {
    fn from(event: &CalendarEvent) -> Self {
        let row = event_to_row(event);
        EventRecord {
            id: event.id,
            child_id: event.child_id,
            title: event.title.clone(),
            description: row.description,
            start_at: event.start_at,
            end_at: event.end_at,
            all_day: event.all_day,
            event_type: event.event_type().as_str().to_string(),
            home_id: row.home_id,
            from_home_id: row.from_home_id,
            to_home_id: row.to_home_id,
            from_location: row.from_location,
            to_location: row.to_location,
            status: event.status.as_str().to_string(),
            proposed_by: event.proposed_by,
            proposal_reason: row.proposal_reason,
            confirmed_by: event.confirmed_by,
            confirmed_at: event.confirmed_at,
            rejected_by: event.rejected_by,
            rejected_at: event.rejected_at,
            source: event.source.as_str().to_string(),
            external_provider: row.external_provider,
            external_calendar_id: row.external_calendar_id,
            external_event_id: row.external_event_id,
            external_html_link: row.external_html_link,
            is_read_only: event.is_read_only,
            created_by: event.created_by,
            created_at: event.created_at,
            updated_at: event.updated_at,
            is_deleted: event.is_deleted,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::calendar_event_mappings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MappingRecord {
    pub source_id: Uuid,
    pub external_event_id: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<MappingRecord> for CalendarEventMapping {
    fn from(record: MappingRecord) -> Self {
        CalendarEventMapping {
            source_id: record.source_id,
            external_event_id: record.external_event_id,
            event_id: record.event_id,
        }
    }
}

/// Database representation of calendar_sources.
/// The provider-specific columns (`calendar_id`, `url_hash`) are folded into
/// [`SourceKind`] on the way out.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::calendar_sources)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SourceRecord {
    pub id: Uuid,
    pub child_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub provider: String,
    pub calendar_id: Option<String>,
    pub url_hash: Option<String>,
    pub credentials_encrypted: String,
    pub enabled: bool,
    pub sync_requested: bool,
    pub sync_status: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SourceRecord> for CalendarSource {
    fn from(record: SourceRecord) -> Self {
        let provider = record.provider.parse().unwrap_or(EventSource::Ics);
        let kind = match provider {
            EventSource::Google => SourceKind::Google {
                calendar_id: record.calendar_id.unwrap_or_else(|| "primary".to_string()),
            },
            _ => SourceKind::Ics {
                url_hash: record.url_hash.unwrap_or_default(),
            },
        };
        CalendarSource {
            id: record.id,
            child_id: record.child_id,
            owner_id: record.owner_id,
            name: record.name,
            provider,
            kind,
            credentials_encrypted: record.credentials_encrypted,
            enabled: record.enabled,
            sync_requested: record.sync_requested,
            sync_status: record.sync_status.parse().unwrap_or(shared::SyncStatus::Pending),
            last_synced_at: record.last_synced_at,
            last_sync_error: record.last_sync_error,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::row::row_to_event;
    use shared::{EventKind, EventStatus, ExternalRef, TravelEndpoint};

    fn travel_event() -> CalendarEvent {
        let now = Utc::now();
        CalendarEvent {
            id: Uuid::new_v4(),
            child_id: Uuid::new_v4(),
            title: "Drive to school".to_string(),
            description: Some("Carpool".to_string()),
            start_at: now,
            end_at: now + chrono::Duration::hours(1),
            all_day: false,
            kind: EventKind::Travel {
                from: TravelEndpoint::Home(Uuid::new_v4()),
                to: TravelEndpoint::Location("School".to_string()),
            },
            status: EventStatus::Confirmed,
            proposed_by: None,
            proposal_reason: None,
            confirmed_by: None,
            confirmed_at: None,
            rejected_by: None,
            rejected_at: None,
            source: EventSource::Google,
            external: Some(ExternalRef {
                provider: "google".to_string(),
                calendar_id: Some("primary".to_string()),
                event_id: "evt1".to_string(),
                html_link: None,
            }),
            is_read_only: true,
            created_by: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }

    #[test]
    fn records_decode_back_into_the_same_event() {
        let event = travel_event();
        let record = EventRecord::from(&event);
        assert_eq!(record.event_type, "travel");
        assert_eq!(record.to_location.as_deref(), Some("School"));
        assert_eq!(row_to_event(EventRow::from(record)).unwrap(), event);
    }

    #[test]
    fn source_columns_fold_into_kind() {
        let now = Utc::now();
        let record = SourceRecord {
            id: Uuid::new_v4(),
            child_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "School calendar".to_string(),
            provider: "ics".to_string(),
            calendar_id: None,
            url_hash: Some("abc".to_string()),
            credentials_encrypted: "ciphertext".to_string(),
            enabled: true,
            sync_requested: false,
            sync_status: "bogus".to_string(),
            last_synced_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        };
        let source = CalendarSource::from(record);
        assert_eq!(source.kind, SourceKind::Ics { url_hash: "abc".to_string() });
        assert_eq!(source.sync_status, shared::SyncStatus::Pending);
    }
}
