//! Storage row shape of a calendar event and its mapping to the domain model.
//!
//! The relational store keeps one denormalized table with mostly-null
//! type-specific columns. The row is decoded into an [`EventKind`] by its
//! `event_type` tag, never by probing which optional columns are present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CalendarEvent, EventKind, EventSource, EventStatus, EventType, ExternalRef, TravelEndpoint,
};

/// One row of the `calendar_events` table; every column may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: Option<Uuid>,
    pub child_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
    pub event_type: Option<String>,
    pub home_id: Option<Uuid>,
    pub from_home_id: Option<Uuid>,
    pub to_home_id: Option<Uuid>,
    pub from_location: Option<String>,
    pub to_location: Option<String>,
    pub status: Option<String>,
    pub proposed_by: Option<Uuid>,
    pub proposal_reason: Option<String>,
    pub confirmed_by: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub external_provider: Option<String>,
    pub external_calendar_id: Option<String>,
    pub external_event_id: Option<String>,
    pub external_html_link: Option<String>,
    pub is_read_only: Option<bool>,
    pub created_by: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_deleted: Option<bool>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("calendar row is missing required column '{0}'")]
    MissingField(&'static str),

    #[error("calendar row {0} ends before it starts")]
    InvertedRange(Uuid),
}

/// Decode a storage row.
///
/// Only `id`, `child_id`, `start_at` and `end_at` fault the caller; every
/// other column falls back to a default (`source = manual`,
/// `is_read_only = false`, `status = confirmed`, `event_type = event`).
/// A typed row whose type-specific columns are missing degrades to a plain
/// event.
pub fn row_to_event(row: EventRow) -> Result<CalendarEvent, RowError> {
    let id = row.id.ok_or(RowError::MissingField("id"))?;
    let child_id = row.child_id.ok_or(RowError::MissingField("child_id"))?;
    let start_at = row.start_at.ok_or(RowError::MissingField("start_at"))?;
    let end_at = row.end_at.ok_or(RowError::MissingField("end_at"))?;
    if end_at < start_at {
        return Err(RowError::InvertedRange(id));
    }

    let event_type = row
        .event_type
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(EventType::Event);

    let kind = match event_type {
        EventType::HomeDay => row
            .home_id
            .map(|home_id| EventKind::HomeDay { home_id })
            .unwrap_or(EventKind::Event),
        EventType::Travel => {
            let from = TravelEndpoint::from_parts(row.from_home_id, row.from_location.as_deref());
            let to = TravelEndpoint::from_parts(row.to_home_id, row.to_location.as_deref());
            match (from, to) {
                (Some(from), Some(to)) => EventKind::Travel { from, to },
                _ => EventKind::Event,
            }
        }
        EventType::Event => EventKind::Event,
    };

    let status = match kind {
        // plain events are always confirmed
        EventKind::Event => EventStatus::Confirmed,
        _ => row
            .status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(EventStatus::Confirmed),
    };

    let source = row
        .source
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(EventSource::Manual);

    let external = row.external_event_id.map(|event_id| ExternalRef {
        provider: row
            .external_provider
            .unwrap_or_else(|| source.as_str().to_string()),
        calendar_id: row.external_calendar_id,
        event_id,
        html_link: row.external_html_link,
    });

    let created_at = row.created_at.unwrap_or(start_at);

    Ok(CalendarEvent {
        id,
        child_id,
        title: row.title.unwrap_or_default(),
        description: row.description.filter(|d| !d.is_empty()),
        start_at,
        end_at,
        all_day: row.all_day.unwrap_or(false),
        kind,
        status,
        proposed_by: row.proposed_by,
        proposal_reason: row.proposal_reason,
        confirmed_by: row.confirmed_by,
        confirmed_at: row.confirmed_at,
        rejected_by: row.rejected_by,
        rejected_at: row.rejected_at,
        source,
        external,
        is_read_only: row.is_read_only.unwrap_or(source.is_external()),
        created_by: row.created_by,
        created_at,
        updated_at: row.updated_at.unwrap_or(created_at),
        is_deleted: row.is_deleted.unwrap_or(false),
    })
}

/// Encode a domain event into its storage row.
pub fn event_to_row(event: &CalendarEvent) -> EventRow {
    let (home_id, from, to) = match &event.kind {
        EventKind::HomeDay { home_id } => (Some(*home_id), None, None),
        EventKind::Travel { from, to } => (None, Some(from), Some(to)),
        EventKind::Event => (None, None, None),
    };
    let external = event.external.as_ref();

    EventRow {
        id: Some(event.id),
        child_id: Some(event.child_id),
        title: Some(event.title.clone()),
        description: event.description.clone(),
        start_at: Some(event.start_at),
        end_at: Some(event.end_at),
        all_day: Some(event.all_day),
        event_type: Some(event.event_type().as_str().to_string()),
        home_id,
        from_home_id: from.and_then(TravelEndpoint::home_id),
        to_home_id: to.and_then(TravelEndpoint::home_id),
        from_location: from.and_then(|e| e.location().map(str::to_string)),
        to_location: to.and_then(|e| e.location().map(str::to_string)),
        status: Some(event.status.as_str().to_string()),
        proposed_by: event.proposed_by,
        proposal_reason: event.proposal_reason.clone(),
        confirmed_by: event.confirmed_by,
        confirmed_at: event.confirmed_at,
        rejected_by: event.rejected_by,
        rejected_at: event.rejected_at,
        source: Some(event.source.as_str().to_string()),
        external_provider: external.map(|e| e.provider.clone()),
        external_calendar_id: external.and_then(|e| e.calendar_id.clone()),
        external_event_id: external.map(|e| e.event_id.clone()),
        external_html_link: external.and_then(|e| e.html_link.clone()),
        is_read_only: Some(event.is_read_only),
        created_by: event.created_by,
        created_at: Some(event.created_at),
        updated_at: Some(event.updated_at),
        is_deleted: Some(event.is_deleted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minimal_row() -> EventRow {
        EventRow {
            id: Some(Uuid::new_v4()),
            child_id: Some(Uuid::new_v4()),
            start_at: Some(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()),
            end_at: Some(Utc.with_ymd_and_hms(2025, 1, 12, 23, 59, 59).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn missing_optional_columns_fall_back_to_defaults() {
        let event = row_to_event(minimal_row()).unwrap();
        assert_eq!(event.source, EventSource::Manual);
        assert!(!event.is_read_only);
        assert_eq!(event.kind, EventKind::Event);
        assert_eq!(event.status, EventStatus::Confirmed);
        assert_eq!(event.title, "");
        assert_eq!(event.updated_at, event.created_at);
    }

    #[test]
    fn missing_required_columns_fault() {
        let mut row = minimal_row();
        row.child_id = None;
        assert_eq!(row_to_event(row), Err(RowError::MissingField("child_id")));

        let mut row = minimal_row();
        row.end_at = None;
        assert_eq!(row_to_event(row), Err(RowError::MissingField("end_at")));
    }

    #[test]
    fn rows_decode_by_type_tag() {
        let home = Uuid::new_v4();
        let mut row = minimal_row();
        row.event_type = Some("home_day".to_string());
        row.home_id = Some(home);
        row.status = Some("proposed".to_string());
        let event = row_to_event(row).unwrap();
        assert_eq!(event.kind, EventKind::HomeDay { home_id: home });
        assert_eq!(event.status, EventStatus::Proposed);

        // a stray home_id on a plain event is ignored
        let mut row = minimal_row();
        row.event_type = Some("event".to_string());
        row.home_id = Some(home);
        row.status = Some("proposed".to_string());
        let event = row_to_event(row).unwrap();
        assert_eq!(event.kind, EventKind::Event);
        assert_eq!(event.status, EventStatus::Confirmed);
    }

    #[test]
    fn travel_rows_need_both_endpoints() {
        let home = Uuid::new_v4();
        let mut row = minimal_row();
        row.event_type = Some("travel".to_string());
        row.from_home_id = Some(home);
        row.to_location = Some("Airport".to_string());
        let event = row_to_event(row.clone()).unwrap();
        assert_eq!(
            event.kind,
            EventKind::Travel {
                from: TravelEndpoint::Home(home),
                to: TravelEndpoint::Location("Airport".to_string()),
            }
        );

        row.to_location = Some("".to_string());
        assert_eq!(row_to_event(row).unwrap().kind, EventKind::Event);
    }

    #[test]
    fn external_rows_without_the_flag_stay_read_only() {
        for provider in ["google", "apple", "ics", "outlook"] {
            let mut row = minimal_row();
            row.source = Some(provider.to_string());
            assert!(row_to_event(row).unwrap().is_read_only, "{}", provider);
        }

        let mut row = minimal_row();
        row.source = Some("manual".to_string());
        assert!(!row_to_event(row).unwrap().is_read_only);
    }

    #[test]
    fn encoding_then_decoding_preserves_imported_provenance() {
        let mut row = minimal_row();
        row.source = Some("google".to_string());
        row.is_read_only = Some(true);
        row.external_event_id = Some("abc123".to_string());
        row.external_calendar_id = Some("primary".to_string());
        let event = row_to_event(row).unwrap();
        assert_eq!(event.external.as_ref().unwrap().provider, "google");

        let again = row_to_event(event_to_row(&event)).unwrap();
        assert_eq!(again, event);
    }
}
