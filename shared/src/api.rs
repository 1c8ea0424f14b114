use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    CalendarEvent, EnrichedEvent, EventSource, EventStatus, EventType, HomeStayCandidate,
    ProposeOutcome, SyncStatus,
};

// ============================================================================
// Event API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ProposeHomeDayRequest {
    pub child_id: Uuid,
    pub home_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,

    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateEventRequest {
    pub child_id: Uuid,

    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTravelRequest {
    pub child_id: Uuid,

    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,

    pub from_home_id: Option<Uuid>,
    #[validate(length(max = 200))]
    pub from_location: Option<String>,
    pub to_home_id: Option<Uuid>,
    #[validate(length(max = 200))]
    pub to_location: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub all_day: Option<bool>,
}

impl UpdateEventRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start_at.is_none()
            && self.end_at.is_none()
            && self.all_day.is_none()
    }
}

/// Listing filter. `event_types` and `statuses` are comma separated
/// storage strings so they survive a query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListEventsQuery {
    pub child_id: Uuid,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub event_types: Option<String>,
    pub statuses: Option<String>,
    #[serde(default)]
    pub include_rejected: bool,
}

impl ListEventsQuery {
    pub fn parsed_event_types(&self) -> Result<Option<Vec<EventType>>, String> {
        parse_list(self.event_types.as_deref())
    }

    pub fn parsed_statuses(&self) -> Result<Option<Vec<EventStatus>>, String> {
        parse_list(self.statuses.as_deref())
    }
}

fn parse_list<T>(raw: Option<&str>) -> Result<Option<Vec<T>>, String>
where
    T: std::str::FromStr<Err = String>,
{
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<T>, String>>()
            .map(Some),
    }
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub child_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub event: CalendarEvent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProposeHomeDayResponse {
    pub auto_confirmed: bool,
    pub message: String,
    pub event: CalendarEvent,
}

impl From<ProposeOutcome> for ProposeHomeDayResponse {
    fn from(outcome: ProposeOutcome) -> Self {
        let auto_confirmed = outcome.is_auto_confirmed();
        let message = if auto_confirmed {
            "Home day auto-confirmed"
        } else {
            "Home day sent for confirmation"
        };
        Self {
            auto_confirmed,
            message: message.to_string(),
            event: outcome.into_event(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListEventsResponse {
    pub events: Vec<EnrichedEvent>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    pub events: Vec<EnrichedEvent>,
    pub count: usize,
}

// ============================================================================
// Home-stay Suggestion Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CandidatesQuery {
    pub child_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CandidatesResponse {
    pub candidates: Vec<HomeStayCandidate>,
    pub count: usize,
}

/// Names a suggestion by its upstream event; the server re-derives the rest
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ProposeCandidateRequest {
    pub child_id: Uuid,
    pub source_id: Uuid,

    #[validate(length(min = 1, max = 1024))]
    pub external_event_id: String,
}

// ============================================================================
// Sync API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerSyncRequest {
    pub child_id: Uuid,
    pub source_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerSyncResponse {
    pub triggered: bool,
    pub message: String,
    pub source_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SyncStatusQuery {
    pub child_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub sources: Vec<SyncSourceStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncSourceStatus {
    pub source_id: Uuid,
    pub source_name: String,
    pub provider: EventSource,
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_requested: bool,
    pub error: Option<String>,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn title_length_is_bounded() {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        let mut req = CreateEventRequest {
            child_id: Uuid::new_v4(),
            title: String::new(),
            description: None,
            start_at: start,
            end_at: start,
            all_day: true,
        };
        assert!(req.validate().is_err());

        req.title = "Soccer".to_string();
        assert!(req.validate().is_ok());

        req.title = "x".repeat(201);
        assert!(req.validate().is_err());
    }

    #[test]
    fn list_filters_parse_from_comma_separated_strings() {
        let query = ListEventsQuery {
            child_id: Uuid::new_v4(),
            event_types: Some("home_day, travel".to_string()),
            statuses: Some("proposed".to_string()),
            ..Default::default()
        };
        assert_eq!(
            query.parsed_event_types().unwrap(),
            Some(vec![EventType::HomeDay, EventType::Travel])
        );
        assert_eq!(query.parsed_statuses().unwrap(), Some(vec![EventStatus::Proposed]));

        let bad = ListEventsQuery {
            statuses: Some("maybe".to_string()),
            ..query
        };
        assert!(bad.parsed_statuses().is_err());
    }
}
