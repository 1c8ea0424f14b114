use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Storage tag for the kind of calendar record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    HomeDay,
    Travel,
    Event,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::HomeDay => "home_day",
            EventType::Travel => "travel",
            EventType::Event => "event",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home_day" => Ok(EventType::HomeDay),
            "travel" => Ok(EventType::Travel),
            "event" => Ok(EventType::Event),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

/// Confirmation status of a calendar record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Proposed,
    Rejected,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Confirmed => "confirmed",
            EventStatus::Proposed => "proposed",
            EventStatus::Rejected => "rejected",
        }
    }

    /// Confirmed and rejected records accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Proposed)
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(EventStatus::Confirmed),
            "proposed" => Ok(EventStatus::Proposed),
            "rejected" => Ok(EventStatus::Rejected),
            other => Err(format!("unknown event status '{}'", other)),
        }
    }
}

/// Where a calendar record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Manual,
    Google,
    Apple,
    Outlook,
    Ics,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Manual => "manual",
            EventSource::Google => "google",
            EventSource::Apple => "apple",
            EventSource::Outlook => "outlook",
            EventSource::Ics => "ics",
        }
    }

    pub fn is_external(&self) -> bool {
        !matches!(self, EventSource::Manual)
    }
}

impl FromStr for EventSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(EventSource::Manual),
            "google" => Ok(EventSource::Google),
            "apple" => Ok(EventSource::Apple),
            "outlook" => Ok(EventSource::Outlook),
            "ics" => Ok(EventSource::Ics),
            other => Err(format!("unknown event source '{}'", other)),
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of a travel segment: a known home or free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelEndpoint {
    Home(Uuid),
    Location(String),
}

impl TravelEndpoint {
    pub fn home_id(&self) -> Option<Uuid> {
        match self {
            TravelEndpoint::Home(id) => Some(*id),
            TravelEndpoint::Location(_) => None,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            TravelEndpoint::Home(_) => None,
            TravelEndpoint::Location(text) => Some(text),
        }
    }

    /// Build an endpoint from the nullable column pair; a blank location
    /// counts as absent and a home id wins when both are present.
    pub fn from_parts(home_id: Option<Uuid>, location: Option<&str>) -> Option<Self> {
        match (home_id, location.map(str::trim).filter(|l| !l.is_empty())) {
            (Some(id), _) => Some(TravelEndpoint::Home(id)),
            (None, Some(text)) => Some(TravelEndpoint::Location(text.to_string())),
            (None, None) => None,
        }
    }
}

/// Type-specific payload of a calendar record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    HomeDay {
        home_id: Uuid,
    },
    Travel {
        from: TravelEndpoint,
        to: TravelEndpoint,
    },
    Event,
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::HomeDay { .. } => EventType::HomeDay,
            EventKind::Travel { .. } => EventType::Travel,
            EventKind::Event => EventType::Event,
        }
    }

    pub fn home_id(&self) -> Option<Uuid> {
        match self {
            EventKind::HomeDay { home_id } => Some(*home_id),
            _ => None,
        }
    }
}

/// Identity of the foreign record an imported row mirrors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRef {
    pub provider: String,
    pub calendar_id: Option<String>,
    pub event_id: String,
    pub html_link: Option<String>,
}

/// Calendar event, scoped to exactly one child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub child_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub kind: EventKind,
    pub status: EventStatus,
    pub proposed_by: Option<Uuid>,
    pub proposal_reason: Option<String>,
    pub confirmed_by: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub source: EventSource,
    pub external: Option<ExternalRef>,
    pub is_read_only: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl CalendarEvent {
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    pub fn is_pending(&self) -> bool {
        self.status == EventStatus::Proposed
    }

    /// Inclusive overlap with `[start, end]`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        crate::dates::overlaps(self.start_at, self.end_at, start, end)
    }
}

/// Insert input for a new calendar row; the store assigns id and audit times
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalendarEvent {
    pub child_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub kind: EventKind,
    pub status: EventStatus,
    pub proposed_by: Option<Uuid>,
    pub proposal_reason: Option<String>,
    pub source: EventSource,
    pub external: Option<ExternalRef>,
    pub is_read_only: bool,
    pub created_by: Option<Uuid>,
}

impl NewCalendarEvent {
    /// A manual, already-confirmed row with no proposal audit.
    pub fn manual(
        child_id: Uuid,
        title: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        kind: EventKind,
        created_by: Uuid,
    ) -> Self {
        Self {
            child_id,
            title: title.into(),
            description: None,
            start_at,
            end_at,
            all_day: false,
            kind,
            status: EventStatus::Confirmed,
            proposed_by: None,
            proposal_reason: None,
            source: EventSource::Manual,
            external: None,
            is_read_only: false,
            created_by: Some(created_by),
        }
    }
}

/// Editable fields of a manual event after merging a patch
#[derive(Debug, Clone, PartialEq)]
pub struct EventDetails {
    pub title: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
}

/// Forward-only status change applied by the store as check-and-set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    Confirm { by: Uuid, at: DateTime<Utc> },
    Reject { by: Uuid, at: DateTime<Utc> },
}

impl StatusTransition {
    pub fn target(&self) -> EventStatus {
        match self {
            StatusTransition::Confirm { .. } => EventStatus::Confirmed,
            StatusTransition::Reject { .. } => EventStatus::Rejected,
        }
    }
}

/// Store-level listing query. A `None` range means unscoped by date.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub child_id: Uuid,
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub event_types: Option<Vec<EventType>>,
    pub statuses: Option<Vec<EventStatus>>,
    pub include_rejected: bool,
}

impl EventQuery {
    pub fn for_child(child_id: Uuid) -> Self {
        Self {
            child_id,
            range: None,
            event_types: None,
            statuses: None,
            include_rejected: false,
        }
    }

    /// Whether a non-deleted row satisfies every narrowing clause.
    pub fn matches(&self, event: &CalendarEvent) -> bool {
        if event.is_deleted || event.child_id != self.child_id {
            return false;
        }
        if let Some((start, end)) = self.range {
            if !event.overlaps(start, end) {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.contains(&event.event_type()) {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&event.status) {
                return false;
            }
        }
        self.include_rejected || event.status != EventStatus::Rejected
    }
}

/// A home a child can stay at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Home {
    pub id: Uuid,
    pub name: String,
}

/// Display model returned by the listing path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event: CalendarEvent,
    pub home_name: Option<String>,
    pub home_color: Option<String>,
    pub from_label: Option<String>,
    pub to_label: Option<String>,
    pub proposed_by_name: Option<String>,
    pub confirmed_by_name: Option<String>,
    pub rejected_by_name: Option<String>,
    pub created_by_name: Option<String>,
    pub date_label: String,
    pub eligible_confirmers: Vec<Uuid>,
    pub can_confirm: bool,
    pub can_reject: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

/// Result of proposing a home-day; callers report the two cases differently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "event", rename_all = "snake_case")]
pub enum ProposeOutcome {
    SentForConfirmation(CalendarEvent),
    AutoConfirmed(CalendarEvent),
}

impl ProposeOutcome {
    pub fn event(&self) -> &CalendarEvent {
        match self {
            ProposeOutcome::SentForConfirmation(event) | ProposeOutcome::AutoConfirmed(event) => {
                event
            }
        }
    }

    pub fn into_event(self) -> CalendarEvent {
        match self {
            ProposeOutcome::SentForConfirmation(event) | ProposeOutcome::AutoConfirmed(event) => {
                event
            }
        }
    }

    pub fn is_auto_confirmed(&self) -> bool {
        matches!(self, ProposeOutcome::AutoConfirmed(_))
    }
}

/// How strongly an imported event suggests a stay at a known home
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    TitleNamesHome,
    LocationNamesHome,
    TitleMentionsHomeWords,
    LocationMentionsHomeWords,
    NoMatch,
}

/// Imported event classified against the child's homes; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeStayCandidate {
    pub source_id: Uuid,
    pub external_event_id: String,
    pub title: String,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub all_day: bool,
    pub home_id: Option<Uuid>,
    pub confidence: Option<MatchConfidence>,
    pub reason: MatchReason,
}

impl HomeStayCandidate {
    pub fn is_match(&self) -> bool {
        self.home_id.is_some()
    }
}

/// Links one foreign event to the local row mirroring it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventMapping {
    pub source_id: Uuid,
    pub external_event_id: String,
    pub event_id: Uuid,
}

/// Last known state of a source's sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Success,
    Failed,
    AuthRequired,
}

impl SyncStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
            SyncStatus::AuthRequired => "auth_required",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            "auth_required" => Ok(SyncStatus::AuthRequired),
            other => Err(format!("unknown sync status '{}'", other)),
        }
    }
}

/// Provider-specific part of a connected calendar source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// OAuth-connected Google calendar; credentials hold the token set
    Google { calendar_id: String },
    /// Subscribed ICS/webcal feed; credentials hold the feed URL
    Ics { url_hash: String },
}

/// External calendar connected for one child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSource {
    pub id: Uuid,
    pub child_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub provider: EventSource,
    pub kind: SourceKind,
    /// base64(iv || tag || ciphertext), never the plain secret
    pub credentials_encrypted: String,
    pub enabled: bool,
    pub sync_requested: bool,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert input for a new source
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalendarSource {
    pub child_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub provider: EventSource,
    pub kind: SourceKind,
    pub credentials_encrypted: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event(status: EventStatus) -> CalendarEvent {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        CalendarEvent {
            id: Uuid::new_v4(),
            child_id: Uuid::new_v4(),
            title: "Dad's house".to_string(),
            description: None,
            start_at: start,
            end_at: start + chrono::Duration::days(2),
            all_day: true,
            kind: EventKind::HomeDay {
                home_id: Uuid::new_v4(),
            },
            status,
            proposed_by: None,
            proposal_reason: None,
            confirmed_by: None,
            confirmed_at: None,
            rejected_by: None,
            rejected_at: None,
            source: EventSource::Manual,
            external: None,
            is_read_only: false,
            created_by: None,
            created_at: start,
            updated_at: start,
            is_deleted: false,
        }
    }

    #[test]
    fn enum_strings_round_trip_through_storage_form() {
        for ty in [EventType::HomeDay, EventType::Travel, EventType::Event] {
            assert_eq!(ty.as_str().parse::<EventType>().unwrap(), ty);
        }
        assert!("holiday".parse::<EventType>().is_err());
        assert_eq!("ics".parse::<EventSource>().unwrap(), EventSource::Ics);
    }

    #[test]
    fn travel_endpoint_prefers_home_and_ignores_blank_text() {
        let home = Uuid::new_v4();
        assert_eq!(
            TravelEndpoint::from_parts(Some(home), Some("School")),
            Some(TravelEndpoint::Home(home))
        );
        assert_eq!(TravelEndpoint::from_parts(None, Some("   ")), None);
        assert_eq!(
            TravelEndpoint::from_parts(None, Some(" Airport ")),
            Some(TravelEndpoint::Location("Airport".to_string()))
        );
    }

    #[test]
    fn query_hides_rejected_and_deleted_rows_by_default() {
        let rejected = sample_event(EventStatus::Rejected);
        let mut query = EventQuery::for_child(rejected.child_id);
        assert!(!query.matches(&rejected));

        query.include_rejected = true;
        assert!(query.matches(&rejected));

        let mut deleted = sample_event(EventStatus::Confirmed);
        deleted.is_deleted = true;
        assert!(!EventQuery::for_child(deleted.child_id).matches(&deleted));
    }

    #[test]
    fn query_range_is_an_inclusive_overlap() {
        let event = sample_event(EventStatus::Confirmed);
        let mut query = EventQuery::for_child(event.child_id);
        query.range = Some((event.end_at, event.end_at + chrono::Duration::days(3)));
        assert!(query.matches(&event));

        query.range = Some((
            event.end_at + chrono::Duration::seconds(1),
            event.end_at + chrono::Duration::days(3),
        ));
        assert!(!query.matches(&event));
    }
}
