pub mod api;

use async_trait::async_trait;
use shared::api::{
    CreateEventRequest, CreateTravelRequest, ListEventsQuery, ProposeHomeDayRequest,
    ProposeHomeDayResponse, UpdateEventRequest,
};
use shared::{CalendarEvent, EnrichedEvent};
use thiserror::Error;
use uuid::Uuid;

pub use api::HttpCalendarService;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The server refused the request; `message` is meant for the user.
    #[error("{message}")]
    Rejected { code: String, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn code(&self) -> &str {
        match self {
            ServiceError::Rejected { code, .. } => code,
            ServiceError::Transport(_) => "transport",
            ServiceError::Decode(_) => "decode",
        }
    }
}

/// Calendar operations as seen by one signed-in caregiver
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_events(&self, query: &ListEventsQuery)
        -> Result<Vec<EnrichedEvent>, ServiceError>;

    /// Date-unscoped proposals the caregiver can decide
    async fn pending(&self, child_id: Uuid) -> Result<Vec<EnrichedEvent>, ServiceError>;

    async fn propose_home_day(
        &self,
        request: ProposeHomeDayRequest,
    ) -> Result<ProposeHomeDayResponse, ServiceError>;

    async fn confirm_home_day(&self, event_id: Uuid) -> Result<CalendarEvent, ServiceError>;

    async fn reject_home_day(&self, event_id: Uuid) -> Result<CalendarEvent, ServiceError>;

    async fn create_event(&self, request: CreateEventRequest)
        -> Result<CalendarEvent, ServiceError>;

    async fn create_travel(
        &self,
        request: CreateTravelRequest,
    ) -> Result<CalendarEvent, ServiceError>;

    async fn update_event(
        &self,
        event_id: Uuid,
        request: UpdateEventRequest,
    ) -> Result<CalendarEvent, ServiceError>;

    async fn delete_event(&self, event_id: Uuid) -> Result<(), ServiceError>;
}
