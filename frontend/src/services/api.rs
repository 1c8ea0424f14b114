use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::api::{
    CreateEventRequest, CreateTravelRequest, ErrorResponse, EventResponse, ListEventsQuery,
    ListEventsResponse, PendingResponse, ProposeHomeDayRequest, ProposeHomeDayResponse,
    UpdateEventRequest,
};
use shared::{CalendarEvent, EnrichedEvent};
use uuid::Uuid;

use super::{CalendarService, ServiceError};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Header the gateway fills with the signed-in user's id
const USER_ID_HEADER: &str = "x-user-id";

/// [`CalendarService`] over the backend's JSON API
pub struct HttpCalendarService {
    client: Client,
    base_url: String,
    user_id: Uuid,
}

impl HttpCalendarService {
    pub fn new(base_url: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ServiceError> {
        let response = request
            .header(USER_ID_HEADER, self.user_id.to_string())
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => ServiceError::Rejected {
                code: error.error,
                message: error.message,
            },
            Err(_) => ServiceError::Transport(format!("HTTP error: {}", status)),
        })
    }
}

#[async_trait]
impl CalendarService for HttpCalendarService {
    async fn list_events(
        &self,
        query: &ListEventsQuery,
    ) -> Result<Vec<EnrichedEvent>, ServiceError> {
        let request = self.client.get(self.url("/events")).query(query);
        let body: ListEventsResponse = self.send(request).await?;
        Ok(body.events)
    }

    async fn pending(&self, child_id: Uuid) -> Result<Vec<EnrichedEvent>, ServiceError> {
        let request = self
            .client
            .get(self.url("/events/pending"))
            .query(&[("child_id", child_id)]);
        let body: PendingResponse = self.send(request).await?;
        Ok(body.events)
    }

    async fn propose_home_day(
        &self,
        request: ProposeHomeDayRequest,
    ) -> Result<ProposeHomeDayResponse, ServiceError> {
        self.send(self.client.post(self.url("/events/home-days")).json(&request))
            .await
    }

    async fn confirm_home_day(&self, event_id: Uuid) -> Result<CalendarEvent, ServiceError> {
        let path = format!("/events/{}/confirm", event_id);
        let body: EventResponse = self.send(self.client.post(self.url(&path))).await?;
        Ok(body.event)
    }

    async fn reject_home_day(&self, event_id: Uuid) -> Result<CalendarEvent, ServiceError> {
        let path = format!("/events/{}/reject", event_id);
        let body: EventResponse = self.send(self.client.post(self.url(&path))).await?;
        Ok(body.event)
    }

    async fn create_event(
        &self,
        request: CreateEventRequest,
    ) -> Result<CalendarEvent, ServiceError> {
        let body: EventResponse = self
            .send(self.client.post(self.url("/events")).json(&request))
            .await?;
        Ok(body.event)
    }

    async fn create_travel(
        &self,
        request: CreateTravelRequest,
    ) -> Result<CalendarEvent, ServiceError> {
        let body: EventResponse = self
            .send(self.client.post(self.url("/events/travel")).json(&request))
            .await?;
        Ok(body.event)
    }

    async fn update_event(
        &self,
        event_id: Uuid,
        request: UpdateEventRequest,
    ) -> Result<CalendarEvent, ServiceError> {
        let path = format!("/events/{}", event_id);
        let body: EventResponse = self
            .send(self.client.put(self.url(&path)).json(&request))
            .await?;
        Ok(body.event)
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<(), ServiceError> {
        let path = format!("/events/{}", event_id);
        self.execute(self.client.delete(self.url(&path))).await?;
        Ok(())
    }
}
