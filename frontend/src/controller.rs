//! # Calendar controller
//!
//! Owns the view state and talks to a [`CalendarService`]. Every mutation
//! waits for the server, then re-fetches the visible range and the pending
//! count; local state is never patched speculatively.
//!
//! Each listing request carries a generation number. Responses from an
//! older generation than the newest request are dropped by the reducer, so
//! a slow fetch for a month the user already left cannot overwrite the
//! current one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use shared::api::{
    CreateEventRequest, CreateTravelRequest, ProposeHomeDayRequest, ProposeHomeDayResponse,
    UpdateEventRequest,
};
use shared::CalendarEvent;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::{CalendarService, ServiceError};
use crate::state::{reduce, CalendarAction, CalendarState, CalendarView, FilterToggle};

pub const DEFAULT_REFRESH_DEBOUNCE: Duration = Duration::from_millis(250);

pub struct CalendarController<S> {
    service: S,
    state: Mutex<CalendarState>,
    generation: AtomicU64,
    refresh_requests: AtomicU64,
    debounce: Duration,
}

impl<S: CalendarService + 'static> CalendarController<S> {
    pub fn new(service: S, child_id: Uuid, today: NaiveDate) -> Self {
        Self {
            service,
            state: Mutex::new(CalendarState::new(child_id, today)),
            generation: AtomicU64::new(0),
            refresh_requests: AtomicU64::new(0),
            debounce: DEFAULT_REFRESH_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub async fn state(&self) -> CalendarState {
        self.state.lock().await.clone()
    }

    async fn dispatch(&self, action: CalendarAction) {
        let mut state = self.state.lock().await;
        *state = reduce(state.clone(), action);
    }

    /// Fetch the visible range and the pending count.
    pub async fn refresh(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.dispatch(CalendarAction::LoadStarted { generation }).await;
        let (query, child_id) = {
            let state = self.state.lock().await;
            (state.list_query(), state.child_id)
        };

        let (listed, pending) = futures::join!(
            self.service.list_events(&query),
            self.service.pending(child_id)
        );

        match listed {
            Ok(events) => {
                debug!(generation, events = events.len(), "Calendar refreshed");
                self.dispatch(CalendarAction::Loaded { generation, events }).await;
            }
            Err(err) => {
                warn!(generation, error = %err, "Calendar refresh failed");
                self.dispatch(CalendarAction::LoadFailed {
                    generation,
                    message: err.to_string(),
                })
                .await;
            }
        }
        match pending {
            Ok(pending) => self.dispatch(CalendarAction::PendingCounted(pending.len())).await,
            Err(err) => warn!(error = %err, "Pending count failed"),
        }
    }

    /// Refresh once the burst of requests has been quiet for the debounce
    /// period. Only the last request in a burst fetches.
    pub fn request_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let ticket = self.refresh_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(controller.debounce).await;
            if controller.refresh_requests.load(Ordering::SeqCst) == ticket {
                controller.refresh().await;
            }
        })
    }

    pub async fn go_to_date(&self, date: NaiveDate) {
        self.dispatch(CalendarAction::GoToDate(date)).await;
        self.refresh().await;
    }

    pub async fn next_month(&self) {
        self.dispatch(CalendarAction::NextMonth).await;
        self.refresh().await;
    }

    pub async fn previous_month(&self) {
        self.dispatch(CalendarAction::PreviousMonth).await;
        self.refresh().await;
    }

    pub async fn set_view(&self, view: CalendarView) {
        self.dispatch(CalendarAction::SetView(view)).await;
        self.refresh().await;
    }

    pub async fn toggle_filter(&self, toggle: FilterToggle) {
        self.dispatch(CalendarAction::ToggleFilter(toggle)).await;
        self.refresh().await;
    }

    pub async fn select(&self, event_id: Option<Uuid>) {
        self.dispatch(CalendarAction::Select(event_id)).await;
    }

    pub async fn dismiss_error(&self) {
        self.dispatch(CalendarAction::DismissError).await;
    }

    pub async fn propose_home_day(
        &self,
        request: ProposeHomeDayRequest,
    ) -> Result<ProposeHomeDayResponse, ServiceError> {
        let result = self.service.propose_home_day(request).await;
        self.settle(result).await
    }

    pub async fn confirm_home_day(&self, event_id: Uuid) -> Result<CalendarEvent, ServiceError> {
        let result = self.service.confirm_home_day(event_id).await;
        self.settle(result).await
    }

    pub async fn reject_home_day(&self, event_id: Uuid) -> Result<CalendarEvent, ServiceError> {
        let result = self.service.reject_home_day(event_id).await;
        self.settle(result).await
    }

    pub async fn create_event(
        &self,
        request: CreateEventRequest,
    ) -> Result<CalendarEvent, ServiceError> {
        let result = self.service.create_event(request).await;
        self.settle(result).await
    }

    pub async fn create_travel(
        &self,
        request: CreateTravelRequest,
    ) -> Result<CalendarEvent, ServiceError> {
        let result = self.service.create_travel(request).await;
        self.settle(result).await
    }

    pub async fn update_event(
        &self,
        event_id: Uuid,
        request: UpdateEventRequest,
    ) -> Result<CalendarEvent, ServiceError> {
        let result = self.service.update_event(event_id, request).await;
        self.settle(result).await
    }

    pub async fn delete_event(&self, event_id: Uuid) -> Result<(), ServiceError> {
        let result = self.service.delete_event(event_id).await;
        self.settle(result).await
    }

    /// After a mutation: re-fetch either way, since a refused decision
    /// usually means the row changed under us, then surface any failure.
    async fn settle<T>(&self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        self.refresh().await;
        if let Err(err) = &result {
            self.dispatch(CalendarAction::MutationFailed(err.to_string())).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backend::actions::{EventPatch, HomeDayProposal, NewEvent};
    use backend::{CalendarActions, MemoryStore, StaticRoster};
    use chrono::{DateTime, TimeZone, Utc};
    use shared::api::ListEventsQuery;
    use shared::{EnrichedEvent, EventQuery, EventStatus, WorkflowError};
    use std::sync::atomic::AtomicUsize;

    /// Service backed by the real workflow over the in-memory store, acting
    /// as one caregiver
    struct LocalService {
        actions: Arc<CalendarActions>,
        viewer: Uuid,
        list_calls: AtomicUsize,
        /// Delay applied to the first listing only
        first_list_delay: Option<Duration>,
    }

    fn rejected(err: WorkflowError) -> ServiceError {
        ServiceError::Rejected {
            code: err.code().to_string(),
            message: err.user_message(),
        }
    }

    #[async_trait]
    impl CalendarService for LocalService {
        async fn list_events(
            &self,
            query: &ListEventsQuery,
        ) -> Result<Vec<EnrichedEvent>, ServiceError> {
            let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let (0, Some(delay)) = (call, self.first_list_delay) {
                tokio::time::sleep(delay).await;
            }
            let query = EventQuery {
                child_id: query.child_id,
                range: query.start.zip(query.end),
                event_types: query.parsed_event_types().map_err(ServiceError::Decode)?,
                statuses: query.parsed_statuses().map_err(ServiceError::Decode)?,
                include_rejected: query.include_rejected,
            };
            self.actions
                .list_events(&query, self.viewer)
                .await
                .map_err(rejected)
        }

        async fn pending(&self, child_id: Uuid) -> Result<Vec<EnrichedEvent>, ServiceError> {
            self.actions
                .pending_confirmations(child_id, self.viewer)
                .await
                .map_err(rejected)
        }

        async fn propose_home_day(
            &self,
            request: ProposeHomeDayRequest,
        ) -> Result<ProposeHomeDayResponse, ServiceError> {
            let proposal = HomeDayProposal {
                child_id: request.child_id,
                home_id: request.home_id,
                start_at: request.start_at,
                end_at: request.end_at,
                all_day: request.all_day,
                reason: request.reason,
            };
            self.actions
                .propose_home_day(proposal, self.viewer)
                .await
                .map(Into::into)
                .map_err(rejected)
        }

        async fn confirm_home_day(&self, event_id: Uuid) -> Result<CalendarEvent, ServiceError> {
            self.actions
                .confirm_home_day(event_id, self.viewer)
                .await
                .map_err(rejected)
        }

        async fn reject_home_day(&self, event_id: Uuid) -> Result<CalendarEvent, ServiceError> {
            self.actions
                .reject_home_day(event_id, self.viewer)
                .await
                .map_err(rejected)
        }

        async fn create_event(
            &self,
            request: CreateEventRequest,
        ) -> Result<CalendarEvent, ServiceError> {
            let input = NewEvent {
                child_id: request.child_id,
                title: request.title,
                description: request.description,
                start_at: request.start_at,
                end_at: request.end_at,
                all_day: request.all_day,
            };
            self.actions
                .create_event(input, self.viewer)
                .await
                .map_err(rejected)
        }

        async fn create_travel(
            &self,
            _request: CreateTravelRequest,
        ) -> Result<CalendarEvent, ServiceError> {
            Err(ServiceError::Transport("not used".to_string()))
        }

        async fn update_event(
            &self,
            event_id: Uuid,
            request: UpdateEventRequest,
        ) -> Result<CalendarEvent, ServiceError> {
            self.actions
                .update_event(event_id, EventPatch::from(request), self.viewer)
                .await
                .map_err(rejected)
        }

        async fn delete_event(&self, event_id: Uuid) -> Result<(), ServiceError> {
            self.actions
                .delete_event(event_id, self.viewer)
                .await
                .map_err(rejected)
        }
    }

    struct Family {
        child: Uuid,
        mom: Uuid,
        dad: Uuid,
        dads_house: Uuid,
        actions: Arc<CalendarActions>,
    }

    fn family() -> Family {
        let (child, mom, dad, dads_house) =
            (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let roster = StaticRoster::new()
            .with_guardian(child, mom, "Mom")
            .with_guardian(child, dad, "Dad")
            .with_home(child, dads_house, "Dad's house");
        let actions = CalendarActions::new(Arc::new(MemoryStore::new()), Arc::new(roster));
        Family {
            child,
            mom,
            dad,
            dads_house,
            actions: Arc::new(actions),
        }
    }

    fn controller_for(f: &Family, viewer: Uuid) -> CalendarController<LocalService> {
        controller_with_delay(f, viewer, None)
    }

    fn controller_with_delay(
        f: &Family,
        viewer: Uuid,
        first_list_delay: Option<Duration>,
    ) -> CalendarController<LocalService> {
        let service = LocalService {
            actions: f.actions.clone(),
            viewer,
            list_calls: AtomicUsize::new(0),
            first_list_delay,
        };
        let today = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        CalendarController::new(service, f.child, today)
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap()
    }

    fn weekend(f: &Family) -> ProposeHomeDayRequest {
        ProposeHomeDayRequest {
            child_id: f.child,
            home_id: f.dads_house,
            start_at: at(10),
            end_at: at(12),
            all_day: true,
            reason: Some("Soccer tournament".to_string()),
        }
    }

    #[tokio::test]
    async fn proposing_refreshes_the_other_parents_badge() {
        let f = family();
        let dad = controller_for(&f, f.dad);
        let mom = controller_for(&f, f.mom);

        let response = dad.propose_home_day(weekend(&f)).await.unwrap();
        assert!(!response.auto_confirmed);

        let dad_state = dad.state().await;
        assert_eq!(dad_state.events.len(), 1);
        assert_eq!(dad_state.pending_count, 0);

        mom.refresh().await;
        let mom_state = mom.state().await;
        assert_eq!(mom_state.pending_count, 1);
        assert!(mom_state.events[0].can_confirm);

        mom.confirm_home_day(response.event.id).await.unwrap();
        let mom_state = mom.state().await;
        assert_eq!(mom_state.pending_count, 0);
        assert_eq!(mom_state.events[0].event.status, EventStatus::Confirmed);
    }

    #[tokio::test]
    async fn pending_count_ignores_the_visible_month() {
        let f = family();
        let dad = controller_for(&f, f.dad);
        let mom = controller_for(&f, f.mom);
        dad.propose_home_day(weekend(&f)).await.unwrap();

        mom.next_month().await;
        let state = mom.state().await;
        assert!(state.events.is_empty());
        assert_eq!(state.pending_count, 1);
    }

    #[tokio::test]
    async fn refused_mutations_surface_the_server_message() {
        let f = family();
        let dad = controller_for(&f, f.dad);
        let response = dad.propose_home_day(weekend(&f)).await.unwrap();

        let err = dad.confirm_home_day(response.event.id).await.unwrap_err();
        assert_eq!(err.code(), "forbidden");
        let state = dad.state().await;
        assert_eq!(state.error.as_deref(), Some(err.to_string().as_str()));

        dad.dismiss_error().await;
        assert_eq!(dad.state().await.error, None);
    }

    #[tokio::test]
    async fn filters_narrow_the_listing() {
        let f = family();
        let dad = controller_for(&f, f.dad);
        dad.propose_home_day(weekend(&f)).await.unwrap();
        dad.create_event(CreateEventRequest {
            child_id: f.child,
            title: "Dentist".to_string(),
            description: None,
            start_at: at(14),
            end_at: at(14),
            all_day: true,
        })
        .await
        .unwrap();
        assert_eq!(dad.state().await.events.len(), 2);

        dad.toggle_filter(FilterToggle::Pending).await;
        let state = dad.state().await;
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.events[0].event.title, "Dentist");

        dad.toggle_filter(FilterToggle::Events).await;
        assert!(dad.state().await.events.is_empty());
    }

    #[tokio::test]
    async fn overlapping_refreshes_keep_the_newest() {
        let f = family();
        let dad = Arc::new(controller_with_delay(
            &f,
            f.dad,
            Some(Duration::from_millis(100)),
        ));
        f.actions
            .create_event(
                NewEvent {
                    child_id: f.child,
                    title: "Recital".to_string(),
                    description: None,
                    start_at: at(20),
                    end_at: at(20),
                    all_day: true,
                },
                f.dad,
            )
            .await
            .unwrap();

        // first refresh sleeps; the second (for February) lands first
        let first = {
            let dad = dad.clone();
            tokio::spawn(async move { dad.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        dad.next_month().await;
        first.await.unwrap();

        let state = dad.state().await;
        assert_eq!(state.current_date.format("%Y-%m").to_string(), "2025-02");
        assert!(state.events.is_empty());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn refresh_requests_are_debounced() {
        let f = family();
        let dad = Arc::new(controller_for(&f, f.dad).with_debounce(Duration::from_millis(20)));

        let handles: Vec<_> = (0..3).map(|_| dad.request_refresh()).collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(dad.service.list_calls.load(Ordering::SeqCst), 1);
    }
}
