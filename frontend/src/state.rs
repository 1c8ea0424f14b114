//! View state for the family calendar and its reducer.
//!
//! The state holds only what the screen needs: the visible month, the view
//! mode, the filter toggles and the last listing fetched for them. Business
//! rules stay on the server; `can_*` flags arrive precomputed on each
//! [`EnrichedEvent`].

use chrono::{DateTime, Months, NaiveDate, Utc};
use shared::api::ListEventsQuery;
use shared::dates::{month_bounds, month_grid_range, day_end, day_start, DEFAULT_WEEK_START};
use shared::{EnrichedEvent, EventStatus, EventType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CalendarView {
    #[default]
    Month,
    Agenda,
}

/// Independent display toggles, AND-combined with the visible range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub show_home_days: bool,
    pub show_travel: bool,
    pub show_events: bool,
    pub show_pending: bool,
    pub show_rejected: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            show_home_days: true,
            show_travel: true,
            show_events: true,
            show_pending: true,
            show_rejected: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterToggle {
    HomeDays,
    Travel,
    Events,
    Pending,
    Rejected,
}

impl Filters {
    pub fn toggled(mut self, toggle: FilterToggle) -> Self {
        let flag = match toggle {
            FilterToggle::HomeDays => &mut self.show_home_days,
            FilterToggle::Travel => &mut self.show_travel,
            FilterToggle::Events => &mut self.show_events,
            FilterToggle::Pending => &mut self.show_pending,
            FilterToggle::Rejected => &mut self.show_rejected,
        };
        *flag = !*flag;
        self
    }

    /// Event types to ask for; `None` when every type is shown.
    fn event_types(&self) -> Option<Vec<EventType>> {
        let types: Vec<EventType> = [
            (self.show_home_days, EventType::HomeDay),
            (self.show_travel, EventType::Travel),
            (self.show_events, EventType::Event),
        ]
        .into_iter()
        .filter_map(|(shown, t)| shown.then_some(t))
        .collect();
        (types.len() < 3).then_some(types)
    }

    /// Statuses to ask for; `None` when the server default applies.
    fn statuses(&self) -> Option<Vec<EventStatus>> {
        if self.show_pending {
            return None;
        }
        let mut statuses = vec![EventStatus::Confirmed];
        if self.show_rejected {
            statuses.push(EventStatus::Rejected);
        }
        Some(statuses)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarState {
    pub child_id: Uuid,
    pub current_date: NaiveDate,
    pub view: CalendarView,
    pub filters: Filters,
    pub events: Vec<EnrichedEvent>,
    pub selected_event: Option<Uuid>,
    pub pending_count: usize,
    pub loading: bool,
    pub error: Option<String>,
    /// Generation of the newest listing request; older responses are
    /// dropped.
    pub generation: u64,
}

impl CalendarState {
    pub fn new(child_id: Uuid, today: NaiveDate) -> Self {
        Self {
            child_id,
            current_date: today,
            view: CalendarView::default(),
            filters: Filters::default(),
            events: Vec::new(),
            selected_event: None,
            pending_count: 0,
            loading: false,
            error: None,
            generation: 0,
        }
    }

    /// UTC span the current view displays: the whole month grid, or the
    /// calendar month for the agenda.
    pub fn visible_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match self.view {
            CalendarView::Month => month_grid_range(self.current_date, DEFAULT_WEEK_START),
            CalendarView::Agenda => {
                let (first, last) = month_bounds(self.current_date);
                (day_start(first), day_end(last))
            }
        }
    }

    /// Server query for the visible range under the current filters
    pub fn list_query(&self) -> ListEventsQuery {
        let (start, end) = self.visible_range();
        ListEventsQuery {
            child_id: self.child_id,
            start: Some(start),
            end: Some(end),
            event_types: self.filters.event_types().map(|t| join(&t, EventType::as_str)),
            statuses: self.filters.statuses().map(|s| join(&s, EventStatus::as_str)),
            include_rejected: self.filters.show_rejected,
        }
    }

    pub fn selected(&self) -> Option<&EnrichedEvent> {
        let id = self.selected_event?;
        self.events.iter().find(|e| e.event.id == id)
    }
}

fn join<T>(items: &[T], as_str: fn(&T) -> &'static str) -> String {
    items.iter().map(as_str).collect::<Vec<_>>().join(",")
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalendarAction {
    GoToDate(NaiveDate),
    NextMonth,
    PreviousMonth,
    SetView(CalendarView),
    ToggleFilter(FilterToggle),
    Select(Option<Uuid>),
    LoadStarted { generation: u64 },
    Loaded { generation: u64, events: Vec<EnrichedEvent> },
    LoadFailed { generation: u64, message: String },
    PendingCounted(usize),
    MutationFailed(String),
    DismissError,
}

/// Apply one action. Pure; the controller owns all I/O.
pub fn reduce(mut state: CalendarState, action: CalendarAction) -> CalendarState {
    match action {
        CalendarAction::GoToDate(date) => state.current_date = date,
        CalendarAction::NextMonth => {
            state.current_date = shift_month(state.current_date, true);
        }
        CalendarAction::PreviousMonth => {
            state.current_date = shift_month(state.current_date, false);
        }
        CalendarAction::SetView(view) => state.view = view,
        CalendarAction::ToggleFilter(toggle) => state.filters = state.filters.toggled(toggle),
        CalendarAction::Select(id) => state.selected_event = id,
        CalendarAction::LoadStarted { generation } => {
            state.generation = state.generation.max(generation);
            state.loading = true;
        }
        CalendarAction::Loaded { generation, events } => {
            if generation == state.generation {
                if let Some(id) = state.selected_event {
                    if !events.iter().any(|e| e.event.id == id) {
                        state.selected_event = None;
                    }
                }
                state.events = events;
                state.loading = false;
                state.error = None;
            }
        }
        CalendarAction::LoadFailed {
            generation,
            message,
        } => {
            if generation == state.generation {
                state.loading = false;
                state.error = Some(message);
            }
        }
        CalendarAction::PendingCounted(count) => state.pending_count = count,
        CalendarAction::MutationFailed(message) => state.error = Some(message),
        CalendarAction::DismissError => state.error = None,
    }
    state
}

/// Same day next/previous month, clamped to the month's last day.
fn shift_month(date: NaiveDate, forward: bool) -> NaiveDate {
    let shifted = if forward {
        date.checked_add_months(Months::new(1))
    } else {
        date.checked_sub_months(Months::new(1))
    };
    shifted.unwrap_or(date)
}
