//! Client-side calendar view: state, reducer and a controller that keeps
//! the state in step with the server.

pub mod controller;
pub mod services;
pub mod state;

pub use controller::CalendarController;
pub use services::{CalendarService, HttpCalendarService, ServiceError};
pub use state::{reduce, CalendarAction, CalendarState, CalendarView, FilterToggle, Filters};
