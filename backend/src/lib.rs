//! Homeday backend: the calendar workflow engine, its storage seams and the
//! HTTP surface over them.

pub mod actions;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod home_stay;
pub mod models;
pub mod roster;
pub mod routes;
pub mod schema;
pub mod state;
pub mod store;

pub use actions::{CalendarActions, OverlapPolicy, WorkflowConfig};
pub use home_stay::HomeStayFinder;
pub use roster::{Roster, StaticRoster};
pub use routes::create_app;
pub use state::AppState;
pub use store::{EventStore, ExternalEventStore, MemoryStore, SourceStore};
