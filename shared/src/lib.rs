//! Shared calendar types for the homeday workspace.
//!
//! - `models`: the calendar event domain model and its tagged variants
//! - `row`: mapping between storage rows and domain events
//! - `dates`: month/week grids and date range display strings
//! - `colors`: home color derivation from display names
//! - `home_stay`: matching event text against a child's home names
//! - `error`: the workflow error taxonomy
//! - `api`: request/response bodies exchanged with the HTTP layer

pub mod api;
pub mod colors;
pub mod dates;
pub mod error;
pub mod home_stay;
pub mod models;
pub mod row;

pub use error::{WorkflowError, WorkflowResult};
pub use models::*;
