//! Calendar sync: imports Google and ICS calendars into read-only local
//! rows and spots imported events that look like a stay at a home.

pub mod config;
pub mod crypto;
pub mod external;
pub mod google;
pub mod home_stay;
pub mod ics;
pub mod scheduler;
pub mod sources;
pub mod sync;

pub use scheduler::PollingScheduler;
pub use sources::SourceRegistry;
pub use sync::{SourceError, SyncBatch, SyncEngine, SyncReport};
