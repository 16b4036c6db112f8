pub mod error;
pub mod models;
pub mod provider;
pub mod selector;

pub use error::{EventError, EventResult};
pub use models::{parse_event_timestamp, parse_score, sanitize_file_stem, Event, SourcedRecord};
pub use provider::{parse_events_payload, EventSource, SportsDbClient};
pub use selector::{EventSelector, SelectionStats, SelectionWindow};
