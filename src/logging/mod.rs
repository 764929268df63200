//! Persistent history of events, actions, state changes and rule transitions
//!
//! The [`LogEngine`] owns a single SQLite connection and serializes all
//! reads and writes through one background task. See the submodules for
//! the pieces it is built from.

pub mod database;
pub mod engine;
pub mod entry;
pub mod error;
pub mod filter;
pub mod job;
mod queue;
pub mod types;
pub mod value;

pub use engine::{EngineStats, LogEngine, LogEngineEvent};
pub use entry::{LogEntry, LoggingEventType, LoggingLevel, LoggingSource};
pub use error::{LogEngineError, Result};
pub use filter::{LogFilter, TimeRange};
pub use job::{DatabaseJob, FetchJob, LogEntriesFetchJob, ThingsFetchJob};
pub use queue::{DEFAULT_FLOOD_LIMIT, DEFAULT_MAX_QUEUE_LENGTH};
pub use types::{Action, BrowserAction, BrowserItemAction, Event, Param, Rule, RuleId, ThingId};
pub use value::{deserialize_value, serialize_value, LogValue};
