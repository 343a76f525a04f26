//! Structured event log.
//!
//! Every scheduler decision, device action, and auth flow lands here as an
//! append-only row keyed by a monotonic id. The dashboard consumes events
//! over REST and SSE; operators resolve them. Failure to write an event never
//! propagates: it is reported to the tracing sink instead, so a broken store
//! cannot take a worker down with it.

mod sink;
mod types;

pub use sink::{EventFilter, EventSink, NewEvent};
pub use types::{event_type, Category, Severity};
