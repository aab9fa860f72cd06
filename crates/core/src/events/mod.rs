//! Acquisition events for the presentation layer.

#[allow(clippy::module_inception)]
mod events;
mod handle;
mod reporter;

pub use events::*;
pub use handle::{EventEnvelope, EventHandle};
pub(crate) use handle::emit_to;
pub use reporter::{create_event_system, EventReporter, EventTally};
