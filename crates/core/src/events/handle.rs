use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::AcquisitionEvent;

/// Envelope wrapping an event with its emission time
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AcquisitionEvent,
}

/// Handle for emitting acquisition events
///
/// Cheaply cloneable; events go through an async channel to the reporter.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventHandle {
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity.
    ///
    /// A closed channel is logged, never propagated to the caller.
    pub async fn emit(&self, event: AcquisitionEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit event: {}", e);
        }
    }
}

/// Emit through an optional handle.
pub(crate) async fn emit_to(handle: &Option<EventHandle>, event: AcquisitionEvent) {
    if let Some(handle) = handle {
        handle.emit(event).await;
    }
}
