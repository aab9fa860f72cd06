use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{AcquisitionEvent, EventEnvelope, EventHandle};

/// Counts of what the reporter saw before its channel closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTally {
    pub total: usize,
    pub failures: usize,
}

/// Background task that renders acquisition events through `tracing`.
pub struct EventReporter {
    rx: mpsc::Receiver<EventEnvelope>,
}

impl EventReporter {
    pub fn new(rx: mpsc::Receiver<EventEnvelope>) -> Self {
        Self { rx }
    }

    /// Run until every handle is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) -> EventTally {
        let mut tally = EventTally::default();

        while let Some(envelope) = self.rx.recv().await {
            tally.total += 1;
            if envelope.event.is_failure() {
                tally.failures += 1;
            }
            render(&envelope);
        }

        tally
    }
}

fn render(envelope: &EventEnvelope) {
    let at = envelope.timestamp.format("%H:%M:%S");
    match &envelope.event {
        AcquisitionEvent::RunStarted { wanted } => {
            info!("[{}] Run started with {} wanted item(s)", at, wanted)
        }
        AcquisitionEvent::SearchCompleted {
            query,
            responses,
            fallback,
        } => info!(
            "[{}] Search '{}' returned {} response(s){}",
            at,
            query,
            responses,
            if *fallback { " (fallback)" } else { "" }
        ),
        AcquisitionEvent::MatchFound {
            title,
            filename,
            peer,
            filetype,
            score,
        } => info!(
            "[{}] Match for '{}': {} from {} [{}] score {:.3}",
            at, title, filename, peer, filetype, score
        ),
        AcquisitionEvent::DownloadEnqueued { title, peer, files } => {
            info!("[{}] Enqueued {} file(s) of '{}' from {}", at, files, title, peer)
        }
        AcquisitionEvent::FileRequeued {
            title,
            filename,
            retry_count,
        } => info!(
            "[{}] Requeued {} for '{}' (retry {})",
            at, filename, title, retry_count
        ),
        AcquisitionEvent::DownloadCompleted { title, peer } => {
            info!("[{}] Downloaded '{}' from {}", at, title, peer)
        }
        AcquisitionEvent::DownloadAborted {
            title,
            peer,
            reason,
        } => warn!("[{}] Aborted '{}' from {}: {}", at, title, peer, reason),
        AcquisitionEvent::ItemFailed {
            author,
            title,
            reason,
        } => warn!("[{}] Failed {} - {}: {}", at, author, title, reason),
        AcquisitionEvent::FileImported { title, author_dir } => {
            info!("[{}] Filed '{}' under {}", at, title, author_dir)
        }
        AcquisitionEvent::FileQuarantined { title, reason } => {
            warn!("[{}] Quarantined '{}': {}", at, title, reason)
        }
        AcquisitionEvent::ImportCommandFinished { path, status } => {
            info!("[{}] Import of {} finished: {}", at, path, status)
        }
        AcquisitionEvent::RunFinished { succeeded, failed } => info!(
            "[{}] Run finished: {} succeeded, {} failed",
            at, succeeded, failed
        ),
    }
}

/// Create a connected handle and reporter.
///
/// Spawn the reporter with `tokio::spawn(reporter.run())`; it finishes once
/// every clone of the handle has been dropped.
pub fn create_event_system(buffer_size: usize) -> (EventHandle, EventReporter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventHandle::new(tx), EventReporter::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reporter_tallies_until_closed() {
        let (handle, reporter) = create_event_system(10);
        let task = tokio::spawn(reporter.run());

        handle.emit(AcquisitionEvent::RunStarted { wanted: 2 }).await;
        handle
            .emit(AcquisitionEvent::ItemFailed {
                author: "Frank Herbert".to_string(),
                title: "Dune".to_string(),
                reason: "no match".to_string(),
            })
            .await;
        drop(handle);

        let tally = task.await.unwrap();
        assert_eq!(
            tally,
            EventTally {
                total: 2,
                failures: 1
            }
        );
    }
}
