//! Polling state machine for in-flight downloads.
//!
//! Each tick refreshes every file's transfer state, then decides per record:
//! abort on the stalled or remote-queue timeouts, handle failed files
//! (rejection accounting, bounded requeue), or finish once every file has
//! succeeded. Aborting cancels the remote transfers before deleting the local
//! partial directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::DownloadConfig;
use crate::events::{emit_to, AcquisitionEvent, EventHandle};
use crate::fileshare::{FileShare, TransferState};
use crate::metrics;

use super::{AbortReason, DownloadEnqueuer, DownloadRecord};

/// Result of one pass over the active set.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Records whose files all succeeded, removed from the active set.
    pub completed: Vec<DownloadRecord>,
    /// Records given up on, removed from the active set.
    pub aborted: Vec<(DownloadRecord, AbortReason)>,
}

/// Result of monitoring a batch until it settled.
#[derive(Debug, Default)]
pub struct MonitorReport {
    pub completed: Vec<DownloadRecord>,
    pub aborted: Vec<(DownloadRecord, AbortReason)>,
}

enum Verdict {
    Pending,
    Succeeded,
    Abort(AbortReason),
}

/// Drives download records to a terminal state.
pub struct DownloadMonitor {
    fileshare: Arc<dyn FileShare>,
    enqueuer: DownloadEnqueuer,
    config: DownloadConfig,
    download_dir: PathBuf,
    events: Option<EventHandle>,
}

impl DownloadMonitor {
    pub fn new(
        fileshare: Arc<dyn FileShare>,
        enqueuer: DownloadEnqueuer,
        config: DownloadConfig,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            fileshare,
            enqueuer,
            config,
            download_dir,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    /// Tick until no record is left active.
    pub async fn run(&self, records: Vec<DownloadRecord>) -> MonitorReport {
        let mut active = records;
        let mut report = MonitorReport::default();
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        info!(downloads = active.len(), "Monitoring downloads");
        while !active.is_empty() {
            let tick = self.tick(&mut active, Utc::now()).await;
            report.completed.extend(tick.completed);
            report.aborted.extend(tick.aborted);

            if active.is_empty() {
                break;
            }
            debug!(remaining = active.len(), "Downloads still in flight");
            tokio::time::sleep(poll).await;
        }

        info!(
            completed = report.completed.len(),
            aborted = report.aborted.len(),
            "All downloads settled"
        );
        report
    }

    /// One pass over the active set at time `now`.
    ///
    /// Finished and aborted records are removed from `active`; everything
    /// else stays for the next tick.
    pub async fn tick(&self, active: &mut Vec<DownloadRecord>, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for mut record in std::mem::take(active) {
            self.refresh(&mut record).await;

            match self.evaluate(&mut record, now).await {
                Verdict::Pending => active.push(record),
                Verdict::Succeeded => {
                    info!(title = %record.title, peer = %record.peer, "Download complete");
                    metrics::DOWNLOADS_COMPLETED.inc();
                    metrics::DOWNLOAD_DURATION
                        .with_label_values(&["succeeded"])
                        .observe(elapsed_secs(&record, now));
                    emit_to(
                        &self.events,
                        AcquisitionEvent::DownloadCompleted {
                            title: record.title.clone(),
                            peer: record.peer.clone(),
                        },
                    )
                    .await;
                    report.completed.push(record);
                }
                Verdict::Abort(reason) => {
                    warn!(title = %record.title, peer = %record.peer, %reason, "Aborting download");
                    self.cancel_and_delete(&record).await;
                    metrics::DOWNLOADS_ABORTED
                        .with_label_values(&[reason.label()])
                        .inc();
                    metrics::DOWNLOAD_DURATION
                        .with_label_values(&["aborted"])
                        .observe(elapsed_secs(&record, now));
                    emit_to(
                        &self.events,
                        AcquisitionEvent::DownloadAborted {
                            title: record.title.clone(),
                            peer: record.peer.clone(),
                            reason: reason.to_string(),
                        },
                    )
                    .await;
                    report.aborted.push((record, reason));
                }
            }
        }

        report
    }

    /// Query every file's transfer state. Failed queries leave the status
    /// unknown and count once against the record.
    async fn refresh(&self, record: &mut DownloadRecord) {
        let mut failed_query = false;
        for file in &mut record.files {
            match self
                .fileshare
                .get_transfer(&record.peer, &file.transfer_id)
                .await
            {
                Ok(entry) => file.status = Some(entry.state),
                Err(e) => {
                    debug!(file = %file.filename, error = %e, "Transfer status unavailable");
                    file.status = None;
                    failed_query = true;
                }
            }
        }
        if failed_query {
            record.error_count += 1;
        }
    }

    async fn evaluate(&self, record: &mut DownloadRecord, now: DateTime<Utc>) -> Verdict {
        let elapsed = now.signed_duration_since(record.start_time);
        let file_count = record.files.len();

        if elapsed.num_seconds() >= self.config.stalled_timeout_secs as i64 {
            return Verdict::Abort(AbortReason::Stalled);
        }

        let remotely_queued = record
            .files
            .iter()
            .filter(|f| f.status == Some(TransferState::QueuedRemotely))
            .count();
        if remotely_queued == file_count
            && elapsed.num_seconds() >= self.config.remote_queue_timeout_secs as i64
        {
            return Verdict::Abort(AbortReason::RemoteQueueTimeout);
        }

        let problems: Vec<usize> = record
            .files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.status.is_some_and(|s| s.is_problem()))
            .map(|(i, _)| i)
            .collect();

        if !problems.is_empty() {
            let rejected = problems
                .iter()
                .filter(|&&i| record.files[i].status == Some(TransferState::Rejected))
                .count();

            if problems.len() == file_count && rejected > 0 {
                return Verdict::Abort(AbortReason::AllRejected);
            }

            if rejected > 0 {
                record.rejected_retries += rejected as u32;
                let allowance = self.config.rejected_retry_factor * file_count as f64;
                if record.rejected_retries as f64 > allowance {
                    return Verdict::Abort(AbortReason::TooManyRejections);
                }
            }

            for i in problems {
                // Every failure counts, the last allowed one aborts instead of requeueing
                record.files[i].retry_count += 1;
                if record.files[i].retry_count >= self.config.max_file_retries {
                    return Verdict::Abort(AbortReason::RetriesExhausted(
                        record.files[i].filename.clone(),
                    ));
                }

                match self.enqueuer.requeue(&record.peer, &record.files[i]).await {
                    Ok(transfer_id) => {
                        let file = &mut record.files[i];
                        file.transfer_id = transfer_id;
                        file.status = None;
                        metrics::RETRY_ATTEMPTS.inc();
                        info!(
                            file = %file.filename,
                            retry = file.retry_count,
                            "Requeued failed transfer"
                        );
                        emit_to(
                            &self.events,
                            AcquisitionEvent::FileRequeued {
                                title: record.title.clone(),
                                filename: file.filename.clone(),
                                retry_count: file.retry_count,
                            },
                        )
                        .await;
                    }
                    Err(e) => {
                        error!(file = %record.files[i].filename, error = %e, "Requeue failed");
                        return Verdict::Abort(AbortReason::RequeueFailed(
                            record.files[i].filename.clone(),
                        ));
                    }
                }
            }
        }

        if record.all_succeeded() {
            Verdict::Succeeded
        } else {
            Verdict::Pending
        }
    }

    /// Cancel every tracked transfer, then remove the local partial directory.
    async fn cancel_and_delete(&self, record: &DownloadRecord) {
        for file in &record.files {
            if let Err(e) = self
                .fileshare
                .cancel_transfer(&record.peer, &file.transfer_id)
                .await
            {
                warn!(file = %file.filename, error = %e, "Failed to cancel transfer");
            }
        }

        let local_dir = record.local_dir(&self.download_dir);
        if record.source_dir.is_empty() || !local_dir.is_dir() {
            return;
        }
        match tokio::fs::remove_dir_all(&local_dir).await {
            Ok(()) => debug!(dir = %local_dir.display(), "Removed partial download"),
            Err(e) => warn!(dir = %local_dir.display(), error = %e, "Failed to remove partial download"),
        }
    }
}

fn elapsed_secs(record: &DownloadRecord, now: DateTime<Utc>) -> f64 {
    now.signed_duration_since(record.start_time)
        .num_milliseconds()
        .max(0) as f64
        / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::TrackedFile;
    use crate::testing::{fixtures, MockFileShare};
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn config() -> DownloadConfig {
        DownloadConfig {
            stalled_timeout_secs: 3600,
            remote_queue_timeout_secs: 300,
            poll_interval_ms: 0,
            enqueue_attempts: 2,
            enqueue_poll_interval_ms: 0,
            max_file_retries: 5,
            rejected_retry_factor: 1.2,
        }
    }

    struct Harness {
        share: Arc<MockFileShare>,
        monitor: DownloadMonitor,
        enqueuer: DownloadEnqueuer,
        dir: TempDir,
    }

    fn harness() -> Harness {
        let share = Arc::new(MockFileShare::new());
        let enqueuer = DownloadEnqueuer::new(share.clone(), &config());
        let dir = TempDir::new().unwrap();
        let monitor = DownloadMonitor::new(
            share.clone(),
            enqueuer.clone(),
            config(),
            dir.path().to_path_buf(),
        );
        Harness {
            share,
            monitor,
            enqueuer,
            dir,
        }
    }

    /// Enqueue `names` (bare names under `Books\Herbert`) and build a record.
    async fn record(h: &Harness, names: &[&str]) -> DownloadRecord {
        let files: Vec<_> = names
            .iter()
            .map(|n| crate::fileshare::RemoteFile::new("alice", format!("Books\\Herbert\\{}", n), 10))
            .collect();
        let tracked = h.enqueuer.enqueue("alice", &files).await.unwrap();
        DownloadRecord::new(
            &fixtures::target("Dune", "Frank Herbert"),
            "alice",
            "Books\\Herbert",
            tracked,
            Utc::now(),
        )
    }

    async fn set(h: &Harness, name: &str, state: TransferState) {
        h.share
            .set_state_by_filename(&format!("Books\\Herbert\\{}", name), state)
            .await;
    }

    #[tokio::test]
    async fn test_all_succeeded_completes() {
        let h = harness();
        let rec = record(&h, &["a.epub", "b.epub"]).await;
        set(&h, "a.epub", TransferState::Succeeded).await;
        set(&h, "b.epub", TransferState::Succeeded).await;

        let mut active = vec![rec];
        let tick = h.monitor.tick(&mut active, Utc::now()).await;
        assert!(active.is_empty());
        assert_eq!(tick.completed.len(), 1);
        assert!(tick.aborted.is_empty());
    }

    #[tokio::test]
    async fn test_in_progress_stays_active() {
        let h = harness();
        let rec = record(&h, &["a.epub"]).await;
        set(&h, "a.epub", TransferState::InProgress).await;

        let mut active = vec![rec];
        let tick = h.monitor.tick(&mut active, Utc::now()).await;
        assert_eq!(active.len(), 1);
        assert!(tick.completed.is_empty());
        assert!(tick.aborted.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_record_aborts_even_if_in_progress() {
        let h = harness();
        let rec = record(&h, &["a.epub"]).await;
        set(&h, "a.epub", TransferState::InProgress).await;
        let now = rec.start_time + ChronoDuration::seconds(3601);

        let mut active = vec![rec];
        let tick = h.monitor.tick(&mut active, now).await;
        assert!(active.is_empty());
        assert_eq!(tick.aborted.len(), 1);
        assert_eq!(tick.aborted[0].1, AbortReason::Stalled);
    }

    #[tokio::test]
    async fn test_remote_queue_timeout() {
        let h = harness();
        let rec = record(&h, &["a.epub", "b.epub"]).await;
        set(&h, "a.epub", TransferState::QueuedRemotely).await;
        set(&h, "b.epub", TransferState::QueuedRemotely).await;
        let start = rec.start_time;

        let mut active = vec![rec];
        let tick = h
            .monitor
            .tick(&mut active, start + ChronoDuration::seconds(299))
            .await;
        assert!(tick.aborted.is_empty());
        assert_eq!(active.len(), 1);

        let tick = h
            .monitor
            .tick(&mut active, start + ChronoDuration::seconds(301))
            .await;
        assert_eq!(tick.aborted[0].1, AbortReason::RemoteQueueTimeout);
    }

    #[tokio::test]
    async fn test_partially_remote_queued_is_not_timed_out() {
        let h = harness();
        let rec = record(&h, &["a.epub", "b.epub"]).await;
        set(&h, "a.epub", TransferState::QueuedRemotely).await;
        set(&h, "b.epub", TransferState::InProgress).await;
        let now = rec.start_time + ChronoDuration::seconds(301);

        let mut active = vec![rec];
        let tick = h.monitor.tick(&mut active, now).await;
        assert!(tick.aborted.is_empty());
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_all_rejected_aborts_without_retry_history() {
        let h = harness();
        let rec = record(&h, &["a.epub", "b.epub", "c.epub"]).await;
        for name in ["a.epub", "b.epub", "c.epub"] {
            set(&h, name, TransferState::Rejected).await;
        }
        assert_eq!(rec.rejected_retries, 0);

        let mut active = vec![rec];
        let tick = h.monitor.tick(&mut active, Utc::now()).await;
        assert_eq!(tick.aborted[0].1, AbortReason::AllRejected);
    }

    #[tokio::test]
    async fn test_errored_file_retried_then_succeeds() {
        let h = harness();
        let rec = record(&h, &["a.epub", "b.epub", "c.epub"]).await;
        set(&h, "a.epub", TransferState::Succeeded).await;
        set(&h, "b.epub", TransferState::Succeeded).await;
        set(&h, "c.epub", TransferState::Errored).await;

        let mut active = vec![rec];
        let tick = h.monitor.tick(&mut active, Utc::now()).await;
        assert!(tick.completed.is_empty() && tick.aborted.is_empty());
        assert_eq!(active[0].files[2].retry_count, 1);

        // The requeued transfer is the newest entry for c.epub
        set(&h, "c.epub", TransferState::Succeeded).await;
        let tick = h.monitor.tick(&mut active, Utc::now()).await;
        assert!(active.is_empty());
        assert_eq!(tick.completed.len(), 1);
        assert_eq!(tick.completed[0].files[2].retry_count, 1);
        assert_eq!(tick.completed[0].files[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let h = harness();
        let rec = record(&h, &["a.epub", "b.epub"]).await;
        set(&h, "b.epub", TransferState::InProgress).await;

        // Four failures are requeued, the fifth aborts
        let mut active = vec![rec];
        for expected in 1..=4 {
            set(&h, "a.epub", TransferState::Errored).await;
            let tick = h.monitor.tick(&mut active, Utc::now()).await;
            assert!(tick.aborted.is_empty());
            assert_eq!(active[0].files[0].retry_count, expected);
        }
        assert_eq!(h.share.enqueued().await.len(), 1 + 4);

        set(&h, "a.epub", TransferState::Errored).await;
        let tick = h.monitor.tick(&mut active, Utc::now()).await;
        assert!(active.is_empty());
        let (aborted, reason) = &tick.aborted[0];
        assert_eq!(reason, &AbortReason::RetriesExhausted("Books\\Herbert\\a.epub".to_string()));
        assert_eq!(aborted.files[0].retry_count, 5);
        assert_eq!(h.share.enqueued().await.len(), 1 + 4);
    }

    #[tokio::test]
    async fn test_rejections_beyond_allowance_abort() {
        let h = harness();
        let rec = record(&h, &["a.epub", "b.epub"]).await;
        set(&h, "b.epub", TransferState::InProgress).await;

        // Allowance is 1.2 * 2 = 2.4 rejected retries
        let mut active = vec![rec];
        for _ in 0..2 {
            set(&h, "a.epub", TransferState::Rejected).await;
            let tick = h.monitor.tick(&mut active, Utc::now()).await;
            assert!(tick.aborted.is_empty());
        }
        assert_eq!(active[0].rejected_retries, 2);

        set(&h, "a.epub", TransferState::Rejected).await;
        let tick = h.monitor.tick(&mut active, Utc::now()).await;
        assert_eq!(tick.aborted[0].1, AbortReason::TooManyRejections);
    }

    #[tokio::test]
    async fn test_status_query_failure_counts_error() {
        let h = harness();
        let rec = record(&h, &["a.epub"]).await;
        h.share.set_status_queries_fail(true).await;

        let mut active = vec![rec];
        h.monitor.tick(&mut active, Utc::now()).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].error_count, 1);
        assert_eq!(active[0].files[0].status, None);
    }

    #[tokio::test]
    async fn test_abort_cancels_then_deletes_local_dir() {
        let h = harness();
        let rec = record(&h, &["a.epub", "b.epub"]).await;
        let local = rec.local_dir(h.dir.path());
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("a.epub.part"), b"partial").unwrap();
        let ids: Vec<String> = rec.files.iter().map(|f| f.transfer_id.clone()).collect();
        let now = rec.start_time + ChronoDuration::seconds(4000);

        let mut active = vec![rec];
        h.monitor.tick(&mut active, now).await;

        let cancelled = h.share.cancelled().await;
        assert_eq!(cancelled.len(), 2);
        for id in ids {
            assert!(cancelled.iter().any(|(peer, t)| peer == "alice" && *t == id));
        }
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_run_settles_batch() {
        let h = harness();
        let ok = record(&h, &["a.epub"]).await;
        set(&h, "a.epub", TransferState::Succeeded).await;

        let mut stale = ok.clone();
        stale.files = vec![TrackedFile::new("Books\\Herbert\\gone.epub", 1, "missing")];
        stale.start_time = Utc::now() - ChronoDuration::seconds(7200);

        let report = h.monitor.run(vec![ok, stale]).await;
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.aborted.len(), 1);
        assert_eq!(report.aborted[0].1, AbortReason::Stalled);
    }
}
