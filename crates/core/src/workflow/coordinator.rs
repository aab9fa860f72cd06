//! One acquisition run from wanted list to library import.
//!
//! Phases run strictly in order: collect wanted items, search and enqueue
//! each one, monitor the whole batch until it settles, then import the
//! completed downloads. A library outage while collecting aborts the run;
//! everything after that is handled per item.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::fs;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::download::{DownloadEnqueuer, DownloadMonitor};
use crate::events::{emit_to, AcquisitionEvent, EventHandle};
use crate::fileshare::FileShare;
use crate::import::ImportProcessor;
use crate::library::{DownloadTarget, LibraryService, WantedItem};
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::search::SearchOrchestrator;
use crate::state::{FailureLog, FailureLogEntry, PageStore, FAILURE_LOG_NAME, PAGE_FILE_NAME};

use super::{RunSummary, WantedCollector, WorkflowError};

/// Drives a single run against a library service and a file-sharing service.
pub struct WorkflowCoordinator {
    library: Arc<dyn LibraryService>,
    fileshare: Arc<dyn FileShare>,
    config: Config,
    failure_log: FailureLog,
    events: Option<EventHandle>,
}

impl WorkflowCoordinator {
    pub fn new(
        library: Arc<dyn LibraryService>,
        fileshare: Arc<dyn FileShare>,
        config: Config,
    ) -> Self {
        let failure_log = FailureLog::new(config.state.data_dir.join(FAILURE_LOG_NAME));
        Self {
            library,
            fileshare,
            config,
            failure_log,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self) -> Result<RunSummary, WorkflowError> {
        let mut summary = RunSummary::default();
        let data_dir = &self.config.state.data_dir;
        fs::create_dir_all(data_dir)
            .await
            .map_err(|source| WorkflowError::State {
                path: data_dir.clone(),
                source,
            })?;

        let search = &self.config.search;
        let collector = WantedCollector::new(
            self.library.clone(),
            search.source,
            search.paging,
            search.page_size,
            PageStore::new(data_dir.join(PAGE_FILE_NAME)),
            RetryPolicy::from(&self.config.retry),
        );

        let wanted = collector.collect().await?;
        summary.wanted = wanted.len();
        info!(
            library = self.library.name(),
            fileshare = self.fileshare.name(),
            wanted = wanted.len(),
            "Starting acquisition run"
        );
        emit_to(
            &self.events,
            AcquisitionEvent::RunStarted {
                wanted: wanted.len(),
            },
        )
        .await;

        let (targets, failures) = collector.build_targets(&wanted).await?;
        for failure in &failures {
            self.record_failure(&failure.item, &failure.author_name, &failure.reason)
                .await;
        }
        summary.failed += failures.len();

        let enqueuer = DownloadEnqueuer::new(self.fileshare.clone(), &self.config.download);
        let mut orchestrator = SearchOrchestrator::new(
            self.fileshare.clone(),
            enqueuer.clone(),
            search.clone(),
            self.config.fileshare.delete_searches,
        );
        if let Some(events) = &self.events {
            orchestrator = orchestrator.with_events(events.clone());
        }

        let mut records = Vec::new();
        for target in &targets {
            match orchestrator.search_and_download(target).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.record_failure(&target.item, &target.author.author_name, &e.to_string())
                        .await;
                    summary.failed += 1;
                }
            }
        }
        summary.enqueued = records.len();

        let mut monitor = DownloadMonitor::new(
            self.fileshare.clone(),
            enqueuer,
            self.config.download.clone(),
            self.config.fileshare.download_dir.clone(),
        );
        if let Some(events) = &self.events {
            monitor = monitor.with_events(events.clone());
        }
        let report = monitor.run(records).await;
        summary.downloaded = report.completed.len();

        let by_item: HashMap<i64, &DownloadTarget> =
            targets.iter().map(|t| (t.item.id, t)).collect();
        for (record, reason) in &report.aborted {
            if let Some(target) = by_item.get(&record.item_id) {
                self.record_failure(&target.item, &record.author_name, &reason.to_string())
                    .await;
            }
        }
        summary.failed += report.aborted.len();

        if self.config.library.disable_sync {
            info!("Library sync disabled, leaving downloads in place");
        } else if !report.completed.is_empty() {
            let mut processor = ImportProcessor::new(
                self.library.clone(),
                &self.config.import,
                self.config.fileshare.download_dir.clone(),
                self.config.library.download_dir.clone(),
            );
            if let Some(events) = &self.events {
                processor = processor.with_events(events.clone());
            }
            let imports = processor.process(report.completed).await;
            summary.imported = imports.imported;
            summary.rejected = imports.rejected.len();
        }

        if let Err(e) = self.fileshare.remove_completed_downloads().await {
            warn!(error = %e, "Failed to clear completed downloads");
        }

        info!(
            wanted = summary.wanted,
            enqueued = summary.enqueued,
            downloaded = summary.downloaded,
            imported = summary.imported,
            rejected = summary.rejected,
            failed = summary.failed,
            "Acquisition run finished"
        );
        emit_to(
            &self.events,
            AcquisitionEvent::RunFinished {
                succeeded: summary.downloaded,
                failed: summary.failed,
            },
        )
        .await;

        Ok(summary)
    }

    /// Report an item that could not be acquired and, when configured,
    /// unmonitor it and note it in the failure log.
    async fn record_failure(&self, item: &WantedItem, author_name: &str, reason: &str) {
        metrics::ITEMS_FAILED.inc();
        error!(author = %author_name, title = %item.title, reason = %reason, "Acquisition failed");
        emit_to(
            &self.events,
            AcquisitionEvent::ItemFailed {
                author: author_name.to_string(),
                title: item.title.clone(),
                reason: reason.to_string(),
            },
        )
        .await;

        if !self.config.search.remove_wanted_on_failure {
            return;
        }

        let mut unmonitored = item.clone();
        unmonitored.monitored = false;
        if let Err(e) = self.library.update_item(&unmonitored).await {
            warn!(title = %item.title, error = %e, "Failed to unmonitor item");
        }

        let entry = FailureLogEntry::new(author_name, &item.title);
        if let Err(e) = self.failure_log.append(&entry).await {
            warn!(path = %self.failure_log.path().display(), error = %e, "Failed to write failure log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileShareConfig, LibraryConfig};
    use crate::fileshare::{PeerResponse, RemoteFile, TransferState};
    use crate::library::WantedSource;
    use crate::testing::{fixtures, MockFileShare, MockLibrary};
    use std::path::Path;
    use tempfile::TempDir;

    const DUNE_FILE: &str = "Books\\Herbert\\Frank Herbert - Dune.epub";

    fn config(dir: &Path) -> Config {
        let mut config = Config {
            library: LibraryConfig {
                url: "http://readarr".to_string(),
                api_key: "key".to_string(),
                download_dir: "/lib/dl".into(),
                disable_sync: false,
                timeout_secs: 30,
            },
            fileshare: FileShareConfig {
                url: "http://slskd".to_string(),
                api_key: "key".to_string(),
                url_base: "/".to_string(),
                download_dir: dir.join("downloads"),
                delete_searches: true,
                timeout_secs: 30,
            },
            search: Default::default(),
            download: Default::default(),
            import: Default::default(),
            retry: Default::default(),
            state: Default::default(),
            logging: Default::default(),
            metrics: Default::default(),
        };
        config.search.settle_delay_ms = 0;
        config.search.state_poll_interval_ms = 0;
        config.download.poll_interval_ms = 0;
        config.download.enqueue_poll_interval_ms = 0;
        config.import.command_poll_interval_ms = 0;
        config.retry.base_delay_ms = 0;
        config.retry.max_delay_ms = 0;
        config.state.data_dir = dir.join("state");
        config
    }

    struct Harness {
        dir: TempDir,
        library: Arc<MockLibrary>,
        share: Arc<MockFileShare>,
    }

    async fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(MockLibrary::new());
        library
            .set_wanted(WantedSource::Missing, vec![fixtures::wanted_item(7, "Dune", 1)])
            .await;
        library.add_author(fixtures::author(1, "Frank Herbert", 1)).await;
        library.add_profile(fixtures::ebook_profile(1)).await;

        let share = Arc::new(MockFileShare::new());
        share
            .set_search_results(
                "Frank Herbert - Dune",
                vec![PeerResponse {
                    peer: "alice".to_string(),
                    files: vec![RemoteFile::new("alice", DUNE_FILE, 100)],
                }],
            )
            .await;
        share.set_delivery_dir(dir.path().join("downloads")).await;
        share
            .set_file_content(DUNE_FILE, fixtures::epub_bytes(Some("Dune")))
            .await;
        share.set_initial_state(TransferState::Succeeded).await;

        Harness {
            dir,
            library,
            share,
        }
    }

    fn coordinator(h: &Harness, config: Config) -> WorkflowCoordinator {
        WorkflowCoordinator::new(h.library.clone(), h.share.clone(), config)
    }

    #[tokio::test]
    async fn test_run_downloads_and_imports() {
        let h = harness().await;

        let summary = coordinator(&h, config(h.dir.path())).run().await.unwrap();

        assert_eq!(
            summary,
            RunSummary {
                wanted: 1,
                enqueued: 1,
                downloaded: 1,
                imported: 1,
                rejected: 0,
                failed: 0,
            }
        );
        assert!(h
            .dir
            .path()
            .join("downloads")
            .join("Frank Herbert")
            .join("Frank Herbert - Dune.epub")
            .is_file());
        let commands = h.library.submitted_commands().await;
        assert_eq!(commands[0].path.as_deref(), Some("/lib/dl/Frank Herbert"));
        assert_eq!(h.share.remove_completed_calls().await, 1);
    }

    #[tokio::test]
    async fn test_failed_item_is_unmonitored_and_logged() {
        let h = harness().await;
        h.share.set_search_results("Frank Herbert - Dune", Vec::new()).await;
        let mut config = config(h.dir.path());
        config.search.remove_wanted_on_failure = true;

        let summary = coordinator(&h, config).run().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.enqueued, 0);
        let updates = h.library.updates().await;
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].monitored);
        let log = std::fs::read_to_string(h.dir.path().join("state").join(FAILURE_LOG_NAME)).unwrap();
        assert!(log.trim_end().ends_with("- Frank Herbert, Dune"));
    }

    #[tokio::test]
    async fn test_failures_kept_monitored_by_default() {
        let h = harness().await;
        h.share.set_search_results("Frank Herbert - Dune", Vec::new()).await;

        let summary = coordinator(&h, config(h.dir.path())).run().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(h.library.updates().await.is_empty());
        assert!(!h.dir.path().join("state").join(FAILURE_LOG_NAME).exists());
    }

    #[tokio::test]
    async fn test_aborted_download_counts_as_failure() {
        let h = harness().await;
        h.share.set_initial_state(TransferState::Rejected).await;
        let mut config = config(h.dir.path());
        config.search.remove_wanted_on_failure = true;

        let summary = coordinator(&h, config).run().await.unwrap();

        assert_eq!(summary.enqueued, 1);
        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(h.library.updates().await.len(), 1);
        assert!(h.library.submitted_commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_disable_sync_skips_import() {
        let h = harness().await;
        let mut config = config(h.dir.path());
        config.library.disable_sync = true;

        let summary = coordinator(&h, config).run().await.unwrap();

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.imported, 0);
        assert!(h.library.submitted_commands().await.is_empty());
        assert!(h
            .dir
            .path()
            .join("downloads")
            .join("Herbert")
            .join("Frank Herbert - Dune.epub")
            .is_file());
    }

    #[tokio::test]
    async fn test_unreachable_library_aborts_run() {
        let h = harness().await;
        h.library.set_unreachable(true).await;

        let err = coordinator(&h, config(h.dir.path())).run().await.unwrap_err();
        assert!(matches!(err, WorkflowError::LibraryUnavailable(_)));
        assert!(h.share.searches().await.is_empty());
    }

    #[tokio::test]
    async fn test_events_bracket_the_run() {
        let h = harness().await;
        let (events, mut rx) = {
            let (tx, rx) = tokio::sync::mpsc::channel(64);
            (EventHandle::new(tx), rx)
        };

        coordinator(&h, config(h.dir.path()))
            .with_events(events)
            .run()
            .await
            .unwrap();

        let mut types = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            types.push(envelope.event.event_type());
        }
        assert_eq!(types.first(), Some(&"run_started"));
        assert_eq!(types.last(), Some(&"run_finished"));
        assert!(types.contains(&"download_enqueued"));
        assert!(types.contains(&"file_imported"));
    }
}
