//! Import phase for completed downloads.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ImportConfig;
use crate::download::DownloadRecord;
use crate::events::{emit_to, AcquisitionEvent, EventHandle};
use crate::library::LibraryService;
use crate::metrics;

use super::{
    FileOrganizer, ImportCommands, ImportReport, MetadataValidator, RejectedFile,
    ValidationOutcome,
};

/// Validates, organizes and imports the files of completed downloads.
///
/// Records are handled in author order. Accepted files move into
/// `<download_dir>/<author>/`, rejected ones into quarantine. One scan
/// command is then submitted per author folder filled in this run, and
/// folders whose command fails are quarantined as a whole.
pub struct ImportProcessor {
    validator: MetadataValidator,
    organizer: FileOrganizer,
    commands: ImportCommands,
    events: Option<EventHandle>,
}

impl ImportProcessor {
    /// `download_dir` is the local download root; `library_download_dir` is
    /// the same directory as the library service sees it.
    pub fn new(
        library: Arc<dyn LibraryService>,
        config: &ImportConfig,
        download_dir: impl Into<PathBuf>,
        library_download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            validator: MetadataValidator::new(library.clone(), config.validation_policy),
            organizer: FileOrganizer::new(download_dir, config.quarantine_dir_name.clone()),
            commands: ImportCommands::new(
                library,
                config.scan_command.clone(),
                library_download_dir,
                Duration::from_millis(config.command_poll_interval_ms),
            ),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn process(&self, mut records: Vec<DownloadRecord>) -> ImportReport {
        let mut report = ImportReport::default();
        let mut author_dirs: Vec<String> = Vec::new();

        records.sort_by(|a, b| a.author_name.cmp(&b.author_name));

        for record in &records {
            let local_dir = record.local_dir(self.organizer.download_dir());
            for file in &record.files {
                let path = local_dir.join(file.basename());
                info!(file = %path.display(), title = %record.title, "Processing file");

                if !path.is_file() {
                    warn!(file = %path.display(), "Downloaded file not found");
                    report.rejected.push(RejectedFile {
                        title: record.title.clone(),
                        file: path,
                        reason: "source file not found".to_string(),
                    });
                    continue;
                }

                let reason = match self
                    .validator
                    .validate(&path, &record.title, record.item_id)
                    .await
                {
                    ValidationOutcome::Accepted => {
                        match self.organizer.organize(&path, &record.author_name).await {
                            Ok(author_dir) => {
                                report.imported += 1;
                                emit_to(
                                    &self.events,
                                    AcquisitionEvent::FileImported {
                                        title: record.title.clone(),
                                        author_dir: author_dir.clone(),
                                    },
                                )
                                .await;
                                if !author_dirs.contains(&author_dir) {
                                    author_dirs.push(author_dir);
                                }
                                continue;
                            }
                            Err(e) => format!("failed to organize: {}", e),
                        }
                    }
                    ValidationOutcome::Rejected(reason) => reason,
                };

                warn!(file = %path.display(), reason = %reason, "File not imported");
                self.quarantine(&path, record, &reason).await;
                report.rejected.push(RejectedFile {
                    title: record.title.clone(),
                    file: path,
                    reason,
                });
            }
        }

        if author_dirs.is_empty() {
            warn!("No author folders to import");
            return report;
        }

        let submitted = self.commands.trigger_imports(&author_dirs).await;
        report.commands = self.commands.monitor_imports(submitted).await;

        for result in &report.commands {
            metrics::IMPORT_COMMANDS
                .with_label_values(&[result.status_label()])
                .inc();
            emit_to(
                &self.events,
                AcquisitionEvent::ImportCommandFinished {
                    path: result.path.clone(),
                    status: result.status_label().to_string(),
                },
            )
            .await;

            if result.state.is_failure() {
                let dir = self.organizer.download_dir().join(&result.author_dir);
                match self.organizer.quarantine_dir_tree(&dir).await {
                    Ok(_) => metrics::QUARANTINED_TOTAL.inc(),
                    Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to quarantine folder"),
                }
            }
        }

        info!(
            imported = report.imported,
            rejected = report.rejected.len(),
            failed_commands = report.failed_commands(),
            "Import phase finished"
        );
        report
    }

    async fn quarantine(&self, path: &std::path::Path, record: &DownloadRecord, reason: &str) {
        match self.organizer.quarantine_file(path, &record.author_name).await {
            Ok(_) => {
                metrics::QUARANTINED_TOTAL.inc();
                emit_to(
                    &self.events,
                    AcquisitionEvent::FileQuarantined {
                        title: record.title.clone(),
                        reason: reason.to_string(),
                    },
                )
                .await;
            }
            Err(e) => warn!(file = %path.display(), error = %e, "Failed to quarantine file"),
        }
    }
}
