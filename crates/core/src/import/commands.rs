//! Library scan commands for organized author folders.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::library::{CommandState, LibraryService};

use super::{ImportResult, SubmittedImport};

/// Submits and polls downloaded-books scan commands.
pub struct ImportCommands {
    library: Arc<dyn LibraryService>,
    command_name: String,
    /// Download directory as the library service sees it.
    library_download_dir: PathBuf,
    poll_interval: Duration,
}

impl ImportCommands {
    pub fn new(
        library: Arc<dyn LibraryService>,
        command_name: impl Into<String>,
        library_download_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            library,
            command_name: command_name.into(),
            library_download_dir: library_download_dir.into(),
            poll_interval,
        }
    }

    /// Submit one scan command per author folder.
    ///
    /// Submission failures are logged and the folder is skipped.
    pub async fn trigger_imports(&self, author_dirs: &[String]) -> Vec<SubmittedImport> {
        let mut submitted = Vec::new();

        for author_dir in author_dirs {
            let path = self
                .library_download_dir
                .join(author_dir)
                .to_string_lossy()
                .into_owned();
            match self.library.submit_command(&self.command_name, &path).await {
                Ok(command) => {
                    info!(command_id = command.id, path = %path, "Import command submitted");
                    submitted.push(SubmittedImport {
                        author_dir: author_dir.clone(),
                        command_id: command.id,
                        path,
                    });
                }
                Err(e) => error!(path = %path, error = %e, "Failed to submit import command"),
            }
        }

        submitted
    }

    /// Poll every command until it reaches a terminal state.
    ///
    /// A command that cannot be polled counts as settled with an unknown
    /// outcome.
    pub async fn monitor_imports(&self, submitted: Vec<SubmittedImport>) -> Vec<ImportResult> {
        let mut pending = submitted;
        let mut results = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let mut still_running = Vec::new();

            for import in pending {
                match self.library.get_command(import.command_id).await {
                    Ok(command) if command.state.is_terminal() => {
                        if command.state.is_failure() {
                            warn!(
                                path = %import.path,
                                state = ?command.state,
                                detail = command.message.as_deref().unwrap_or(""),
                                "Import command failed"
                            );
                        } else {
                            info!(path = %import.path, "Import command completed");
                        }
                        results.push(ImportResult {
                            author_dir: import.author_dir,
                            path: import.path,
                            state: command.state,
                            message: command.message,
                        });
                    }
                    Ok(command) => {
                        debug!(command_id = import.command_id, state = ?command.state, "Import still running");
                        still_running.push(import);
                    }
                    Err(e) => {
                        error!(command_id = import.command_id, error = %e, "Failed to poll import command");
                        results.push(ImportResult {
                            author_dir: import.author_dir,
                            path: import.path,
                            state: CommandState::Unknown,
                            message: Some(e.to_string()),
                        });
                    }
                }
            }

            pending = still_running;
            if !pending.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        results
    }
}
