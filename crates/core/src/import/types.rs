//! Types for the import phase.

use std::path::PathBuf;

use thiserror::Error;

use crate::library::CommandState;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Source not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Target already exists: {0}")]
    TargetExists(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A scan command submitted for one author folder.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedImport {
    pub author_dir: String,
    pub command_id: i64,
    /// Path as the library service sees it.
    pub path: String,
}

/// Final state of one scan command.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportResult {
    pub author_dir: String,
    pub path: String,
    /// `Unknown` when the command could not be polled.
    pub state: CommandState,
    pub message: Option<String>,
}

impl ImportResult {
    pub fn status_label(&self) -> &'static str {
        if self.state == CommandState::Completed {
            "completed"
        } else if self.state.is_failure() {
            "failed"
        } else {
            "unknown"
        }
    }
}

/// A file that did not make it into an author folder.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedFile {
    pub title: String,
    pub file: PathBuf,
    pub reason: String,
}

/// Outcome of processing one batch of completed downloads.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: Vec<RejectedFile>,
    pub commands: Vec<ImportResult>,
}

impl ImportReport {
    pub fn failed_commands(&self) -> usize {
        self.commands.iter().filter(|c| c.state.is_failure()).count()
    }
}
