//! Types for one acquisition run.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::library::LibraryError;

/// Failures that abort a whole run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Library service unavailable: {0}")]
    LibraryUnavailable(#[source] LibraryError),

    #[error("Failed to fetch wanted items: {0}")]
    Wanted(#[source] LibraryError),

    #[error("State file error at {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tally of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Wanted items collected from the library.
    pub wanted: usize,
    /// Items with a download enqueued.
    pub enqueued: usize,
    /// Downloads that completed.
    pub downloaded: usize,
    /// Files moved into author folders.
    pub imported: usize,
    /// Files rejected during import.
    pub rejected: usize,
    /// Items that failed during search, enqueue or download.
    pub failed: usize,
}
