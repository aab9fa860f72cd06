//! Error type for one acquisition attempt.

use thiserror::Error;

use crate::download::DownloadError;
use crate::fileshare::FileShareError;

/// Why a search-and-download attempt for one wanted item failed.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Title contains blacklisted word '{0}'")]
    Blacklisted(String),

    #[error("Quality profile allows no filetypes")]
    NoAllowedFiletypes,

    #[error("Search '{0}' still in progress at the deadline")]
    SearchTimedOut(String),

    #[error("No acceptable match found")]
    NoMatch,

    #[error("Search failed: {0}")]
    Search(#[from] FileShareError),

    #[error("Download could not be started: {0}")]
    Download(#[from] DownloadError),
}

impl AcquisitionError {
    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            AcquisitionError::Blacklisted(_) => "blacklisted",
            AcquisitionError::NoAllowedFiletypes => "no_filetypes",
            AcquisitionError::SearchTimedOut(_) => "timeout",
            AcquisitionError::NoMatch => "no_match",
            AcquisitionError::Search(_) => "error",
            AcquisitionError::Download(_) => "enqueue_failed",
        }
    }
}
