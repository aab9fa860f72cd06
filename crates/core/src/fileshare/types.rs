//! Types for file-sharing service operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the file-sharing service.
#[derive(Debug, Error)]
pub enum FileShareError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,
}

impl FileShareError {
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            FileShareError::ConnectionFailed(_) | FileShareError::Timeout
        )
    }
}

/// Separator used by peers in remote paths.
pub const REMOTE_PATH_SEPARATOR: char = '\\';

/// A file offered by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Remote path, `\`-separated.
    pub filename: String,
    pub size: u64,
    pub peer: String,
}

impl RemoteFile {
    pub fn new(peer: impl Into<String>, filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            peer: peer.into(),
        }
    }

    /// Remote directory containing the file (empty for bare names).
    pub fn directory(&self) -> &str {
        remote_dirname(&self.filename)
    }

    pub fn basename(&self) -> &str {
        remote_basename(&self.filename)
    }

    /// Lower-cased text after the last `.`, or the whole name without one.
    pub fn extension(&self) -> String {
        match self.filename.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => self.filename.to_lowercase(),
        }
    }
}

/// Last component of a `\`-separated remote path.
pub fn remote_basename(path: &str) -> &str {
    path.rsplit(REMOTE_PATH_SEPARATOR).next().unwrap_or(path)
}

/// Everything before the last `\` of a remote path.
pub fn remote_dirname(path: &str) -> &str {
    path.rsplit_once(REMOTE_PATH_SEPARATOR)
        .map(|(dir, _)| dir)
        .unwrap_or("")
}

/// Parameters of a network-wide search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub text: String,
    pub search_timeout_ms: u64,
    pub maximum_peer_queue: u32,
    pub minimum_peer_upload_speed: u32,
    pub filter_responses: bool,
}

/// State of a running search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    InProgress,
    Completed,
    Unknown,
}

impl SearchState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, SearchState::InProgress)
    }
}

/// All files one peer returned for a search.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerResponse {
    pub peer: String,
    pub files: Vec<RemoteFile>,
}

/// Full listing of one peer directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryListing {
    pub directory: String,
    /// Files with their full remote path.
    pub files: Vec<RemoteFile>,
}

/// State of a single transfer as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Requested,
    QueuedLocally,
    QueuedRemotely,
    Initializing,
    InProgress,
    Succeeded,
    Cancelled,
    TimedOut,
    Errored,
    Rejected,
    Aborted,
    Unknown,
}

impl TransferState {
    /// Terminal failure kinds that trigger retry/abort handling.
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            TransferState::Cancelled
                | TransferState::TimedOut
                | TransferState::Errored
                | TransferState::Rejected
                | TransferState::Aborted
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.is_problem() || *self == TransferState::Succeeded
    }
}

/// A transfer entry from the service's download listing.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEntry {
    pub id: String,
    pub peer: String,
    /// Remote filename, as submitted.
    pub filename: String,
    pub size: u64,
    pub state: TransferState,
}

/// Transfers grouped under the remote directory they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferDirectory {
    pub directory: String,
    pub files: Vec<TransferEntry>,
}

/// Trait for file-sharing service backends.
#[async_trait]
pub trait FileShare: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Start a search and return its id.
    async fn start_search(&self, request: &SearchRequest) -> Result<String, FileShareError>;

    async fn search_state(&self, search_id: &str) -> Result<SearchState, FileShareError>;

    async fn search_responses(&self, search_id: &str)
        -> Result<Vec<PeerResponse>, FileShareError>;

    async fn delete_search(&self, search_id: &str) -> Result<(), FileShareError>;

    /// Browse one directory of a peer's share.
    async fn browse_directory(
        &self,
        peer: &str,
        directory: &str,
    ) -> Result<DirectoryListing, FileShareError>;

    /// Request downloads of `files` from `peer`.
    async fn enqueue(&self, peer: &str, files: &[RemoteFile]) -> Result<(), FileShareError>;

    /// Current downloads from `peer`, grouped by remote directory.
    async fn peer_downloads(&self, peer: &str) -> Result<Vec<TransferDirectory>, FileShareError>;

    async fn get_transfer(
        &self,
        peer: &str,
        transfer_id: &str,
    ) -> Result<TransferEntry, FileShareError>;

    async fn cancel_transfer(&self, peer: &str, transfer_id: &str)
        -> Result<(), FileShareError>;

    /// Clear finished downloads from the service's transfer list.
    async fn remove_completed_downloads(&self) -> Result<(), FileShareError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path_parts() {
        let file = RemoteFile::new("peer", "Music\\Books\\Dune - Frank Herbert.EPUB", 10);
        assert_eq!(file.directory(), "Music\\Books");
        assert_eq!(file.basename(), "Dune - Frank Herbert.EPUB");
        assert_eq!(file.extension(), "epub");
    }

    #[test]
    fn test_bare_filename() {
        let file = RemoteFile::new("peer", "dune.mobi", 10);
        assert_eq!(file.directory(), "");
        assert_eq!(file.basename(), "dune.mobi");
        assert_eq!(file.extension(), "mobi");
    }

    #[test]
    fn test_transfer_state_classification() {
        assert!(TransferState::Rejected.is_problem());
        assert!(TransferState::TimedOut.is_problem());
        assert!(!TransferState::Succeeded.is_problem());
        assert!(TransferState::Succeeded.is_terminal());
        assert!(!TransferState::QueuedRemotely.is_terminal());
        assert!(!TransferState::InProgress.is_problem());
    }
}
