//! Types for tracked downloads.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::fileshare::{remote_basename, FileShareError, RemoteFile, TransferState};
use crate::import::sanitize_folder_name;
use crate::library::DownloadTarget;

/// Errors from enqueueing transfers.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Enqueue rejected by {peer}: {source}")]
    EnqueueFailed {
        peer: String,
        #[source]
        source: FileShareError,
    },

    #[error("No transfer for {filename} from {peer} appeared in the download listing")]
    TransferNotFound { peer: String, filename: String },

    #[error("Nothing to enqueue")]
    NothingToEnqueue,
}

/// One file of a download and its transfer bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedFile {
    /// Remote path as offered by the peer.
    pub filename: String,
    pub size: u64,
    pub transfer_id: String,
    /// Last known state; `None` until queried or after a failed query.
    pub status: Option<TransferState>,
    pub retry_count: u32,
}

impl TrackedFile {
    pub fn new(filename: impl Into<String>, size: u64, transfer_id: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            size,
            transfer_id: transfer_id.into(),
            status: None,
            retry_count: 0,
        }
    }

    pub fn basename(&self) -> &str {
        remote_basename(&self.filename)
    }

    pub fn to_remote(&self, peer: &str) -> RemoteFile {
        RemoteFile::new(peer, self.filename.clone(), self.size)
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == Some(TransferState::Succeeded)
    }
}

/// An in-flight download of one wanted item from one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub author_name: String,
    pub title: String,
    pub item_id: i64,
    pub peer: String,
    /// Full remote directory the files came from.
    pub remote_dir: String,
    /// Local directory name the transfers land in, below the download root.
    pub source_dir: String,
    pub files: Vec<TrackedFile>,
    pub start_time: DateTime<Utc>,
    pub rejected_retries: u32,
    pub error_count: u32,
}

impl DownloadRecord {
    pub fn new(
        target: &DownloadTarget,
        peer: &str,
        remote_dir: &str,
        files: Vec<TrackedFile>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            author_name: target.author.author_name.clone(),
            title: target.item.title.clone(),
            item_id: target.item.id,
            peer: peer.to_string(),
            remote_dir: remote_dir.to_string(),
            source_dir: sanitize_folder_name(remote_basename(remote_dir)),
            files,
            start_time,
            rejected_retries: 0,
            error_count: 0,
        }
    }

    /// Local directory holding this record's files.
    pub fn local_dir(&self, download_root: &Path) -> PathBuf {
        download_root.join(&self.source_dir)
    }

    pub fn all_succeeded(&self) -> bool {
        !self.files.is_empty() && self.files.iter().all(TrackedFile::is_succeeded)
    }
}

/// Why a record was given up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Older than the stalled timeout.
    Stalled,
    /// Every file queued remotely past the remote queue timeout.
    RemoteQueueTimeout,
    /// Every file failed and at least one was rejected.
    AllRejected,
    /// Rejections exceeded the allowance for the record.
    TooManyRejections,
    /// A file hit the per-file retry bound.
    RetriesExhausted(String),
    /// Re-enqueueing a failed file did not produce a transfer.
    RequeueFailed(String),
}

impl AbortReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AbortReason::Stalled => "stalled",
            AbortReason::RemoteQueueTimeout => "remote_queue_timeout",
            AbortReason::AllRejected => "all_rejected",
            AbortReason::TooManyRejections => "too_many_rejections",
            AbortReason::RetriesExhausted(_) => "retries_exhausted",
            AbortReason::RequeueFailed(_) => "requeue_failed",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Stalled => write!(f, "stalled past timeout"),
            AbortReason::RemoteQueueTimeout => write!(f, "remotely queued past timeout"),
            AbortReason::AllRejected => write!(f, "all files rejected"),
            AbortReason::TooManyRejections => write!(f, "too many rejected retries"),
            AbortReason::RetriesExhausted(file) => write!(f, "retries exhausted for {}", file),
            AbortReason::RequeueFailed(file) => write!(f, "could not requeue {}", file),
        }
    }
}
