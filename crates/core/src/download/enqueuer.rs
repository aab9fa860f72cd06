//! Submitting transfers and resolving their ids.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::DownloadConfig;
use crate::fileshare::{
    remote_basename, FileShare, RemoteFile, TransferDirectory, TransferEntry, TransferState,
};
use crate::library::DownloadTarget;
use crate::metrics;

use super::{DownloadError, DownloadRecord, TrackedFile};

/// Submits files to the file-sharing service and finds the resulting transfers.
///
/// The service does not return transfer ids on enqueue, so the peer's
/// download listing is polled a bounded number of times until the submitted
/// files show up in it.
#[derive(Clone)]
pub struct DownloadEnqueuer {
    fileshare: Arc<dyn FileShare>,
    attempts: u32,
    poll_interval: Duration,
}

impl DownloadEnqueuer {
    pub fn new(fileshare: Arc<dyn FileShare>, config: &DownloadConfig) -> Self {
        Self {
            fileshare,
            attempts: config.enqueue_attempts.max(1),
            poll_interval: Duration::from_millis(config.enqueue_poll_interval_ms),
        }
    }

    /// Enqueue the winning file for `target` and build its download record.
    pub async fn start(
        &self,
        target: &DownloadTarget,
        file: &RemoteFile,
    ) -> Result<DownloadRecord, DownloadError> {
        let tracked = self.enqueue(&file.peer, std::slice::from_ref(file)).await?;
        metrics::DOWNLOADS_STARTED.inc();
        Ok(DownloadRecord::new(
            target,
            &file.peer,
            file.directory(),
            tracked,
            Utc::now(),
        ))
    }

    /// Enqueue `files` from `peer` and return them with their transfer ids.
    pub async fn enqueue(
        &self,
        peer: &str,
        files: &[RemoteFile],
    ) -> Result<Vec<TrackedFile>, DownloadError> {
        if files.is_empty() {
            return Err(DownloadError::NothingToEnqueue);
        }

        self.fileshare
            .enqueue(peer, files)
            .await
            .map_err(|source| DownloadError::EnqueueFailed {
                peer: peer.to_string(),
                source,
            })?;

        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.poll_interval).await;

            let listing = match self.fileshare.peer_downloads(peer).await {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(peer, attempt, error = %e, "Failed to list downloads");
                    continue;
                }
            };

            let tracked: Vec<TrackedFile> = files
                .iter()
                .filter_map(|file| {
                    find_transfer(&listing, file, None)
                        .map(|entry| TrackedFile::new(file.filename.clone(), file.size, &entry.id))
                })
                .collect();

            if !tracked.is_empty() {
                debug!(peer, found = tracked.len(), attempt, "Resolved transfer ids");
                return Ok(tracked);
            }
        }

        Err(DownloadError::TransferNotFound {
            peer: peer.to_string(),
            filename: files[0].filename.clone(),
        })
    }

    /// Re-enqueue one failed file and return its new transfer id.
    ///
    /// The file's previous transfer is ignored when resolving the new one.
    pub async fn requeue(&self, peer: &str, file: &TrackedFile) -> Result<String, DownloadError> {
        let remote = file.to_remote(peer);
        self.fileshare
            .enqueue(peer, std::slice::from_ref(&remote))
            .await
            .map_err(|source| DownloadError::EnqueueFailed {
                peer: peer.to_string(),
                source,
            })?;

        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.poll_interval).await;

            match self.fileshare.peer_downloads(peer).await {
                Ok(listing) => {
                    if let Some(entry) = find_transfer(&listing, &remote, Some(&file.transfer_id)) {
                        return Ok(entry.id.clone());
                    }
                }
                Err(e) => warn!(peer, attempt, error = %e, "Failed to list downloads"),
            }
        }

        Err(DownloadError::TransferNotFound {
            peer: peer.to_string(),
            filename: file.filename.clone(),
        })
    }
}

/// Locate the listing entry for a submitted file.
///
/// Directories match on the full remote directory or its last component,
/// files on their basename. Live transfers win over finished ones, then
/// successful ones over failed ones.
fn find_transfer<'a>(
    listing: &'a [TransferDirectory],
    file: &RemoteFile,
    exclude_id: Option<&str>,
) -> Option<&'a TransferEntry> {
    let dir = file.directory();
    let dir_base = remote_basename(dir);
    let name = file.basename();

    let candidates: Vec<&TransferEntry> = listing
        .iter()
        .filter(|d| d.directory == dir || d.directory == dir_base)
        .flat_map(|d| d.files.iter())
        .filter(|e| remote_basename(&e.filename) == name)
        .filter(|e| exclude_id.map_or(true, |id| e.id != id))
        .collect();

    candidates
        .iter()
        .find(|e| !e.state.is_terminal())
        .or_else(|| {
            candidates
                .iter()
                .find(|e| e.state == TransferState::Succeeded)
        })
        .or_else(|| candidates.last())
        .copied()
}
