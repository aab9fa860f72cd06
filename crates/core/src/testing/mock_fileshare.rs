//! Mock file-sharing service for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::fileshare::{
    remote_basename, remote_dirname, DirectoryListing, FileShare, FileShareError, PeerResponse,
    RemoteFile, SearchRequest, SearchState, TransferDirectory, TransferEntry, TransferState,
};

/// A recorded enqueue call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedEnqueue {
    pub peer: String,
    pub files: Vec<RemoteFile>,
}

#[derive(Debug, Clone)]
struct MockTransfer {
    directory: String,
    entry: TransferEntry,
}

#[derive(Debug, Default)]
struct State {
    /// Responses by search text.
    results: HashMap<String, Vec<PeerResponse>>,
    /// Issued searches in order.
    searches: Vec<SearchRequest>,
    /// Search text by search id.
    search_ids: HashMap<String, String>,
    deleted_searches: Vec<String>,
    in_progress_polls: u32,
    searches_never_finish: bool,
    state_polls: usize,
    directories: HashMap<(String, String), Vec<RemoteFile>>,
    browse_calls: usize,
    transfers: Vec<MockTransfer>,
    enqueued: Vec<RecordedEnqueue>,
    enqueue_fails: bool,
    hide_transfers: bool,
    listing_calls: usize,
    status_queries_fail: bool,
    initial_state: Option<TransferState>,
    delivery: Option<PathBuf>,
    contents: HashMap<String, Vec<u8>>,
    cancelled: Vec<(String, String)>,
    remove_completed_calls: usize,
    next_id: u64,
}

/// Mock implementation of the FileShare trait.
///
/// Provides controllable behavior for testing:
/// - Search results per query text, with a configurable number of
///   in-progress polls before completion
/// - Transfers that appear in the peer listing on enqueue, with states
///   driven from the test
/// - Optional local delivery that writes enqueued files into a download
///   directory the way the real service would
/// - Failure injection for enqueue and status queries
///
/// # Example
///
/// ```rust,ignore
/// let share = MockFileShare::new();
/// share.set_search_results("Frank Herbert - Dune", vec![response]).await;
///
/// let id = share.start_search(&request).await?;
/// let responses = share.search_responses(&id).await?;
///
/// share.set_state_by_filename("Books\\Dune.epub", TransferState::Succeeded).await;
/// ```
#[derive(Debug, Default)]
pub struct MockFileShare {
    state: Arc<RwLock<State>>,
}

impl MockFileShare {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses returned for searches whose text equals `query`.
    pub async fn set_search_results(&self, query: &str, responses: Vec<PeerResponse>) {
        self.state
            .write()
            .await
            .results
            .insert(query.to_string(), responses);
    }

    /// Report the next `polls` state queries as in progress.
    pub async fn set_in_progress_polls(&self, polls: u32) {
        self.state.write().await.in_progress_polls = polls;
    }

    pub async fn set_searches_never_finish(&self, never: bool) {
        self.state.write().await.searches_never_finish = never;
    }

    /// Texts of all issued searches, in order.
    pub async fn searches(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .searches
            .iter()
            .map(|s| s.text.clone())
            .collect()
    }

    pub async fn deleted_searches(&self) -> Vec<String> {
        self.state.read().await.deleted_searches.clone()
    }

    pub async fn state_polls(&self) -> usize {
        self.state.read().await.state_polls
    }

    /// Listing returned when browsing `directory` on `peer`.
    pub async fn set_directory(&self, peer: &str, directory: &str, files: Vec<RemoteFile>) {
        self.state
            .write()
            .await
            .directories
            .insert((peer.to_string(), directory.to_string()), files);
    }

    pub async fn browse_calls(&self) -> usize {
        self.state.read().await.browse_calls
    }

    pub async fn enqueued(&self) -> Vec<RecordedEnqueue> {
        self.state.read().await.enqueued.clone()
    }

    pub async fn set_enqueue_fails(&self, fails: bool) {
        self.state.write().await.enqueue_fails = fails;
    }

    /// Accept enqueues but never list the resulting transfers.
    pub async fn set_hide_transfers(&self, hide: bool) {
        self.state.write().await.hide_transfers = hide;
    }

    pub async fn listing_calls(&self) -> usize {
        self.state.read().await.listing_calls
    }

    pub async fn set_status_queries_fail(&self, fails: bool) {
        self.state.write().await.status_queries_fail = fails;
    }

    /// State new transfers start in. Defaults to `Requested`.
    pub async fn set_initial_state(&self, state: TransferState) {
        self.state.write().await.initial_state = Some(state);
    }

    /// Write enqueued files to `<root>/<remote dir name>/<file name>`.
    pub async fn set_delivery_dir(&self, root: impl Into<PathBuf>) {
        self.state.write().await.delivery = Some(root.into());
    }

    /// Bytes written for a delivered file. Files without content are empty.
    pub async fn set_file_content(&self, remote_filename: &str, content: Vec<u8>) {
        self.state
            .write()
            .await
            .contents
            .insert(remote_filename.to_string(), content);
    }

    /// Set the state of every transfer of `filename`.
    pub async fn set_state_by_filename(&self, filename: &str, state: TransferState) {
        let mut guard = self.state.write().await;
        for transfer in guard
            .transfers
            .iter_mut()
            .filter(|t| t.entry.filename == filename)
        {
            transfer.entry.state = state;
        }
    }

    /// Recorded cancellations as (peer, transfer id).
    pub async fn cancelled(&self) -> Vec<(String, String)> {
        self.state.read().await.cancelled.clone()
    }

    pub async fn remove_completed_calls(&self) -> usize {
        self.state.read().await.remove_completed_calls
    }
}

#[async_trait]
impl FileShare for MockFileShare {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start_search(&self, request: &SearchRequest) -> Result<String, FileShareError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = format!("search-{}", state.next_id);
        state.searches.push(request.clone());
        state.search_ids.insert(id.clone(), request.text.clone());
        Ok(id)
    }

    async fn search_state(&self, search_id: &str) -> Result<SearchState, FileShareError> {
        let mut state = self.state.write().await;
        if !state.search_ids.contains_key(search_id) {
            return Err(FileShareError::NotFound(search_id.to_string()));
        }
        state.state_polls += 1;
        if state.searches_never_finish {
            return Ok(SearchState::InProgress);
        }
        if state.in_progress_polls > 0 {
            state.in_progress_polls -= 1;
            return Ok(SearchState::InProgress);
        }
        Ok(SearchState::Completed)
    }

    async fn search_responses(&self, search_id: &str) -> Result<Vec<PeerResponse>, FileShareError> {
        let state = self.state.read().await;
        let text = state
            .search_ids
            .get(search_id)
            .ok_or_else(|| FileShareError::NotFound(search_id.to_string()))?;
        Ok(state.results.get(text).cloned().unwrap_or_default())
    }

    async fn delete_search(&self, search_id: &str) -> Result<(), FileShareError> {
        self.state
            .write()
            .await
            .deleted_searches
            .push(search_id.to_string());
        Ok(())
    }

    async fn browse_directory(
        &self,
        peer: &str,
        directory: &str,
    ) -> Result<DirectoryListing, FileShareError> {
        let mut state = self.state.write().await;
        state.browse_calls += 1;
        let files = state
            .directories
            .get(&(peer.to_string(), directory.to_string()))
            .cloned()
            .ok_or_else(|| FileShareError::NotFound(format!("{}:{}", peer, directory)))?;
        Ok(DirectoryListing {
            directory: directory.to_string(),
            files,
        })
    }

    async fn enqueue(&self, peer: &str, files: &[RemoteFile]) -> Result<(), FileShareError> {
        let mut state = self.state.write().await;
        if state.enqueue_fails {
            return Err(FileShareError::ApiError("enqueue refused".to_string()));
        }
        state.enqueued.push(RecordedEnqueue {
            peer: peer.to_string(),
            files: files.to_vec(),
        });

        let initial = state.initial_state.unwrap_or(TransferState::Requested);
        for file in files {
            state.next_id += 1;
            let entry = TransferEntry {
                id: format!("transfer-{}", state.next_id),
                peer: peer.to_string(),
                filename: file.filename.clone(),
                size: file.size,
                state: initial,
            };
            state.transfers.push(MockTransfer {
                directory: remote_dirname(&file.filename).to_string(),
                entry,
            });

            if let Some(root) = &state.delivery {
                let dir = root.join(remote_basename(remote_dirname(&file.filename)));
                let content = state.contents.get(&file.filename).cloned().unwrap_or_default();
                std::fs::create_dir_all(&dir)
                    .and_then(|_| std::fs::write(dir.join(remote_basename(&file.filename)), content))
                    .map_err(|e| FileShareError::ApiError(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn peer_downloads(&self, peer: &str) -> Result<Vec<TransferDirectory>, FileShareError> {
        let mut state = self.state.write().await;
        state.listing_calls += 1;
        if state.hide_transfers {
            return Ok(Vec::new());
        }

        let mut listing: Vec<TransferDirectory> = Vec::new();
        for transfer in state.transfers.iter().filter(|t| t.entry.peer == peer) {
            match listing
                .iter_mut()
                .find(|d| d.directory == transfer.directory)
            {
                Some(dir) => dir.files.push(transfer.entry.clone()),
                None => listing.push(TransferDirectory {
                    directory: transfer.directory.clone(),
                    files: vec![transfer.entry.clone()],
                }),
            }
        }
        Ok(listing)
    }

    async fn get_transfer(
        &self,
        peer: &str,
        transfer_id: &str,
    ) -> Result<TransferEntry, FileShareError> {
        let state = self.state.read().await;
        if state.status_queries_fail {
            return Err(FileShareError::ConnectionFailed("status unavailable".to_string()));
        }
        state
            .transfers
            .iter()
            .find(|t| t.entry.peer == peer && t.entry.id == transfer_id)
            .map(|t| t.entry.clone())
            .ok_or_else(|| FileShareError::NotFound(transfer_id.to_string()))
    }

    async fn cancel_transfer(&self, peer: &str, transfer_id: &str) -> Result<(), FileShareError> {
        let mut state = self.state.write().await;
        state
            .cancelled
            .push((peer.to_string(), transfer_id.to_string()));
        if let Some(transfer) = state
            .transfers
            .iter_mut()
            .find(|t| t.entry.peer == peer && t.entry.id == transfer_id)
        {
            transfer.entry.state = TransferState::Cancelled;
        }
        Ok(())
    }

    async fn remove_completed_downloads(&self) -> Result<(), FileShareError> {
        self.state.write().await.remove_completed_calls += 1;
        Ok(())
    }
}
