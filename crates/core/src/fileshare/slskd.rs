//! slskd file-sharing service implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::FileShareConfig;

use super::{
    DirectoryListing, FileShare, FileShareError, PeerResponse, RemoteFile, SearchRequest,
    SearchState, TransferDirectory, TransferEntry, TransferState, REMOTE_PATH_SEPARATOR,
};

/// slskd API v0 client.
pub struct SlskdClient {
    client: Client,
    config: FileShareConfig,
}

impl SlskdClient {
    pub fn new(config: FileShareConfig) -> Result<Self, FileShareError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| FileShareError::ConnectionFailed(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// `<url><url_base>api/v0`, tolerating missing or doubled slashes.
    fn api_base(&self) -> String {
        let base = self.config.url_base.trim_matches('/');
        let host = self.config.url.trim_end_matches('/');
        if base.is_empty() {
            format!("{}/api/v0", host)
        } else {
            format!("{}/{}/api/v0", host, base)
        }
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_base(), endpoint)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, FileShareError> {
        let response = request
            .header("X-API-Key", &self.config.api_key)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let url = response.url().to_string();
            return Err(FileShareError::NotFound(url));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FileShareError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, FileShareError> {
        response
            .json()
            .await
            .map_err(|e| FileShareError::InvalidResponse(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, FileShareError> {
        let response = self.send(self.client.get(self.api_url(endpoint))).await?;
        Self::parse(response).await
    }
}

fn map_request_error(e: reqwest::Error) -> FileShareError {
    if e.is_timeout() {
        FileShareError::Timeout
    } else if e.is_connect() {
        FileShareError::ConnectionFailed(e.to_string())
    } else {
        FileShareError::ApiError(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SlskdSearch {
    id: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct SlskdSearchResponse {
    username: String,
    #[serde(default)]
    files: Vec<SlskdFile>,
}

#[derive(Debug, Deserialize)]
struct SlskdFile {
    filename: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct SlskdDirectory {
    #[serde(default)]
    name: String,
    #[serde(default)]
    files: Vec<SlskdFile>,
}

/// Directory browse responses come back as either one object or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SlskdDirectoryPayload {
    Many(Vec<SlskdDirectory>),
    One(SlskdDirectory),
}

impl SlskdDirectoryPayload {
    fn into_listing(self, peer: &str, directory: &str) -> Result<DirectoryListing, FileShareError> {
        let dir = match self {
            SlskdDirectoryPayload::One(dir) => dir,
            SlskdDirectoryPayload::Many(dirs) => dirs.into_iter().next().ok_or_else(|| {
                FileShareError::InvalidResponse(format!("Empty listing for {}", directory))
            })?,
        };

        let root = if dir.name.is_empty() {
            directory
        } else {
            dir.name.as_str()
        };
        let files = dir
            .files
            .into_iter()
            .map(|f| {
                let filename = if f.filename.contains(REMOTE_PATH_SEPARATOR) {
                    f.filename
                } else {
                    format!("{}{}{}", root, REMOTE_PATH_SEPARATOR, f.filename)
                };
                RemoteFile::new(peer, filename, f.size)
            })
            .collect();

        Ok(DirectoryListing {
            directory: directory.to_string(),
            files,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SlskdUserTransfers {
    #[serde(default)]
    directories: Vec<SlskdTransferDirectory>,
}

#[derive(Debug, Deserialize)]
struct SlskdTransferDirectory {
    directory: String,
    #[serde(default)]
    files: Vec<SlskdTransfer>,
}

#[derive(Debug, Deserialize)]
struct SlskdTransfer {
    id: String,
    username: String,
    filename: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    state: String,
}

impl SlskdTransfer {
    fn into_entry(self) -> TransferEntry {
        TransferEntry {
            state: parse_transfer_state(&self.state),
            id: self.id,
            peer: self.username,
            filename: self.filename,
            size: self.size,
        }
    }
}

/// Map slskd transfer state flags (e.g. "Completed, Rejected") to a state.
fn parse_transfer_state(state: &str) -> TransferState {
    let flags: Vec<&str> = state.split(',').map(str::trim).collect();
    let has = |flag: &str| flags.iter().any(|f| f.eq_ignore_ascii_case(flag));

    if has("Completed") {
        if has("Succeeded") {
            TransferState::Succeeded
        } else if has("Rejected") {
            TransferState::Rejected
        } else if has("TimedOut") {
            TransferState::TimedOut
        } else if has("Errored") {
            TransferState::Errored
        } else if has("Aborted") {
            TransferState::Aborted
        } else if has("Cancelled") {
            TransferState::Cancelled
        } else {
            TransferState::Unknown
        }
    } else if has("Queued") {
        if has("Remotely") {
            TransferState::QueuedRemotely
        } else {
            TransferState::QueuedLocally
        }
    } else if has("InProgress") {
        TransferState::InProgress
    } else if has("Initializing") {
        TransferState::Initializing
    } else if has("Requested") {
        TransferState::Requested
    } else {
        TransferState::Unknown
    }
}

fn parse_search_state(state: &str) -> SearchState {
    if state.contains("InProgress") || state.starts_with("Requested") {
        SearchState::InProgress
    } else if state.starts_with("Completed") {
        SearchState::Completed
    } else {
        SearchState::Unknown
    }
}

#[async_trait]
impl FileShare for SlskdClient {
    fn name(&self) -> &str {
        "slskd"
    }

    async fn start_search(&self, request: &SearchRequest) -> Result<String, FileShareError> {
        let body = json!({
            "searchText": request.text,
            "searchTimeout": request.search_timeout_ms,
            "filterResponses": request.filter_responses,
            "maximumPeerQueueLength": request.maximum_peer_queue,
            "minimumPeerUploadSpeed": request.minimum_peer_upload_speed,
        });
        let response = self
            .send(self.client.post(self.api_url("/searches")).json(&body))
            .await?;
        let search: SlskdSearch = Self::parse(response).await?;
        debug!(search_id = %search.id, text = %request.text, "Search started");
        Ok(search.id)
    }

    async fn search_state(&self, search_id: &str) -> Result<SearchState, FileShareError> {
        let search: SlskdSearch = self
            .get_json(&format!(
                "/searches/{}?includeResponses=false",
                urlencoding::encode(search_id)
            ))
            .await?;
        Ok(parse_search_state(&search.state))
    }

    async fn search_responses(
        &self,
        search_id: &str,
    ) -> Result<Vec<PeerResponse>, FileShareError> {
        let responses: Vec<SlskdSearchResponse> = self
            .get_json(&format!(
                "/searches/{}/responses",
                urlencoding::encode(search_id)
            ))
            .await?;

        Ok(responses
            .into_iter()
            .map(|r| {
                let peer = r.username;
                let files = r
                    .files
                    .into_iter()
                    .map(|f| RemoteFile::new(peer.clone(), f.filename, f.size))
                    .collect();
                PeerResponse { peer, files }
            })
            .collect())
    }

    async fn delete_search(&self, search_id: &str) -> Result<(), FileShareError> {
        let url = self.api_url(&format!("/searches/{}", urlencoding::encode(search_id)));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn browse_directory(
        &self,
        peer: &str,
        directory: &str,
    ) -> Result<DirectoryListing, FileShareError> {
        let url = self.api_url(&format!("/users/{}/directory", urlencoding::encode(peer)));
        let body = json!({ "directory": directory });
        let response = self.send(self.client.post(url).json(&body)).await?;
        let payload: SlskdDirectoryPayload = Self::parse(response).await?;
        payload.into_listing(peer, directory)
    }

    async fn enqueue(&self, peer: &str, files: &[RemoteFile]) -> Result<(), FileShareError> {
        let url = self.api_url(&format!(
            "/transfers/downloads/{}",
            urlencoding::encode(peer)
        ));
        let body: Vec<_> = files
            .iter()
            .map(|f| json!({ "filename": f.filename, "size": f.size }))
            .collect();
        self.send(self.client.post(url).json(&body)).await?;
        debug!(peer, files = files.len(), "Enqueued downloads");
        Ok(())
    }

    async fn peer_downloads(&self, peer: &str) -> Result<Vec<TransferDirectory>, FileShareError> {
        let endpoint = format!("/transfers/downloads/{}", urlencoding::encode(peer));
        let transfers: SlskdUserTransfers = match self.get_json(&endpoint).await {
            Ok(transfers) => transfers,
            Err(FileShareError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(transfers
            .directories
            .into_iter()
            .map(|d| TransferDirectory {
                directory: d.directory,
                files: d.files.into_iter().map(SlskdTransfer::into_entry).collect(),
            })
            .collect())
    }

    async fn get_transfer(
        &self,
        peer: &str,
        transfer_id: &str,
    ) -> Result<TransferEntry, FileShareError> {
        let transfer: SlskdTransfer = self
            .get_json(&format!(
                "/transfers/downloads/{}/{}",
                urlencoding::encode(peer),
                urlencoding::encode(transfer_id)
            ))
            .await?;
        Ok(transfer.into_entry())
    }

    async fn cancel_transfer(&self, peer: &str, transfer_id: &str) -> Result<(), FileShareError> {
        let url = self.api_url(&format!(
            "/transfers/downloads/{}/{}?remove=false",
            urlencoding::encode(peer),
            urlencoding::encode(transfer_id)
        ));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn remove_completed_downloads(&self) -> Result<(), FileShareError> {
        let url = self.api_url("/transfers/downloads/all/completed");
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, url_base: &str) -> FileShareConfig {
        FileShareConfig {
            url: url.to_string(),
            api_key: "key".to_string(),
            url_base: url_base.to_string(),
            download_dir: "/downloads".into(),
            delete_searches: true,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_api_base_handles_slashes() {
        let client = SlskdClient::new(config("http://slskd:5030/", "/")).unwrap();
        assert_eq!(client.api_base(), "http://slskd:5030/api/v0");

        let client = SlskdClient::new(config("http://host", "/slskd/")).unwrap();
        assert_eq!(client.api_base(), "http://host/slskd/api/v0");

        let client = SlskdClient::new(config("http://host", "slskd")).unwrap();
        assert_eq!(client.api_url("/searches"), "http://host/slskd/api/v0/searches");
    }

    #[test]
    fn test_parse_transfer_state() {
        assert_eq!(
            parse_transfer_state("Completed, Succeeded"),
            TransferState::Succeeded
        );
        assert_eq!(
            parse_transfer_state("Completed, Rejected"),
            TransferState::Rejected
        );
        assert_eq!(
            parse_transfer_state("Completed, TimedOut"),
            TransferState::TimedOut
        );
        assert_eq!(
            parse_transfer_state("Completed, Errored"),
            TransferState::Errored
        );
        assert_eq!(
            parse_transfer_state("Completed, Cancelled"),
            TransferState::Cancelled
        );
        assert_eq!(
            parse_transfer_state("Queued, Remotely"),
            TransferState::QueuedRemotely
        );
        assert_eq!(
            parse_transfer_state("Queued, Locally"),
            TransferState::QueuedLocally
        );
        assert_eq!(parse_transfer_state("InProgress"), TransferState::InProgress);
        assert_eq!(parse_transfer_state("Requested"), TransferState::Requested);
        assert_eq!(parse_transfer_state(""), TransferState::Unknown);
    }

    #[test]
    fn test_parse_search_state() {
        assert_eq!(parse_search_state("InProgress"), SearchState::InProgress);
        assert_eq!(parse_search_state("Requested"), SearchState::InProgress);
        assert_eq!(
            parse_search_state("Completed, TimedOut"),
            SearchState::Completed
        );
        assert_eq!(parse_search_state("None"), SearchState::Unknown);
    }

    #[test]
    fn test_directory_payload_list_and_object() {
        let list: SlskdDirectoryPayload = serde_json::from_str(
            r#"[{"name": "Books\\Herbert", "fileCount": 1,
                 "files": [{"filename": "Dune.epub", "size": 100}]}]"#,
        )
        .unwrap();
        let listing = list.into_listing("alice", "Books\\Herbert").unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].filename, "Books\\Herbert\\Dune.epub");
        assert_eq!(listing.files[0].peer, "alice");

        let object: SlskdDirectoryPayload = serde_json::from_str(
            r#"{"name": "Books\\Herbert", "files": [{"filename": "Dune.mobi", "size": 5}]}"#,
        )
        .unwrap();
        let listing = object.into_listing("alice", "Books\\Herbert").unwrap();
        assert_eq!(listing.files[0].filename, "Books\\Herbert\\Dune.mobi");

        let empty: SlskdDirectoryPayload = serde_json::from_str("[]").unwrap();
        assert!(matches!(
            empty.into_listing("alice", "x"),
            Err(FileShareError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_user_transfers_deserialization() {
        let json = r#"{
            "username": "alice",
            "directories": [{
                "directory": "Books\\Herbert",
                "fileCount": 1,
                "files": [{
                    "id": "0b1c", "username": "alice", "direction": "Download",
                    "filename": "Books\\Herbert\\Dune.epub", "size": 100,
                    "state": "Queued, Remotely"
                }]
            }]
        }"#;
        let transfers: SlskdUserTransfers = serde_json::from_str(json).unwrap();
        let entry = transfers
            .directories
            .into_iter()
            .next()
            .unwrap()
            .files
            .into_iter()
            .next()
            .unwrap()
            .into_entry();
        assert_eq!(entry.id, "0b1c");
        assert_eq!(entry.state, TransferState::QueuedRemotely);
    }
}
