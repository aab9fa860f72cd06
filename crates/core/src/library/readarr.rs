//! Readarr library service implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::LibraryConfig;

use super::{
    Author, CommandState, LibraryCommand, LibraryError, LibraryService, QualityProfile,
    QualityProfileItem, WantedItem, WantedPage, WantedSource,
};

/// Readarr API v1 client.
pub struct ReadarrClient {
    client: Client,
    config: LibraryConfig,
}

impl ReadarrClient {
    pub fn new(config: LibraryConfig) -> Result<Self, LibraryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| LibraryError::ConnectionFailed(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/api/v1{}", self.config.url.trim_end_matches('/'), endpoint)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("X-Api-Key", &self.config.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, LibraryError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let url = response.url().to_string();
            return Err(LibraryError::NotFound(url));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LibraryError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, LibraryError> {
        let response = self.send(self.client.get(self.api_url(endpoint))).await?;
        response
            .json()
            .await
            .map_err(|e| LibraryError::ApiError(format!("Failed to parse response: {}", e)))
    }
}

fn map_request_error(e: reqwest::Error) -> LibraryError {
    if e.is_timeout() {
        LibraryError::Timeout
    } else if e.is_connect() {
        LibraryError::ConnectionFailed(e.to_string())
    } else {
        LibraryError::ApiError(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadarrPage {
    page: u32,
    page_size: u32,
    total_records: u32,
    #[serde(default)]
    records: Vec<ReadarrBook>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadarrBook {
    id: i64,
    title: String,
    author_id: i64,
    #[serde(default)]
    monitored: bool,
}

impl ReadarrBook {
    fn into_item(self) -> WantedItem {
        WantedItem {
            id: self.id,
            title: self.title,
            author_id: self.author_id,
            monitored: self.monitored,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadarrAuthor {
    id: i64,
    author_name: String,
    quality_profile_id: i64,
}

#[derive(Debug, Deserialize)]
struct ReadarrQualityProfile {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    items: Vec<ReadarrProfileItem>,
}

/// A profile entry is either a single quality or a named group of qualities.
#[derive(Debug, Deserialize)]
struct ReadarrProfileItem {
    #[serde(default)]
    quality: Option<ReadarrQuality>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    allowed: bool,
}

#[derive(Debug, Deserialize)]
struct ReadarrQuality {
    name: String,
}

impl ReadarrQualityProfile {
    fn into_profile(self) -> QualityProfile {
        let items = self
            .items
            .into_iter()
            .filter_map(|item| {
                let filetype_name = item.quality.map(|q| q.name).or(item.name)?;
                Some(QualityProfileItem {
                    filetype_name,
                    allowed: item.allowed,
                })
            })
            .collect();

        QualityProfile {
            id: self.id,
            name: self.name,
            items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReadarrLookup {
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ReadarrCommand {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    body: Option<ReadarrCommandBody>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadarrCommandBody {
    #[serde(default)]
    path: Option<String>,
}

impl ReadarrCommand {
    fn into_command(self) -> LibraryCommand {
        LibraryCommand {
            id: self.id,
            name: self.name,
            state: parse_command_status(&self.status),
            path: self.body.and_then(|b| b.path),
            message: self.message,
        }
    }
}

fn parse_command_status(status: &str) -> CommandState {
    match status.to_ascii_lowercase().as_str() {
        "queued" => CommandState::Queued,
        "started" => CommandState::Started,
        "completed" => CommandState::Completed,
        "failed" => CommandState::Failed,
        "aborted" => CommandState::Aborted,
        "cancelled" => CommandState::Cancelled,
        "orphaned" => CommandState::Orphaned,
        _ => CommandState::Unknown,
    }
}

/// First lookup result that refers to an item already in the library.
fn resolve_lookup(results: Vec<ReadarrLookup>) -> Option<i64> {
    results
        .into_iter()
        .next()
        .and_then(|r| r.id)
        .filter(|id| *id > 0)
}

#[async_trait]
impl LibraryService for ReadarrClient {
    fn name(&self) -> &str {
        "readarr"
    }

    async fn wanted(
        &self,
        source: WantedSource,
        page: u32,
        page_size: u32,
    ) -> Result<WantedPage, LibraryError> {
        let endpoint = format!(
            "/wanted/{}?page={}&pageSize={}&sortKey=title&sortDirection=ascending",
            source.as_str(),
            page,
            page_size
        );
        debug!(source = source.as_str(), page, page_size, "Fetching wanted page");

        let wire: ReadarrPage = self.get_json(&endpoint).await?;
        Ok(WantedPage {
            page: wire.page,
            page_size: wire.page_size,
            total_records: wire.total_records,
            records: wire.records.into_iter().map(ReadarrBook::into_item).collect(),
        })
    }

    async fn get_author(&self, author_id: i64) -> Result<Author, LibraryError> {
        let wire: ReadarrAuthor = self.get_json(&format!("/author/{}", author_id)).await?;
        Ok(Author {
            id: wire.id,
            author_name: wire.author_name,
            quality_profile_id: wire.quality_profile_id,
        })
    }

    async fn get_quality_profile(&self, profile_id: i64) -> Result<QualityProfile, LibraryError> {
        let wire: ReadarrQualityProfile = self
            .get_json(&format!("/qualityprofile/{}", profile_id))
            .await?;
        Ok(wire.into_profile())
    }

    async fn update_item(&self, item: &WantedItem) -> Result<(), LibraryError> {
        let body = json!({
            "bookIds": [item.id],
            "monitored": item.monitored,
        });
        self.send(self.client.put(self.api_url("/book/monitor")).json(&body))
            .await?;
        debug!(item_id = item.id, monitored = item.monitored, "Updated item");
        Ok(())
    }

    async fn lookup_isbn(&self, isbn: &str) -> Result<Option<i64>, LibraryError> {
        let term = format!("isbn:{}", isbn);
        let endpoint = format!("/book/lookup?term={}", urlencoding::encode(&term));
        let results: Vec<ReadarrLookup> = self.get_json(&endpoint).await?;
        Ok(resolve_lookup(results))
    }

    async fn submit_command(
        &self,
        name: &str,
        path: &str,
    ) -> Result<LibraryCommand, LibraryError> {
        let body = json!({ "name": name, "path": path });
        let response = self
            .send(self.client.post(self.api_url("/command")).json(&body))
            .await?;
        let wire: ReadarrCommand = response
            .json()
            .await
            .map_err(|e| LibraryError::ApiError(format!("Failed to parse response: {}", e)))?;
        Ok(wire.into_command())
    }

    async fn get_command(&self, command_id: i64) -> Result<LibraryCommand, LibraryError> {
        let wire: ReadarrCommand = self.get_json(&format!("/command/{}", command_id)).await?;
        Ok(wire.into_command())
    }
}
