//! Types for library-management service operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the library service.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

impl LibraryError {
    /// Whether the failure is a transient connectivity problem worth retrying.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, LibraryError::ConnectionFailed(_) | LibraryError::Timeout)
    }
}

/// A book the library marks as wanted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WantedItem {
    pub id: i64,
    pub title: String,
    pub author_id: i64,
    pub monitored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub author_name: String,
    pub quality_profile_id: i64,
}

/// One entry of a quality profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityProfileItem {
    /// Filetype name, e.g. "EPUB" or "MOBI".
    pub filetype_name: String,
    pub allowed: bool,
}

/// An ordered list of filetypes with allowed flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub id: i64,
    pub name: String,
    pub items: Vec<QualityProfileItem>,
}

/// Which wanted list to page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WantedSource {
    Missing,
    CutoffUnmet,
}

impl WantedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WantedSource::Missing => "missing",
            WantedSource::CutoffUnmet => "cutoff",
        }
    }
}

/// One page of the wanted list.
#[derive(Debug, Clone, PartialEq)]
pub struct WantedPage {
    pub page: u32,
    pub page_size: u32,
    pub total_records: u32,
    pub records: Vec<WantedItem>,
}

/// Lifecycle state of a library command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Queued,
    Started,
    Completed,
    Failed,
    Aborted,
    Cancelled,
    Orphaned,
    Unknown,
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            CommandState::Queued | CommandState::Started | CommandState::Unknown
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CommandState::Failed
                | CommandState::Aborted
                | CommandState::Cancelled
                | CommandState::Orphaned
        )
    }
}

/// A submitted library command and its latest known status.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryCommand {
    pub id: i64,
    pub name: String,
    pub state: CommandState,
    /// Path argument the command was submitted with.
    pub path: Option<String>,
    pub message: Option<String>,
}

/// Trait for library-management service backends.
#[async_trait]
pub trait LibraryService: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Fetch one page of wanted items, sorted by title ascending.
    async fn wanted(
        &self,
        source: WantedSource,
        page: u32,
        page_size: u32,
    ) -> Result<WantedPage, LibraryError>;

    async fn get_author(&self, author_id: i64) -> Result<Author, LibraryError>;

    async fn get_quality_profile(&self, profile_id: i64) -> Result<QualityProfile, LibraryError>;

    /// Persist an item's monitored flag.
    async fn update_item(&self, item: &WantedItem) -> Result<(), LibraryError>;

    /// Resolve an ISBN to the id of the matching library item, if any.
    async fn lookup_isbn(&self, isbn: &str) -> Result<Option<i64>, LibraryError>;

    /// Submit a command (e.g. a downloaded-books scan) for `path`.
    async fn submit_command(&self, name: &str, path: &str)
        -> Result<LibraryCommand, LibraryError>;

    async fn get_command(&self, command_id: i64) -> Result<LibraryCommand, LibraryError>;
}

/// Everything needed to acquire one wanted item.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTarget {
    pub item: WantedItem,
    pub author: Author,
    pub profile: QualityProfile,
}
