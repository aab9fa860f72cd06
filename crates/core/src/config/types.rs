use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub library: LibraryConfig,
    pub fileshare: FileShareConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Library-management service (Readarr API) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Base URL (e.g., "http://localhost:8787")
    pub url: String,
    pub api_key: String,
    /// Download directory as seen by the library service.
    /// Import scan commands point below this path.
    pub download_dir: PathBuf,
    /// Skip the whole import phase.
    #[serde(default)]
    pub disable_sync: bool,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

/// File-sharing service (slskd API) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileShareConfig {
    /// Base URL (e.g., "http://localhost:5030")
    pub url: String,
    pub api_key: String,
    /// URL base the service is mounted under (default: "/")
    #[serde(default = "default_url_base")]
    pub url_base: String,
    /// Local directory where completed transfers land.
    pub download_dir: PathBuf,
    /// Delete searches from the service once they have been consumed.
    #[serde(default = "default_true")]
    pub delete_searches: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

fn default_url_base() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

/// Which wanted list(s) to pull items from.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    #[default]
    Missing,
    CutoffUnmet,
    All,
}

/// How many pages of the wanted list a run consumes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PagingMode {
    #[default]
    FirstPage,
    All,
    /// One page per run, advancing a persisted page index.
    IncrementingPage,
}

/// Search and matching configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub source: SearchSource,
    #[serde(default)]
    pub paging: PagingMode,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_minimum_match_ratio")]
    pub minimum_match_ratio: f64,
    #[serde(default = "default_title_bonus")]
    pub title_bonus: f64,
    /// Peers whose files are never accepted.
    #[serde(default)]
    pub ignored_users: Vec<String>,
    /// Titles containing any of these words (case-insensitive) are skipped.
    #[serde(default)]
    pub title_blacklist: Vec<String>,
    /// Search duration requested from the service.
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    #[serde(default = "default_maximum_peer_queue")]
    pub maximum_peer_queue: u32,
    #[serde(default)]
    pub minimum_peer_upload_speed: u32,
    /// Fixed wait after starting a search before polling its state.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_state_poll_interval_ms")]
    pub state_poll_interval_ms: u64,
    /// Upper bound on polling a search that never leaves "in progress".
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Match against full peer directory listings instead of search hits.
    #[serde(default)]
    pub browse_directories: bool,
    /// Unmonitor items whose acquisition failed.
    #[serde(default)]
    pub remove_wanted_on_failure: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            source: SearchSource::default(),
            paging: PagingMode::default(),
            page_size: default_page_size(),
            minimum_match_ratio: default_minimum_match_ratio(),
            title_bonus: default_title_bonus(),
            ignored_users: Vec::new(),
            title_blacklist: Vec::new(),
            search_timeout_ms: default_search_timeout_ms(),
            maximum_peer_queue: default_maximum_peer_queue(),
            minimum_peer_upload_speed: 0,
            settle_delay_ms: default_settle_delay_ms(),
            state_poll_interval_ms: default_state_poll_interval_ms(),
            deadline_secs: default_deadline_secs(),
            browse_directories: false,
            remove_wanted_on_failure: false,
        }
    }
}

fn default_page_size() -> u32 {
    10
}

fn default_minimum_match_ratio() -> f64 {
    0.5
}

fn default_title_bonus() -> f64 {
    0.3
}

fn default_search_timeout_ms() -> u64 {
    5000
}

fn default_maximum_peer_queue() -> u32 {
    50
}

fn default_settle_delay_ms() -> u64 {
    10_000
}

fn default_state_poll_interval_ms() -> u64 {
    1000
}

fn default_deadline_secs() -> u64 {
    300
}

/// Download enqueue and monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// A record older than this is aborted regardless of progress.
    #[serde(default = "default_stalled_timeout_secs")]
    pub stalled_timeout_secs: u64,
    /// A record whose files are all remotely queued for this long is aborted.
    #[serde(default = "default_remote_queue_timeout_secs")]
    pub remote_queue_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Transfer listing polls after an enqueue before giving up.
    #[serde(default = "default_enqueue_attempts")]
    pub enqueue_attempts: u32,
    #[serde(default = "default_enqueue_poll_interval_ms")]
    pub enqueue_poll_interval_ms: u64,
    #[serde(default = "default_max_file_retries")]
    pub max_file_retries: u32,
    /// Abort once rejected retries exceed this multiple of the file count.
    #[serde(default = "default_rejected_retry_factor")]
    pub rejected_retry_factor: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            stalled_timeout_secs: default_stalled_timeout_secs(),
            remote_queue_timeout_secs: default_remote_queue_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            enqueue_attempts: default_enqueue_attempts(),
            enqueue_poll_interval_ms: default_enqueue_poll_interval_ms(),
            max_file_retries: default_max_file_retries(),
            rejected_retry_factor: default_rejected_retry_factor(),
        }
    }
}

fn default_stalled_timeout_secs() -> u64 {
    3600
}

fn default_remote_queue_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_enqueue_attempts() -> u32 {
    4
}

fn default_enqueue_poll_interval_ms() -> u64 {
    2000
}

fn default_max_file_retries() -> u32 {
    5
}

fn default_rejected_retry_factor() -> f64 {
    1.2
}

/// Outcome of validation when metadata cannot be checked.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Missing metadata, unresolvable identifiers and parse errors reject the file.
    #[default]
    FailClosed,
    /// The same conditions accept the file.
    FailOpen,
}

/// Import configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Directory under the local download dir receiving rejected files.
    #[serde(default = "default_quarantine_dir_name")]
    pub quarantine_dir_name: String,
    #[serde(default = "default_scan_command")]
    pub scan_command: String,
    #[serde(default = "default_command_poll_interval_ms")]
    pub command_poll_interval_ms: u64,
    #[serde(default)]
    pub validation_policy: ValidationPolicy,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            quarantine_dir_name: default_quarantine_dir_name(),
            scan_command: default_scan_command(),
            command_poll_interval_ms: default_command_poll_interval_ms(),
            validation_policy: ValidationPolicy::default(),
        }
    }
}

fn default_quarantine_dir_name() -> String {
    "failed_imports".to_string()
}

fn default_scan_command() -> String {
    "DownloadedBooksScan".to_string()
}

fn default_command_poll_interval_ms() -> u64 {
    2000
}

/// Retry policy for library-service connectivity failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Persisted run state (page index, failure log)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics export configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Write the metrics in Prometheus text format here at the end of a run.
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub library: SanitizedServiceConfig,
    pub fileshare: SanitizedServiceConfig,
    pub search: SearchConfig,
    pub download: DownloadConfig,
    pub import: ImportConfig,
    pub state: StateConfig,
}

/// Service endpoint with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServiceConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub download_dir: PathBuf,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            library: SanitizedServiceConfig {
                url: config.library.url.clone(),
                api_key_configured: !config.library.api_key.is_empty(),
                download_dir: config.library.download_dir.clone(),
            },
            fileshare: SanitizedServiceConfig {
                url: config.fileshare.url.clone(),
                api_key_configured: !config.fileshare.api_key.is_empty(),
                download_dir: config.fileshare.download_dir.clone(),
            },
            search: config.search.clone(),
            download: config.download.clone(),
            import: config.import.clone(),
            state: config.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[library]
url = "http://localhost:8787"
api_key = "lib-key"
download_dir = "/books/downloads"

[fileshare]
url = "http://localhost:5030"
api_key = "share-key"
download_dir = "/srv/slskd/downloads"
"#;

    #[test]
    fn test_deserialize_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.fileshare.url_base, "/");
        assert!(config.fileshare.delete_searches);
        assert!(!config.library.disable_sync);
        assert_eq!(config.search.page_size, 10);
        assert_eq!(config.search.minimum_match_ratio, 0.5);
        assert_eq!(config.search.title_bonus, 0.3);
        assert_eq!(config.search.source, SearchSource::Missing);
        assert_eq!(config.search.paging, PagingMode::FirstPage);
        assert_eq!(config.download.stalled_timeout_secs, 3600);
        assert_eq!(config.download.remote_queue_timeout_secs, 300);
        assert_eq!(config.download.max_file_retries, 5);
        assert_eq!(config.import.quarantine_dir_name, "failed_imports");
        assert_eq!(config.import.validation_policy, ValidationPolicy::FailClosed);
        assert!(config.metrics.textfile.is_none());
    }

    #[test]
    fn test_deserialize_search_modes() {
        let toml = format!(
            "{}\n[search]\nsource = \"cutoff_unmet\"\npaging = \"incrementing_page\"\nignored_users = [\"leech\"]\n",
            MINIMAL
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.search.source, SearchSource::CutoffUnmet);
        assert_eq!(config.search.paging, PagingMode::IncrementingPage);
        assert_eq!(config.search.ignored_users, vec!["leech".to_string()]);
    }

    #[test]
    fn test_deserialize_missing_fileshare_fails() {
        let toml = r#"
[library]
url = "http://localhost:8787"
api_key = "lib-key"
download_dir = "/books/downloads"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_hides_keys() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.library.api_key_configured);
        assert!(sanitized.fileshare.api_key_configured);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("lib-key"));
        assert!(!json.contains("share-key"));
    }
}
