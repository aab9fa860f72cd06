use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// One line of the failure log.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureLogEntry {
    pub timestamp: DateTime<Local>,
    pub author_name: String,
    pub title: String,
}

impl FailureLogEntry {
    pub fn new(author_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            author_name: author_name.into(),
            title: title.into(),
        }
    }

    /// `dd/mm/YYYY HH:MM:SS - author, title`
    pub fn to_line(&self) -> String {
        format!(
            "{} - {}, {}",
            self.timestamp.format("%d/%m/%Y %H:%M:%S"),
            self.author_name,
            self.title
        )
    }
}

/// Append-only plain-text log of items given up on.
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &FailureLogEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", entry.to_line()).as_bytes())
            .await?;
        file.flush().await
    }
}
