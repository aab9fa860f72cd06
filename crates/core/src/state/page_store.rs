use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

/// Next wanted-list page for incrementing paging, kept in a one-line file.
#[derive(Debug, Clone)]
pub struct PageStore {
    path: PathBuf,
}

impl PageStore {
    pub const DEFAULT_PAGE: u32 = 1;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored page, or page 1 when the file is missing, empty or invalid.
    /// In those cases the default is written back.
    pub async fn load(&self) -> std::io::Result<u32> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => match content.trim().parse::<u32>() {
                Ok(page) if page > 0 => return Ok(page),
                _ => {
                    if !content.trim().is_empty() {
                        warn!(path = %self.path.display(), content = %content.trim(), "Invalid page file, resetting");
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.save(Self::DEFAULT_PAGE).await?;
        Ok(Self::DEFAULT_PAGE)
    }

    pub async fn save(&self, page: u32) -> std::io::Result<()> {
        fs::write(&self.path, page.to_string()).await
    }
}

/// Page to use after `page`, wrapping to 1 past the last page.
pub fn next_page(page: u32, total_records: u32, page_size: u32) -> u32 {
    let pages = total_records.div_ceil(page_size.max(1));
    if page >= pages {
        1
    } else {
        page + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_defaults_and_is_created() {
        let dir = TempDir::new().unwrap();
        let store = PageStore::new(dir.path().join(".current_page.txt"));

        assert_eq!(store.load().await.unwrap(), 1);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "1");
    }

    #[tokio::test]
    async fn test_roundtrip_and_garbage() {
        let dir = TempDir::new().unwrap();
        let store = PageStore::new(dir.path().join("page"));

        store.save(4).await.unwrap();
        assert_eq!(store.load().await.unwrap(), 4);

        std::fs::write(store.path(), "four\n").unwrap();
        assert_eq!(store.load().await.unwrap(), 1);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "1");
    }

    #[test]
    fn test_next_page_wraps() {
        assert_eq!(next_page(1, 25, 10), 2);
        assert_eq!(next_page(2, 25, 10), 3);
        assert_eq!(next_page(3, 25, 10), 1);
        assert_eq!(next_page(1, 0, 10), 1);
        assert_eq!(next_page(7, 25, 10), 1);
    }
}
