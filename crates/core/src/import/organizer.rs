//! Moving validated files into author folders and rejected ones into quarantine.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use super::ImportError;

/// Strip characters that are unsafe in folder names.
///
/// Removes `<>:"/\|?*` and control characters, then trims surrounding
/// whitespace and trailing dots.
pub fn sanitize_folder_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect();
    cleaned.trim().trim_end_matches('.').trim_end().to_string()
}

/// Attempts a rename; `Ok(false)` means source and destination are on
/// different filesystems.
async fn try_rename(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
    match fs::rename(source, destination).await {
        Ok(()) => Ok(true),
        Err(e) => {
            // EXDEV is 18 on Linux
            if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                Ok(false)
            } else {
                Err(e)
            }
        }
    }
}

async fn copy_dir(source: &Path, destination: &Path) -> Result<(), std::io::Error> {
    let mut pending = vec![(source.to_path_buf(), destination.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), target).await?;
            }
        }
    }
    Ok(())
}

/// Move a file or directory, copying and removing across filesystems.
async fn move_path(source: &Path, destination: &Path) -> Result<(), ImportError> {
    let io_err = |source: std::io::Error| ImportError::Io {
        path: destination.to_path_buf(),
        source,
    };

    if try_rename(source, destination).await.map_err(io_err)? {
        return Ok(());
    }

    debug!(from = %source.display(), to = %destination.display(), "Cross-device move, copying");
    if fs::metadata(source).await.map_err(io_err)?.is_dir() {
        copy_dir(source, destination).await.map_err(io_err)?;
        fs::remove_dir_all(source).await.map_err(io_err)?;
    } else {
        fs::copy(source, destination).await.map_err(io_err)?;
        fs::remove_file(source).await.map_err(io_err)?;
    }
    Ok(())
}

/// Remove `dir` if it exists and is empty. Failures are logged.
async fn remove_if_empty(dir: &Path) {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return;
    };
    if let Ok(None) = entries.next_entry().await {
        match fs::remove_dir(dir).await {
            Ok(()) => debug!(dir = %dir.display(), "Removed empty source directory"),
            Err(e) => warn!(dir = %dir.display(), error = %e, "Could not remove source directory"),
        }
    }
}

/// `<root>/<name>`, or the first free `<root>/<name>_N` for N = 1, 2, ...
async fn unique_path(root: &Path, name: &str) -> PathBuf {
    let mut candidate = root.join(name);
    let mut counter = 1;
    while fs::try_exists(&candidate).await.unwrap_or(false) {
        candidate = root.join(format!("{}_{}", name, counter));
        counter += 1;
    }
    candidate
}

/// File moves below the local download directory.
#[derive(Debug, Clone)]
pub struct FileOrganizer {
    download_dir: PathBuf,
    quarantine_dir_name: String,
}

impl FileOrganizer {
    pub fn new(download_dir: impl Into<PathBuf>, quarantine_dir_name: impl Into<String>) -> Self {
        Self {
            download_dir: download_dir.into(),
            quarantine_dir_name: quarantine_dir_name.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.download_dir.join(&self.quarantine_dir_name)
    }

    /// Move `source` into `<download_dir>/<sanitized author>/` and return the
    /// author folder name.
    ///
    /// Refuses to overwrite an existing file. The source directory is removed
    /// afterwards if it is left empty.
    pub async fn organize(&self, source: &Path, author_name: &str) -> Result<String, ImportError> {
        if !fs::try_exists(source).await.unwrap_or(false) {
            return Err(ImportError::SourceMissing(source.to_path_buf()));
        }
        let file_name = source
            .file_name()
            .ok_or_else(|| ImportError::SourceMissing(source.to_path_buf()))?;

        let author_dir = sanitize_folder_name(author_name);
        let target_dir = self.download_dir.join(&author_dir);
        fs::create_dir_all(&target_dir)
            .await
            .map_err(|source| ImportError::Io {
                path: target_dir.clone(),
                source,
            })?;

        let target = target_dir.join(file_name);
        if fs::try_exists(&target).await.unwrap_or(false) {
            return Err(ImportError::TargetExists(target));
        }

        move_path(source, &target).await?;
        info!(from = %source.display(), to = %target.display(), "Organized file");
        self.cleanup_parent(source).await;
        Ok(author_dir)
    }

    /// Move a rejected file into a fresh quarantine folder named after the
    /// author.
    pub async fn quarantine_file(
        &self,
        source: &Path,
        author_name: &str,
    ) -> Result<PathBuf, ImportError> {
        if !fs::try_exists(source).await.unwrap_or(false) {
            return Err(ImportError::SourceMissing(source.to_path_buf()));
        }
        let file_name = source
            .file_name()
            .ok_or_else(|| ImportError::SourceMissing(source.to_path_buf()))?;

        let root = self.quarantine_dir();
        let target_dir = unique_path(&root, &sanitize_folder_name(author_name)).await;
        fs::create_dir_all(&target_dir)
            .await
            .map_err(|source| ImportError::Io {
                path: target_dir.clone(),
                source,
            })?;

        move_path(source, &target_dir.join(file_name)).await?;
        info!(file = %source.display(), to = %target_dir.display(), "Quarantined file");
        self.cleanup_parent(source).await;
        Ok(target_dir)
    }

    /// Move a whole directory into quarantine under a collision-free name.
    pub async fn quarantine_dir_tree(&self, dir: &Path) -> Result<PathBuf, ImportError> {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            return Err(ImportError::SourceMissing(dir.to_path_buf()));
        }
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ImportError::SourceMissing(dir.to_path_buf()))?;

        let root = self.quarantine_dir();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| ImportError::Io {
                path: root.clone(),
                source,
            })?;
        let target = unique_path(&root, &name).await;
        move_path(dir, &target).await?;
        info!(dir = %dir.display(), to = %target.display(), "Quarantined directory");
        Ok(target)
    }

    async fn cleanup_parent(&self, source: &Path) {
        if let Some(parent) = source.parent() {
            if parent != self.download_dir {
                remove_if_empty(parent).await;
            }
        }
    }
}
