//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::filesys::file::{File, FileSysError};

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Files in the directory, sorted by name. Symlinks are followed.
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, FileSysError> {
        self.list(|meta| meta.is_file()).await
    }

    /// Subdirectories, sorted by name. Symlinks are followed.
    pub async fn list_dirs(&self) -> Result<Vec<PathBuf>, FileSysError> {
        self.list(|meta| meta.is_dir()).await
    }

    async fn list(&self, keep: impl Fn(&std::fs::Metadata) -> bool) -> Result<Vec<PathBuf>, FileSysError> {
        let io_err = |source| FileSysError::Io {
            path: self.path.clone(),
            source,
        };

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&self.path).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            // Dangling links have no target metadata
            let Ok(meta) = fs::metadata(&path).await else {
                continue;
            };
            if keep(&meta) {
                paths.push(path);
            }
        }

        paths.sort();
        Ok(paths)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}
