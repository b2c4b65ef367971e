//! File operations

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;

/// Errors from reading files
#[derive(Error, Debug)]
pub enum FileSysError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, FileSysError> {
        fs::read_to_string(&self.path)
            .await
            .map_err(|source| FileSysError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, FileSysError> {
        let contents = self.read_string().await?;
        serde_json::from_str(&contents).map_err(|source| FileSysError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Read file as YAML. JSON files parse too.
    pub async fn read_yaml<T: DeserializeOwned>(&self) -> Result<T, FileSysError> {
        let contents = self.read_string().await?;
        serde_yaml::from_str(&contents).map_err(|source| FileSysError::Yaml {
            path: self.path.clone(),
            source,
        })
    }
}
