//! Error types for kindops

use thiserror::Error;

use crate::command::CommandError;
use crate::deploy::DeployError;
use crate::filesys::FileSysError;
use crate::params::ValidationErrors;
use crate::registry::RegistryError;
use crate::render::RenderError;
use crate::tasks::{ConflictError, TrackerError};

/// Main error type for kindops
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("deployment failed: {0}")]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    FileSys(#[from] FileSysError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
