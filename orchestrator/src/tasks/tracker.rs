//! Tracker settings and errors

use std::time::Duration;

use thiserror::Error;

use crate::registry::RegistryError;
use crate::tasks::model::TaskKey;

/// Timing of a deployment run
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// How long the deploy command may wait for readiness
    pub deploy_timeout: Duration,

    /// Timeout for each status check
    pub status_timeout: Duration,

    /// Delay between verification polls, also the deploy progress tick
    pub poll_interval: Duration,

    /// Verification poll budget
    pub max_poll_attempts: u32,

    /// Upper bound on time spent verifying
    pub max_verify_elapsed: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            deploy_timeout: Duration::from_secs(300),
            status_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            max_poll_attempts: 24,
            max_verify_elapsed: Duration::from_secs(180),
        }
    }
}

/// A live task already owns the (subject, namespace) pair
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("a deployment of {key} is already in progress (task {existing})")]
pub struct ConflictError {
    pub key: TaskKey,
    pub existing: String,
}

/// Tracker errors
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("task '{0}' not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("task store error: {0}")]
    Store(String),

    #[error("{0}")]
    Transition(String),
}
