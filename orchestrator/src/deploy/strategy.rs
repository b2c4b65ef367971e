//! Deployment strategy contract

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::{CommandError, CommandFailed};
use crate::deploy::backend::Backend;
use crate::deploy::chart::ChartStrategy;
use crate::deploy::raw::RawManifestStrategy;
use crate::render::{BackendHint, RenderedManifest};

/// Which strategy a template deploys with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyKind {
    /// Rendered resource documents applied directly
    RawManifest,

    /// A packaged chart installed with the rendered values overlay
    Chart {
        chart: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repo: Option<String>,
    },
}

impl StrategyKind {
    /// The render output this strategy consumes
    pub fn backend_hint(&self) -> BackendHint {
        match self {
            StrategyKind::RawManifest => BackendHint::RawManifest,
            StrategyKind::Chart { .. } => BackendHint::Chart,
        }
    }
}

/// Observed state of a deployed subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub ready_pods: usize,
    pub total_pods: usize,
    pub services: Vec<String>,

    /// Backend-specific state, e.g. the chart release status
    pub raw_state: String,

    /// Whether the subject counts as up and serving
    pub live: bool,
}

/// Errors raised by strategy operations
#[derive(Error, Debug)]
pub enum DeployError {
    /// The tool gave up waiting; the subject may or may not be live
    #[error("command '{}' timed out: {detail}", .argv.join(" "))]
    Timeout { argv: Vec<String>, detail: String },

    #[error("{0}")]
    Backend(CommandFailed),

    #[error(transparent)]
    Command(#[from] CommandError),

    /// The run was cancelled before this command started
    #[error("cancelled before running '{}'", .argv.join(" "))]
    Cancelled { argv: Vec<String> },

    #[error("unexpected output from '{command}': {reason}")]
    Output { command: String, reason: String },

    #[error("strategy expects {expected:?} output, got {found:?}")]
    BackendMismatch {
        expected: BackendHint,
        found: BackendHint,
    },
}

impl DeployError {
    /// Timeout-class errors leave the outcome unknown
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, DeployError::Timeout { .. })
    }

    /// The failed command, when the error came from one
    pub fn failed_command(&self) -> Option<&CommandFailed> {
        match self {
            DeployError::Backend(failed) => Some(failed),
            DeployError::Command(CommandError::Failed(failed)) => Some(failed),
            _ => None,
        }
    }
}

/// Realizes, inspects and removes a deployed subject
#[async_trait]
pub trait DeploymentStrategy: Send + Sync {
    /// Converge the cluster onto the rendered manifest. Re-running with the
    /// same manifest is a no-op.
    async fn deploy(&self, manifest: &RenderedManifest, namespace: &str) -> Result<(), DeployError>;

    /// Read-only inspection
    async fn check_status(&self, subject: &str, namespace: &str) -> Result<StatusReport, DeployError>;

    /// Remove the subject; an absent subject is a success
    async fn delete(&self, subject: &str, namespace: &str) -> Result<(), DeployError>;

    /// The strategy name for logs
    fn name(&self) -> &str;
}

/// Factory for creating deployment strategies
pub struct StrategyFactory;

impl StrategyFactory {
    /// Create the strategy for the given kind
    pub fn create(kind: &StrategyKind, backend: Backend) -> Arc<dyn DeploymentStrategy> {
        match kind {
            StrategyKind::RawManifest => Arc::new(RawManifestStrategy::new(backend)),
            StrategyKind::Chart {
                chart,
                version,
                repo,
            } => Arc::new(ChartStrategy::new(
                backend,
                chart.clone(),
                version.clone(),
                repo.clone(),
            )),
        }
    }
}

pub(crate) fn ensure_backend(
    manifest: &RenderedManifest,
    expected: BackendHint,
) -> Result<(), DeployError> {
    if manifest.backend() != expected {
        return Err(DeployError::BackendMismatch {
            expected,
            found: manifest.backend(),
        });
    }
    Ok(())
}
