//! Task records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{CommandError, CommandFailed};
use crate::deploy::DeployError;
use crate::params::{ValidationError, ValidationErrors};
use crate::render::RenderError;
use crate::tasks::fsm::TaskState;

/// The uniqueness key of a live task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub subject: String,
    pub namespace: String,
}

impl TaskKey {
    pub fn new(subject: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.subject)
    }
}

/// What went wrong, kept for operator diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureDetail {
    /// Every violation the validator found
    Validation { errors: Vec<ValidationError> },

    /// Template defect
    Render { error: RenderError },

    /// Definitive backend error
    Backend {
        argv: Vec<String>,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Verification never confirmed the subject
    Unconfirmed { after_timeout: bool, attempts: u32 },

    /// Stopped by a caller
    Cancelled,

    /// Registry or store trouble outside the pipeline stages
    Internal { message: String },
}

impl FailureDetail {
    pub fn validation(errors: &ValidationErrors) -> Self {
        FailureDetail::Validation {
            errors: errors.0.clone(),
        }
    }

    pub fn render(error: &RenderError) -> Self {
        FailureDetail::Render {
            error: error.clone(),
        }
    }

    /// Detail for a definitive deploy error
    pub fn deploy(error: &DeployError) -> Self {
        if let Some(CommandFailed {
            argv,
            exit_code,
            stderr,
        }) = error.failed_command()
        {
            return FailureDetail::Backend {
                argv: argv.clone(),
                exit_code: Some(*exit_code),
                stderr: stderr.clone(),
            };
        }

        match error {
            DeployError::Timeout { argv, detail } => FailureDetail::Backend {
                argv: argv.clone(),
                exit_code: None,
                stderr: detail.clone(),
            },
            DeployError::Command(CommandError::Spawn { program, source }) => {
                FailureDetail::Backend {
                    argv: vec![program.clone()],
                    exit_code: None,
                    stderr: source.to_string(),
                }
            }
            other => FailureDetail::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Terminal outcome of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<FailureDetail>,
}

impl TerminalResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            detail: None,
        }
    }

    pub fn failure(message: impl Into<String>, detail: FailureDetail) -> Self {
        Self {
            success: false,
            message: message.into(),
            detail: Some(detail),
        }
    }
}

/// One tracked orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentTask {
    pub id: String,
    pub template_id: String,
    pub subject: String,
    pub cluster: Option<String>,
    pub namespace: String,
    pub state: TaskState,
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<TerminalResult>,
    pub retry_count: u32,
}

impl DeploymentTask {
    pub fn new(
        id: impl Into<String>,
        template_id: impl Into<String>,
        key: &TaskKey,
        cluster: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            template_id: template_id.into(),
            subject: key.subject.clone(),
            cluster,
            namespace: key.namespace.clone(),
            state: TaskState::Pending,
            progress: 0,
            message: "queued".to_string(),
            created_at: now,
            updated_at: now,
            result: None,
            retry_count: 0,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(&self.subject, &self.namespace)
    }

    /// Apply a patch and bump `updated_at`
    pub fn apply(&mut self, patch: TaskPatch) {
        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress;
        }
        if let Some(message) = patch.message {
            self.message = message;
        }
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
        if let Some(retry_count) = patch.retry_count {
            self.retry_count = retry_count;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of a task record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub state: Option<TaskState>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result: Option<TerminalResult>,
    pub retry_count: Option<u32>,
}

impl TaskPatch {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// What a poller sees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: String,
    pub state: TaskState,
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TerminalResult>,
}

impl From<&DeploymentTask> for TaskStatus {
    fn from(task: &DeploymentTask) -> Self {
        Self {
            id: task.id.clone(),
            state: task.state,
            progress: task.progress,
            message: task.message.clone(),
            result: task.result.clone(),
        }
    }
}
