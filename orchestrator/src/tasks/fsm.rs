//! Finite state machine for one deployment task

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Progress bands, in percent
const PROGRESS_VALIDATING: u8 = 10;
const PROGRESS_RENDERING: u8 = 25;
const PROGRESS_DEPLOYING: u8 = 30;
const PROGRESS_DEPLOYING_MAX: u8 = 89;
const PROGRESS_VERIFYING: u8 = 90;
const PROGRESS_VERIFYING_MAX: u8 = 99;
const PROGRESS_COMPLETED: u8 = 100;

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted, not started
    Pending,

    /// Checking parameters
    Validating,

    /// Producing manifests
    Rendering,

    /// Backend command in flight
    Deploying,

    /// Confirming the subject is live
    Verifying,

    /// Terminal success
    Completed,

    /// Terminal failure
    Failed,

    /// Stopped by a caller
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Validating => "validating",
            TaskState::Rendering => "rendering",
            TaskState::Deploying => "deploying",
            TaskState::Verifying => "verifying",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Task event
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Task picked up
    Start,

    /// Parameters accepted
    Validated,

    /// Parameters rejected
    ValidationFailed(String),

    /// Manifest produced
    Rendered,

    /// Rendering failed
    RenderFailed(String),

    /// Deploy still running; advances progress
    DeployTick { elapsed: Duration, budget: Duration },

    /// Deploy command reported success
    Deployed,

    /// Deploy command timed out; outcome unknown
    DeployAmbiguous(String),

    /// Deploy command failed definitively
    DeployFailed(String),

    /// Status check did not confirm the subject yet
    Unconfirmed,

    /// Status check confirmed the subject is live
    Confirmed,

    /// Poll budget spent without confirmation
    VerifyExhausted(String),

    /// Caller cancelled the task
    Cancel,
}

/// Deployment task FSM
#[derive(Debug, Clone)]
pub struct TaskFsm {
    state: TaskState,
    error: Option<String>,
    retry_count: u32,
    progress: u8,
    ambiguous: bool,
}

impl TaskFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: TaskState::Pending,
            error: None,
            retry_count: 0,
            progress: 0,
            ambiguous: false,
        }
    }

    /// Get current state
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of unconfirmed verification polls
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Coarse progress in percent
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Whether verification started from a timed-out deploy
    pub fn deploy_timed_out(&self) -> bool {
        self.ambiguous
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: TaskEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            (TaskState::Pending, TaskEvent::Start) => {
                self.progress = PROGRESS_VALIDATING;
                TaskState::Validating
            }

            (TaskState::Validating, TaskEvent::Validated) => {
                self.progress = PROGRESS_RENDERING;
                TaskState::Rendering
            }
            (TaskState::Validating, TaskEvent::ValidationFailed(err)) => self.fail(err),

            (TaskState::Rendering, TaskEvent::Rendered) => {
                self.progress = PROGRESS_DEPLOYING;
                TaskState::Deploying
            }
            (TaskState::Rendering, TaskEvent::RenderFailed(err)) => self.fail(err),

            (TaskState::Deploying, TaskEvent::DeployTick { elapsed, budget }) => {
                let span = f64::from(PROGRESS_DEPLOYING_MAX - PROGRESS_DEPLOYING);
                let ratio = if budget.is_zero() {
                    1.0
                } else {
                    (elapsed.as_secs_f64() / budget.as_secs_f64()).min(1.0)
                };
                let progress = PROGRESS_DEPLOYING + (span * ratio) as u8;
                self.progress = self.progress.max(progress);
                TaskState::Deploying
            }
            (TaskState::Deploying, TaskEvent::Deployed) => {
                self.progress = PROGRESS_VERIFYING;
                TaskState::Verifying
            }
            (TaskState::Deploying, TaskEvent::DeployAmbiguous(err)) => {
                self.ambiguous = true;
                self.error = Some(err.clone());
                self.progress = PROGRESS_VERIFYING;
                TaskState::Verifying
            }
            (TaskState::Deploying, TaskEvent::DeployFailed(err)) => self.fail(err),

            (TaskState::Verifying, TaskEvent::Unconfirmed) => {
                self.retry_count += 1;
                let bumped = PROGRESS_VERIFYING.saturating_add(self.retry_count.min(255) as u8);
                self.progress = bumped.min(PROGRESS_VERIFYING_MAX);
                TaskState::Verifying
            }
            (TaskState::Verifying, TaskEvent::Confirmed) => {
                self.error = None;
                self.progress = PROGRESS_COMPLETED;
                TaskState::Completed
            }
            (TaskState::Verifying, TaskEvent::VerifyExhausted(err)) => self.fail(err),

            (state, TaskEvent::Cancel) if !state.is_terminal() => TaskState::Cancelled,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }

    fn fail(&mut self, err: &str) -> TaskState {
        self.error = Some(err.to_string());
        TaskState::Failed
    }
}

impl Default for TaskFsm {
    fn default() -> Self {
        Self::new()
    }
}
