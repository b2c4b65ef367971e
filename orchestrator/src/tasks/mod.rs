//! Deployment task tracking

pub mod fsm;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod tracker;

pub use fsm::{TaskEvent, TaskFsm, TaskState};
pub use model::{DeploymentTask, FailureDetail, TaskKey, TaskPatch, TaskStatus, TerminalResult};
pub use pipeline::{DeploymentRequest, Orchestrator};
pub use store::{MemoryTaskStore, TaskStore};
pub use tracker::{ConflictError, TrackerError, TrackerSettings};
