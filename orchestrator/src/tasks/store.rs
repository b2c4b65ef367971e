//! Task store port and its in-memory adapter

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::tasks::model::{DeploymentTask, TaskPatch};
use crate::tasks::tracker::TrackerError;

/// Keyed persistence of task records. Each call is atomic for one record.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: DeploymentTask) -> Result<(), TrackerError>;

    /// Apply `patch` and return the updated record
    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<DeploymentTask, TrackerError>;

    async fn get_task(&self, id: &str) -> Result<Option<DeploymentTask>, TrackerError>;

    /// All records, oldest first
    async fn list_tasks(&self) -> Result<Vec<DeploymentTask>, TrackerError>;
}

/// Task store kept in process memory
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, DeploymentTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, task: DeploymentTask) -> Result<(), TrackerError> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if tasks.contains_key(&task.id) {
            return Err(TrackerError::Store(format!("task {} already exists", task.id)));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<DeploymentTask, TrackerError> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))?;
        task.apply(patch);
        Ok(task.clone())
    }

    async fn get_task(&self, id: &str) -> Result<Option<DeploymentTask>, TrackerError> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        Ok(tasks.get(id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<DeploymentTask>, TrackerError> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = tasks.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}
