//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::command::{CommandExecutor, ProcessExecutor};
use crate::registry::{DirTemplateRegistry, TemplateRegistry};
use crate::tasks::{MemoryTaskStore, Orchestrator, TaskStore};

/// Main application state
pub struct AppState {
    /// Submits and follows deployments
    pub orchestrator: Orchestrator,

    /// Options the state was built from
    pub options: AppOptions,
}

impl AppState {
    /// Wire the process executor, directory registry and memory task store
    pub fn init(options: AppOptions) -> Self {
        info!(
            "Initializing application state, templates in {}",
            options.templates_dir.display()
        );

        let executor: Arc<dyn CommandExecutor> =
            Arc::new(ProcessExecutor::new(options.executor.clone()));
        Self::with_executor(options, executor)
    }

    /// Same as [`AppState::init`] with a caller-supplied executor
    pub fn with_executor(options: AppOptions, executor: Arc<dyn CommandExecutor>) -> Self {
        let registry: Arc<dyn TemplateRegistry> = Arc::new(DirTemplateRegistry::with_capacity(
            options.templates_dir.clone(),
            options.template_cache_capacity,
        ));
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::new());

        let orchestrator = Orchestrator::new(
            registry,
            store,
            executor,
            options.backend.clone(),
            options.tracker.clone(),
        );

        Self {
            orchestrator,
            options,
        }
    }
}
