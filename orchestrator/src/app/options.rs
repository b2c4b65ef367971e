//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::command::ExecutorOptions;
use crate::deploy::BackendOptions;
use crate::logs::LogOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::tasks::TrackerSettings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Template registry root
    pub templates_dir: PathBuf,

    /// Template cache capacity
    pub template_cache_capacity: usize,

    /// Prefix turning a cluster name into a kube context
    pub context_prefix: String,

    /// Process executor options
    pub executor: ExecutorOptions,

    /// kubectl / helm invocation
    pub backend: BackendOptions,

    /// Deployment run timing
    pub tracker: TrackerSettings,

    /// Logging
    pub logging: LogOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(StorageLayout::default(), &Settings::default())
    }
}

impl AppOptions {
    /// Derive every option struct from the settings file
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let command_timeout = Duration::from_secs(settings.command_timeout_secs);
        let deploy_timeout = Duration::from_secs(settings.deploy_timeout_secs);

        let templates_dir = settings
            .templates_dir
            .clone()
            .unwrap_or_else(|| layout.templates_dir().path().to_path_buf());

        Self {
            templates_dir,
            template_cache_capacity: 64,
            context_prefix: settings.context_prefix.clone(),
            executor: ExecutorOptions {
                default_timeout: command_timeout,
                env: settings.env.clone(),
            },
            backend: BackendOptions {
                kubectl: settings.kubectl.clone(),
                helm: settings.helm.clone(),
                context: None,
                env: settings.env.clone(),
                command_timeout,
                deploy_timeout,
            },
            tracker: TrackerSettings {
                deploy_timeout,
                status_timeout: command_timeout,
                poll_interval: Duration::from_secs(settings.poll_interval_secs),
                max_poll_attempts: settings.max_poll_attempts,
                max_verify_elapsed: Duration::from_secs(settings.max_verify_elapsed_secs),
            },
            logging: LogOptions {
                log_level: settings.log_level.clone(),
                stdout: true,
                log_dir: settings.log_dir.clone(),
                json_format: settings.log_json,
            },
            layout,
        }
    }

    /// Kube context for an optional cluster name
    pub fn context_for(&self, cluster: Option<&str>) -> Option<String> {
        cluster.map(|cluster| {
            if cluster.starts_with(&self.context_prefix) {
                cluster.to_string()
            } else {
                format!("{}{}", self.context_prefix, cluster)
            }
        })
    }
}
