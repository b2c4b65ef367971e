//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// kindops settings, read from `settings.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Directory for the rolling log file; no file output when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Template registry root; defaults to the layout's `templates/`
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,

    /// kubectl program name or path
    #[serde(default = "default_kubectl")]
    pub kubectl: String,

    /// helm program name or path
    #[serde(default = "default_helm")]
    pub helm: String,

    /// Prefix turning a cluster name into a kube context
    #[serde(default = "default_context_prefix")]
    pub context_prefix: String,

    /// Environment overrides for every backend command, e.g. `KUBECONFIG`
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Timeout for inspection and cleanup commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// How long a deploy command may wait for readiness
    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout_secs: u64,

    /// Delay between verification polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Verification poll budget
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Upper bound on time spent verifying
    #[serde(default = "default_max_verify_elapsed")]
    pub max_verify_elapsed_secs: u64,
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_helm() -> String {
    "helm".to_string()
}

fn default_context_prefix() -> String {
    "kind-".to_string()
}

fn default_command_timeout() -> u64 {
    60
}

fn default_deploy_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_poll_attempts() -> u32 {
    24
}

fn default_max_verify_elapsed() -> u64 {
    180
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            templates_dir: None,
            kubectl: default_kubectl(),
            helm: default_helm(),
            context_prefix: default_context_prefix(),
            env: BTreeMap::new(),
            command_timeout_secs: default_command_timeout(),
            deploy_timeout_secs: default_deploy_timeout(),
            poll_interval_secs: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            max_verify_elapsed_secs: default_max_verify_elapsed(),
        }
    }
}
