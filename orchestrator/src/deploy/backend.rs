//! Shared plumbing for the kubectl and helm backed strategies

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::command::{CommandExecutor, CommandFailed, CommandResult, CommandSpec};
use crate::deploy::DeployError;

/// Phrases backend tools print when they gave up waiting
const TIMEOUT_MARKERS: &[&str] = &["timed out", "context deadline exceeded"];

/// How backend tools are invoked
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// kubectl program name or path
    pub kubectl: String,

    /// helm program name or path
    pub helm: String,

    /// Kube context passed to every command
    pub context: Option<String>,

    /// Environment overrides, e.g. `KUBECONFIG`
    pub env: BTreeMap<String, String>,

    /// Timeout for inspection and cleanup commands
    pub command_timeout: Duration,

    /// How long a deploy may wait for resources to become ready
    pub deploy_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            helm: "helm".to_string(),
            context: None,
            env: BTreeMap::new(),
            command_timeout: Duration::from_secs(60),
            deploy_timeout: Duration::from_secs(300),
        }
    }
}

/// Which tool a command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tool {
    Kubectl,
    Helm,
}

/// Builds argv for the backend tools and runs it through the command port
#[derive(Clone)]
pub struct Backend {
    executor: Arc<dyn CommandExecutor>,
    options: BackendOptions,
    cancel: Option<watch::Receiver<bool>>,
}

impl Backend {
    pub fn new(executor: Arc<dyn CommandExecutor>, options: BackendOptions) -> Self {
        Self {
            executor,
            options,
            cancel: None,
        }
    }

    /// Refuse to start new commands once `cancel` holds `true`.
    /// A command already running is left to finish.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| *c.borrow())
    }

    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    /// A command for `tool` with the context flag and env overrides applied
    pub(crate) fn command<I, S>(&self, tool: Tool, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (program, context_flag) = match tool {
            Tool::Kubectl => (&self.options.kubectl, "--context"),
            Tool::Helm => (&self.options.helm, "--kube-context"),
        };

        let mut argv = vec![program.clone()];
        argv.extend(args.into_iter().map(Into::into));
        if let Some(context) = &self.options.context {
            argv.push(context_flag.to_string());
            argv.push(context.clone());
        }

        CommandSpec::new(argv)
            .envs(&self.options.env)
            .timeout(self.options.command_timeout)
    }

    /// Run a command, classifying timeouts as ambiguous and other non-zero
    /// exits as definitive failures
    pub(crate) async fn run(&self, spec: CommandSpec) -> Result<CommandResult, DeployError> {
        let result = self.run_unchecked(spec.clone()).await?;
        classify(&spec, result)
    }

    /// Run a command and hand back whatever it produced
    pub(crate) async fn run_unchecked(&self, spec: CommandSpec) -> Result<CommandResult, DeployError> {
        if self.cancelled() {
            debug!("Cancelled, not running: {}", spec.fingerprint());
            return Err(DeployError::Cancelled {
                argv: spec.argv.clone(),
            });
        }
        debug!("Running: {}", spec.fingerprint());
        let result = self.executor.execute(spec.must_succeed(false)).await?;
        Ok(result)
    }
}

/// Map a finished command onto the deploy error taxonomy
pub(crate) fn classify(spec: &CommandSpec, result: CommandResult) -> Result<CommandResult, DeployError> {
    if result.timed_out || (!result.success() && mentions_timeout(&result.stderr)) {
        warn!("Command timed out: {}", spec.fingerprint());
        return Err(DeployError::Timeout {
            argv: spec.argv.clone(),
            detail: result.stderr.trim().to_string(),
        });
    }
    if !result.success() {
        warn!(
            "Command failed with exit code {}: {}",
            result.exit_code,
            spec.fingerprint()
        );
        return Err(DeployError::Backend(CommandFailed::new(&spec.argv, &result)));
    }
    Ok(result)
}

fn mentions_timeout(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    TIMEOUT_MARKERS.iter().any(|marker| stderr.contains(marker))
}

/// Whether stderr says the thing being looked up does not exist
pub(crate) fn is_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("not found") || stderr.contains("notfound")
}

#[derive(Debug, Default, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<Object>,
}

#[derive(Debug, Default, Deserialize)]
struct Object {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
    #[serde(default, rename = "containerStatuses")]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    ready: bool,
}

/// Readiness counts of a pod listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PodSummary {
    pub ready: usize,
    pub total: usize,
    pub phases: Vec<String>,
}

/// Parse `kubectl get pods -o json` output
pub(crate) fn summarize_pods(command: &str, stdout: &str) -> Result<PodSummary, DeployError> {
    let list: ObjectList = parse_list(command, stdout)?;
    let mut summary = PodSummary {
        total: list.items.len(),
        ..Default::default()
    };
    for pod in &list.items {
        let phase = pod.status.phase.clone().unwrap_or_else(|| "Unknown".to_string());
        let containers_ready = !pod.status.container_statuses.is_empty()
            && pod.status.container_statuses.iter().all(|c| c.ready);
        if phase == "Succeeded" || (phase == "Running" && containers_ready) {
            summary.ready += 1;
        }
        summary.phases.push(phase);
    }
    Ok(summary)
}

/// Parse `kubectl get ... -o json` output into object names
pub(crate) fn object_names(command: &str, stdout: &str) -> Result<Vec<String>, DeployError> {
    let list: ObjectList = parse_list(command, stdout)?;
    Ok(list.items.into_iter().map(|o| o.metadata.name).collect())
}

fn parse_list(command: &str, stdout: &str) -> Result<ObjectList, DeployError> {
    if stdout.trim().is_empty() {
        return Ok(ObjectList::default());
    }
    serde_json::from_str(stdout).map_err(|e| DeployError::Output {
        command: command.to_string(),
        reason: e.to_string(),
    })
}
