//! Deployment task tracker
//!
//! Each submitted deployment runs as its own tokio task through
//! validate, render, deploy and verify. A (subject, namespace) lease taken
//! at submission keeps two runs from touching the same subject.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::command::CommandExecutor;
use crate::deploy::{
    Backend, BackendOptions, DeployError, DeploymentStrategy, StatusReport, StrategyFactory,
};
use crate::errors::OrchestratorError;
use crate::params::{validate, RawValues, ValueSet};
use crate::registry::{Template, TemplateRegistry};
use crate::render::{RenderTarget, RenderedManifest};
use crate::tasks::fsm::{TaskEvent, TaskFsm, TaskState};
use crate::tasks::model::{
    DeploymentTask, FailureDetail, TaskKey, TaskPatch, TaskStatus, TerminalResult,
};
use crate::tasks::store::TaskStore;
use crate::tasks::tracker::{ConflictError, TrackerError, TrackerSettings};
use crate::utils::generate_uuid;

/// A request to deploy one template
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub template_id: String,
    pub namespace: String,
    /// Name of the deployed subject; the template id when unset
    pub subject: Option<String>,
    /// Kube context to run against
    pub context: Option<String>,
    pub values: RawValues,
}

impl DeploymentRequest {
    pub fn new(template_id: impl Into<String>, namespace: impl Into<String>, values: RawValues) -> Self {
        Self {
            template_id: template_id.into(),
            namespace: namespace.into(),
            subject: None,
            context: None,
            values,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

/// `tokio::time::interval` rejects a zero period
const MIN_TICK: Duration = Duration::from_millis(10);

type Owners = Arc<Mutex<HashMap<TaskKey, String>>>;

/// Ownership of a (subject, namespace) pair, released on drop
struct Lease {
    owners: Owners,
    key: TaskKey,
    task_id: String,
}

impl Lease {
    fn acquire(owners: &Owners, key: &TaskKey, task_id: &str) -> Result<Self, ConflictError> {
        let mut map = owners.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = map.get(key) {
            return Err(ConflictError {
                key: key.clone(),
                existing: existing.clone(),
            });
        }
        map.insert(key.clone(), task_id.to_string());
        Ok(Self {
            owners: owners.clone(),
            key: key.clone(),
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut map = self.owners.lock().unwrap_or_else(|e| e.into_inner());
        if map.get(&self.key) == Some(&self.task_id) {
            map.remove(&self.key);
        }
    }
}

/// State of one run, owned by its tokio task
struct Run {
    task_id: String,
    key: TaskKey,
    template: Arc<Template>,
    values: RawValues,
    context: Option<String>,
    fsm: TaskFsm,
    cancel: watch::Receiver<bool>,
}

impl Run {
    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

struct Inner {
    registry: Arc<dyn TemplateRegistry>,
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn CommandExecutor>,
    backend: BackendOptions,
    settings: TrackerSettings,
    owners: Owners,
    cancels: Mutex<HashMap<String, watch::Sender<bool>>>,
}

/// Entry point for submitting and following deployments
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn TemplateRegistry>,
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn CommandExecutor>,
        backend: BackendOptions,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                store,
                executor,
                backend,
                settings,
                owners: Arc::new(Mutex::new(HashMap::new())),
                cancels: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<dyn TemplateRegistry> {
        &self.inner.registry
    }

    /// Start a deployment run and return its task id.
    ///
    /// Fails with [`ConflictError`] when a live task already owns the
    /// (subject, namespace) pair; no task is created in that case.
    pub async fn submit_deployment(&self, request: DeploymentRequest) -> Result<String, TrackerError> {
        if request.namespace.trim().is_empty() {
            return Err(TrackerError::InvalidRequest("namespace is required".to_string()));
        }

        let template = self.inner.registry.load_template(&request.template_id).await?;
        let subject = request.subject.unwrap_or_else(|| template.id.clone());
        if subject.trim().is_empty() {
            return Err(TrackerError::InvalidRequest("subject is required".to_string()));
        }

        let key = TaskKey::new(subject, request.namespace);
        let task_id = generate_uuid();
        let lease = Lease::acquire(&self.inner.owners, &key, &task_id)?;

        let task = DeploymentTask::new(&task_id, &template.id, &key, request.context.clone());
        self.inner.store.create_task(task).await?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.inner
            .cancels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.clone(), cancel_tx);

        info!(task = %task_id, subject = %key, template = %template.id, "Submitted deployment");

        let run = Run {
            task_id: task_id.clone(),
            key,
            template,
            values: request.values,
            context: request.context,
            fsm: TaskFsm::new(),
            cancel: cancel_rx,
        };
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _lease = lease;
            let task_id = run.task_id.clone();
            inner.execute(run).await;
            inner
                .cancels
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&task_id);
        });

        Ok(task_id)
    }

    /// Read-only view of a task
    pub async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus, TrackerError> {
        self.inner
            .store
            .get_task(task_id)
            .await?
            .map(|task| TaskStatus::from(&task))
            .ok_or_else(|| TrackerError::NotFound(task_id.to_string()))
    }

    /// Ask a running task to stop. Returns `false` when the task had
    /// already reached a terminal state. Commands already issued are not
    /// undone.
    pub async fn cancel_task(&self, task_id: &str) -> Result<bool, TrackerError> {
        let task = self
            .inner
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(task_id.to_string()))?;
        if task.state.is_terminal() {
            return Ok(false);
        }

        let cancels = self.inner.cancels.lock().unwrap_or_else(|e| e.into_inner());
        match cancels.get(task_id) {
            Some(tx) => {
                tx.send_replace(true);
                info!(task = %task_id, "Cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn list_tasks(&self) -> Result<Vec<DeploymentTask>, TrackerError> {
        self.inner.store.list_tasks().await
    }

    /// Validate raw values against a template's schema
    pub async fn validate(&self, template_id: &str, values: &RawValues) -> Result<ValueSet, OrchestratorError> {
        let template = self.inner.registry.load_template(template_id).await?;
        Ok(validate(&template.schema, values)?)
    }

    /// Validate and render without deploying
    pub async fn render(
        &self,
        template_id: &str,
        namespace: &str,
        subject: Option<&str>,
        values: &RawValues,
    ) -> Result<RenderedManifest, OrchestratorError> {
        let template = self.inner.registry.load_template(template_id).await?;
        let values = validate(&template.schema, values)?;
        let target = RenderTarget::new(
            template.strategy.backend_hint(),
            namespace,
            subject.unwrap_or(&template.id),
        );
        Ok(template.body().render(&values, &target)?)
    }

    /// Inspect a deployed subject with its template's strategy
    pub async fn check_status(
        &self,
        template_id: &str,
        subject: &str,
        namespace: &str,
        context: Option<String>,
    ) -> Result<StatusReport, OrchestratorError> {
        let template = self.inner.registry.load_template(template_id).await?;
        let strategy = self.inner.strategy(&template, context);
        Ok(strategy.check_status(subject, namespace).await?)
    }

    /// Remove a deployed subject; an absent subject is a success
    pub async fn delete(
        &self,
        template_id: &str,
        subject: &str,
        namespace: &str,
        context: Option<String>,
    ) -> Result<(), OrchestratorError> {
        let template = self.inner.registry.load_template(template_id).await?;
        let strategy = self.inner.strategy(&template, context);
        info!("Deleting {}/{} with {}", namespace, subject, strategy.name());
        Ok(strategy.delete(subject, namespace).await?)
    }
}

impl Inner {
    fn strategy(&self, template: &Template, context: Option<String>) -> Arc<dyn DeploymentStrategy> {
        StrategyFactory::create(&template.strategy, self.backend(context))
    }

    fn backend(&self, context: Option<String>) -> Backend {
        let options = BackendOptions {
            context: context.or_else(|| self.backend.context.clone()),
            command_timeout: self.settings.status_timeout,
            deploy_timeout: self.settings.deploy_timeout,
            ..self.backend.clone()
        };
        Backend::new(self.executor.clone(), options)
    }

    async fn execute(&self, mut run: Run) {
        if let Err(e) = self.drive(&mut run).await {
            error!(task = %run.task_id, "Task aborted: {}", e);
            let message = format!("internal error: {e}");
            let patch = TaskPatch {
                state: Some(TaskState::Failed),
                result: Some(TerminalResult::failure(
                    message.clone(),
                    FailureDetail::Internal {
                        message: e.to_string(),
                    },
                )),
                ..TaskPatch::message(message)
            };
            if let Err(e) = self.store.update_task(&run.task_id, patch).await {
                error!(task = %run.task_id, "Failed to record task failure: {}", e);
            }
        }
    }

    /// Process an event and persist the new state
    async fn step(
        &self,
        run: &mut Run,
        event: TaskEvent,
        message: impl Into<String>,
        result: Option<TerminalResult>,
    ) -> Result<(), TrackerError> {
        let from = run.fsm.state();
        run.fsm.process(event).map_err(TrackerError::Transition)?;
        let to = run.fsm.state();
        let message = message.into();

        if from != to {
            info!(task = %run.task_id, subject = %run.key, "{} -> {}: {}", from, to, message);
        }

        self.store
            .update_task(
                &run.task_id,
                TaskPatch {
                    state: Some(to),
                    progress: Some(run.fsm.progress()),
                    message: Some(message),
                    result,
                    retry_count: Some(run.fsm.retry_count()),
                },
            )
            .await?;
        Ok(())
    }

    async fn fail(
        &self,
        run: &mut Run,
        event: fn(String) -> TaskEvent,
        message: String,
        detail: FailureDetail,
    ) -> Result<(), TrackerError> {
        let result = TerminalResult::failure(message.clone(), detail);
        self.step(run, event(message.clone()), message, Some(result)).await
    }

    async fn cancel(&self, run: &mut Run) -> Result<(), TrackerError> {
        let result = TerminalResult::failure("cancelled", FailureDetail::Cancelled);
        self.step(run, TaskEvent::Cancel, "cancelled", Some(result)).await
    }

    async fn drive(&self, run: &mut Run) -> Result<(), TrackerError> {
        self.step(run, TaskEvent::Start, "validating parameters", None).await?;
        if run.cancelled() {
            return self.cancel(run).await;
        }

        let values = match validate(&run.template.schema, &run.values) {
            Ok(values) => values,
            Err(errors) => {
                warn!(task = %run.task_id, "Validation failed with {} violation(s)", errors.len());
                let detail = FailureDetail::validation(&errors);
                let message = format!("validation failed: {errors}");
                return self.fail(run, TaskEvent::ValidationFailed, message, detail).await;
            }
        };

        self.step(run, TaskEvent::Validated, "rendering manifests", None).await?;
        if run.cancelled() {
            return self.cancel(run).await;
        }

        let target = RenderTarget::new(
            run.template.strategy.backend_hint(),
            &run.key.namespace,
            &run.key.subject,
        );
        let manifest = match run.template.body().render(&values, &target) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(task = %run.task_id, "Render failed: {}", e);
                let detail = FailureDetail::render(&e);
                let message = format!("render failed: {e}");
                return self.fail(run, TaskEvent::RenderFailed, message, detail).await;
            }
        };

        if run.cancelled() {
            return self.cancel(run).await;
        }

        let backend = self.backend(run.context.clone()).with_cancel(run.cancel.clone());
        let strategy = StrategyFactory::create(&run.template.strategy, backend);
        let message = format!(
            "deploying {} resource document(s) with {}",
            manifest.documents().len(),
            strategy.name()
        );
        self.step(run, TaskEvent::Rendered, message, None).await?;

        let namespace = run.key.namespace.clone();
        let started = Instant::now();
        let mut cancel = run.cancel.clone();
        let mut watching = true;
        let mut cancelled = false;
        let outcome = {
            let deploy = strategy.deploy(&manifest, &namespace);
            tokio::pin!(deploy);
            let mut ticker = tokio::time::interval(self.settings.poll_interval.max(MIN_TICK));
            ticker.tick().await;
            loop {
                tokio::select! {
                    result = &mut deploy => break result,
                    _ = ticker.tick(), if !cancelled => {
                        let tick = TaskEvent::DeployTick {
                            elapsed: started.elapsed(),
                            budget: self.settings.deploy_timeout,
                        };
                        let message = format!("deploying ({}s elapsed)", started.elapsed().as_secs());
                        self.step(run, tick, message, None).await?;
                    }
                    changed = cancel.changed(), if watching && !cancelled => {
                        if changed.is_err() {
                            watching = false;
                        } else if *cancel.borrow() {
                            // The backend starts no further command; the one
                            // in flight is awaited so the lease outlives it
                            cancelled = true;
                            self.cancel(run).await?;
                        }
                    }
                }
            }
        };

        if cancelled {
            debug!(task = %run.task_id, "Deploy wound down after cancellation: {:?}", outcome.err());
            return Ok(());
        }

        match outcome {
            Ok(()) => {
                self.step(run, TaskEvent::Deployed, "verifying deployment", None).await?;
            }
            Err(DeployError::Cancelled { .. }) => return self.cancel(run).await,
            Err(e) if e.is_ambiguous() => {
                warn!(task = %run.task_id, "Deploy outcome unknown, verifying: {}", e);
                self.step(
                    run,
                    TaskEvent::DeployAmbiguous(e.to_string()),
                    "deploy timed out, verifying",
                    None,
                )
                .await?;
            }
            Err(e) => {
                error!(task = %run.task_id, "Deploy failed: {}", e);
                let detail = FailureDetail::deploy(&e);
                let message = format!("backend error: {e}");
                return self.fail(run, TaskEvent::DeployFailed, message, detail).await;
            }
        }

        self.verify(run, strategy.as_ref()).await
    }

    /// Poll status until the subject is live or the budget runs out
    async fn verify(&self, run: &mut Run, strategy: &dyn DeploymentStrategy) -> Result<(), TrackerError> {
        let started = Instant::now();
        let max_attempts = self.settings.max_poll_attempts.max(1);
        let subject = run.key.subject.clone();
        let namespace = run.key.namespace.clone();
        let mut last_state = "unknown".to_string();

        loop {
            if run.cancelled() {
                return self.cancel(run).await;
            }

            let attempts = run.fsm.retry_count() + 1;
            match strategy.check_status(&subject, &namespace).await {
                Ok(report) if report.live => {
                    let message = format!(
                        "{} is live: {}/{} pods ready",
                        run.key, report.ready_pods, report.total_pods
                    );
                    let result = TerminalResult::success(message.clone());
                    return self.step(run, TaskEvent::Confirmed, message, Some(result)).await;
                }
                Ok(report) => {
                    debug!(
                        task = %run.task_id,
                        "Status check {}/{}: {} ({}/{} pods ready)",
                        attempts, max_attempts, report.raw_state, report.ready_pods, report.total_pods
                    );
                    last_state = report.raw_state;
                }
                Err(DeployError::Cancelled { .. }) => return self.cancel(run).await,
                Err(e) => {
                    warn!(task = %run.task_id, "Status check {}/{} failed: {}", attempts, max_attempts, e);
                    last_state = e.to_string();
                }
            }

            let out_of_time = started.elapsed() + self.settings.poll_interval > self.settings.max_verify_elapsed;
            if attempts >= max_attempts || out_of_time {
                let after_timeout = run.fsm.deploy_timed_out();
                let message = if after_timeout {
                    format!(
                        "deploy timed out and {} was not confirmed live after {} status check(s), last state: {}",
                        run.key, attempts, last_state
                    )
                } else {
                    format!(
                        "{} was not confirmed live after {} status check(s), last state: {}",
                        run.key, attempts, last_state
                    )
                };
                let detail = FailureDetail::Unconfirmed {
                    after_timeout,
                    attempts,
                };
                return self.fail(run, TaskEvent::VerifyExhausted, message, detail).await;
            }

            let message = format!("waiting for {} ({}/{}): {}", run.key, attempts, max_attempts, last_state);
            self.step(run, TaskEvent::Unconfirmed, message, None).await?;
            self.pause(&mut run.cancel).await;
        }
    }

    /// Sleep one poll interval, waking early on cancellation
    async fn pause(&self, cancel: &mut watch::Receiver<bool>) {
        let delay = self.settings.poll_interval;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = cancel.changed() => {
                if changed.is_err() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
