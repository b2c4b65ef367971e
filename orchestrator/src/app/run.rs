//! Command dispatch

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use tracing::{info, warn};

use crate::app::cli::{Commands, ValueArgs};
use crate::app::state::AppState;
use crate::errors::OrchestratorError;
use crate::params::RawValues;
use crate::tasks::{DeploymentRequest, TaskState, TaskStatus};

/// How often `deploy` polls its task
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Command line values typed against the template's schema
async fn raw_values(state: &AppState, template: &str, values: &ValueArgs) -> anyhow::Result<RawValues> {
    let template = state.orchestrator.registry().load_template(template).await?;
    Ok(values.raw_values(&template.schema).await?)
}

/// Run one CLI command against the application state
pub async fn run(
    state: AppState,
    command: Commands,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let orchestrator = &state.orchestrator;

    match command {
        Commands::Validate { template, values } => {
            let raw = raw_values(&state, &template, &values).await?;
            match orchestrator.validate(&template, &raw).await {
                Ok(values) => {
                    println!("{} {} value(s) accepted", "ok".green(), values.len());
                    println!("{}", serde_json::to_string_pretty(&values.to_value())?);
                    Ok(())
                }
                Err(OrchestratorError::Validation(errors)) => {
                    for error in errors.iter() {
                        println!("{} {}", "error".red(), error);
                    }
                    bail!("{} violation(s)", errors.len())
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Render {
            template,
            namespace,
            subject,
            values,
        } => {
            let raw = raw_values(&state, &template, &values).await?;
            let manifest = orchestrator
                .render(&template, &namespace, subject.as_deref(), &raw)
                .await?;
            print!("{}", manifest.rendered());
            Ok(())
        }

        Commands::Deploy {
            template,
            target,
            subject,
            values,
        } => {
            let raw = raw_values(&state, &template, &values).await?;
            let mut request = DeploymentRequest::new(template, target.namespace, raw)
                .with_context(state.options.context_for(target.cluster.as_deref()));
            if let Some(subject) = subject {
                request = request.with_subject(subject);
            }

            let task_id = orchestrator.submit_deployment(request).await?;
            println!("task {}", task_id.bold());
            follow(&state, &task_id, shutdown_signal).await
        }

        Commands::Status {
            template,
            subject,
            target,
        } => {
            let context = state.options.context_for(target.cluster.as_deref());
            let report = orchestrator
                .check_status(&template, &subject, &target.namespace, context)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Commands::Delete {
            template,
            subject,
            target,
        } => {
            let context = state.options.context_for(target.cluster.as_deref());
            orchestrator
                .delete(&template, &subject, &target.namespace, context)
                .await?;
            println!("{} {}/{}", "deleted".green(), target.namespace, subject);
            Ok(())
        }

        Commands::Templates => {
            let registry = orchestrator.registry();
            for id in registry.template_ids().await? {
                match registry.load_template(&id).await {
                    Ok(template) => println!(
                        "{:<24} {}",
                        id.bold(),
                        template.description.as_deref().unwrap_or(&template.name)
                    ),
                    Err(e) => println!("{:<24} {}", id.bold(), e.to_string().red()),
                }
            }
            Ok(())
        }
    }
}

/// Poll a task until it is terminal, cancelling it on the shutdown signal
async fn follow(
    state: &AppState,
    task_id: &str,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let orchestrator = &state.orchestrator;
    let shutdown = shutdown_signal;
    tokio::pin!(shutdown);
    let mut cancel_sent = false;
    let mut last: Option<(TaskState, u8, String)> = None;

    loop {
        let status = orchestrator
            .get_task_status(task_id)
            .await
            .context("failed to read task status")?;

        let current = (status.state, status.progress, status.message.clone());
        if last.as_ref() != Some(&current) {
            print_progress(&status);
            last = Some(current);
        }

        if status.state.is_terminal() {
            return finish(status);
        }

        tokio::select! {
            _ = tokio::time::sleep(STATUS_POLL_INTERVAL) => {}
            _ = &mut shutdown, if !cancel_sent => {
                info!("Cancelling task {}", task_id);
                if !orchestrator.cancel_task(task_id).await? {
                    warn!("Task {} had already finished", task_id);
                }
                cancel_sent = true;
            }
        }
    }
}

fn print_progress(status: &TaskStatus) {
    let state = match status.state {
        TaskState::Completed => status.state.to_string().green(),
        TaskState::Failed | TaskState::Cancelled => status.state.to_string().red(),
        _ => status.state.to_string().yellow(),
    };
    println!("[{:>3}%] {:<10} {}", status.progress, state, status.message);
}

fn finish(status: TaskStatus) -> anyhow::Result<()> {
    match status.result {
        Some(result) if result.success => Ok(()),
        Some(result) => {
            if let Some(detail) = &result.detail {
                println!("{}", serde_json::to_string_pretty(detail)?);
            }
            bail!(result.message)
        }
        None => bail!("task ended in {} without a result", status.state),
    }
}
