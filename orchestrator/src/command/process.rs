//! Process-backed command executor

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::executor::{
    check_result, CommandError, CommandExecutor, CommandResult, CommandSpec,
};

/// Process executor options
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Timeout applied when a spec carries none
    pub default_timeout: Duration,

    /// Environment applied to every command, below per-spec overrides
    pub env: BTreeMap<String, String>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(120),
            env: BTreeMap::new(),
        }
    }
}

/// Runs commands as OS processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    options: ExecutorOptions,
}

impl ProcessExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, spec: CommandSpec) -> Result<CommandResult, CommandError> {
        let (program, args) = spec.argv.split_first().ok_or(CommandError::EmptyCommand)?;
        let timeout = spec.timeout.unwrap_or(self.options.default_timeout);

        debug!("Running: {} (timeout {:?})", spec.fingerprint(), timeout);

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&self.options.env)
            .envs(&spec.env)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child on timeout kills it
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

        let payload = spec.stdin.clone();
        let run = async move {
            if let (Some(payload), Some(mut stdin)) = (payload, child.stdin.take()) {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    warn!("Failed to write command stdin: {}", e);
                }
                // stdin is dropped here so the program sees EOF
            }
            child.wait_with_output().await
        };

        let result = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(output)) => CommandResult {
                exit_code: output.status.code().unwrap_or(TERMINATED_BY_SIGNAL),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration: started.elapsed(),
                timed_out: false,
            },
            Ok(Err(source)) => {
                return Err(CommandError::Spawn {
                    program: program.clone(),
                    source,
                })
            }
            Err(_) => {
                warn!("Command timed out after {:?}: {}", timeout, spec.fingerprint());
                CommandResult::timeout(timeout)
            }
        };

        debug!(
            "Finished: {} (exit {}, {:?})",
            spec.fingerprint(),
            result.exit_code,
            result.duration
        );

        check_result(&spec, result)
    }
}

/// Exit code reported when the process was ended by a signal
const TERMINATED_BY_SIGNAL: i32 = 128;
