//! Command execution contract

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit code reported when a command was killed because it ran past its timeout
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Maximum number of stderr bytes carried in error values
const STDERR_SNIPPET_LIMIT: usize = 2048;

/// A single command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program followed by its arguments
    pub argv: Vec<String>,

    /// Environment overrides applied on top of the inherited environment
    pub env: BTreeMap<String, String>,

    /// Working directory
    pub cwd: Option<PathBuf>,

    /// Kill the command when it runs longer than this
    pub timeout: Option<Duration>,

    /// Fail with [`CommandError::Failed`] on a non-zero exit
    pub must_succeed: bool,

    /// Payload written to the command's stdin
    pub stdin: Option<String>,
}

impl CommandSpec {
    /// Create a spec from a program and its arguments
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, envs: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(envs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn must_succeed(mut self, must_succeed: bool) -> Self {
        self.must_succeed = must_succeed;
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Space-joined argv, used for logging and fake lookups
    pub fn fingerprint(&self) -> String {
        self.argv.join(" ")
    }
}

/// Outcome of a finished (or timed out) command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    #[serde(default)]
    pub timed_out: bool,
}

impl CommandResult {
    /// A successful result with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }

    /// A failed result with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }

    /// The result reported for a command killed at its deadline
    pub fn timeout(after: Duration) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: format!("command timed out after {}s", after.as_secs()),
            duration: after,
            timed_out: true,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Payload of a non-zero exit on a `must_succeed` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailed {
    pub argv: Vec<String>,
    pub exit_code: i32,
    pub stderr: String,
}

impl CommandFailed {
    pub fn new(argv: &[String], result: &CommandResult) -> Self {
        Self {
            argv: argv.to_vec(),
            exit_code: result.exit_code,
            stderr: stderr_snippet(&result.stderr),
        }
    }
}

impl fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command '{}' exited with code {}: {}",
            self.argv.join(" "),
            self.exit_code,
            self.stderr.trim()
        )
    }
}

/// Errors raised by a [`CommandExecutor`]
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Failed(CommandFailed),

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command line")]
    EmptyCommand,
}

/// Runs external programs
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the command to completion or until its timeout elapses.
    ///
    /// A timeout yields `Ok` with [`TIMEOUT_EXIT_CODE`] even when
    /// `must_succeed` is set.
    async fn execute(&self, spec: CommandSpec) -> Result<CommandResult, CommandError>;
}

/// Apply the `must_succeed` policy to a finished result
pub(crate) fn check_result(
    spec: &CommandSpec,
    result: CommandResult,
) -> Result<CommandResult, CommandError> {
    if spec.must_succeed && !result.timed_out && result.exit_code != 0 {
        return Err(CommandError::Failed(CommandFailed::new(&spec.argv, &result)));
    }
    Ok(result)
}

/// Trim stderr to a bounded snippet, keeping the tail where tools put the cause
pub fn stderr_snippet(stderr: &str) -> String {
    if stderr.len() <= STDERR_SNIPPET_LIMIT {
        return stderr.to_string();
    }
    let mut start = stderr.len() - STDERR_SNIPPET_LIMIT;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &stderr[start..])
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
