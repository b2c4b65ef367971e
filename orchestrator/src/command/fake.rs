//! In-memory command executor for deterministic tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::command::executor::{
    check_result, CommandError, CommandExecutor, CommandResult, CommandSpec,
};

/// Exit code answered for commands with no canned result
pub const UNMATCHED_EXIT_CODE: i32 = 127;

/// Maps argv fingerprints to canned results. No process is ever spawned.
///
/// Lookups try an exact fingerprint match first, then the longest
/// registered fingerprint that prefixes the command. When several results
/// are queued for one fingerprint they are handed out in order and the
/// last one repeats.
#[derive(Default)]
pub struct FakeExecutor {
    responses: Mutex<HashMap<String, VecDeque<CommandResult>>>,
    default_result: Mutex<Option<CommandResult>>,
    history: Mutex<Vec<CommandSpec>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for commands whose fingerprint starts with `fingerprint`
    pub fn on(&self, fingerprint: impl Into<String>, result: CommandResult) -> &Self {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        responses
            .entry(fingerprint.into())
            .or_default()
            .push_back(result);
        self
    }

    /// Queue several results, handed out in order
    pub fn on_sequence(
        &self,
        fingerprint: impl Into<String>,
        results: impl IntoIterator<Item = CommandResult>,
    ) -> &Self {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        responses
            .entry(fingerprint.into())
            .or_default()
            .extend(results);
        self
    }

    /// Result for any command without a canned match
    pub fn set_default(&self, result: CommandResult) -> &Self {
        *self.default_result.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
        self
    }

    /// Every command executed so far
    pub fn history(&self) -> Vec<CommandSpec> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fingerprints of every command executed so far
    pub fn calls(&self) -> Vec<String> {
        self.history().iter().map(CommandSpec::fingerprint).collect()
    }

    /// Number of executed commands whose fingerprint starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn lookup(&self, fingerprint: &str) -> CommandResult {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());

        let key = if responses.contains_key(fingerprint) {
            Some(fingerprint.to_string())
        } else {
            responses
                .keys()
                .filter(|k| fingerprint.starts_with(k.as_str()))
                .max_by_key(|k| k.len())
                .cloned()
        };

        if let Some(key) = key {
            if let Some(queue) = responses.get_mut(&key) {
                let next = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                };
                if let Some(result) = next {
                    return result;
                }
            }
        }
        drop(responses);

        self.default_result
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| {
                CommandResult::failed(
                    UNMATCHED_EXIT_CODE,
                    format!("no canned result for: {fingerprint}"),
                )
            })
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn execute(&self, spec: CommandSpec) -> Result<CommandResult, CommandError> {
        if spec.argv.is_empty() {
            return Err(CommandError::EmptyCommand);
        }
        let result = self.lookup(&spec.fingerprint());
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());
        check_result(&spec, result)
    }
}
