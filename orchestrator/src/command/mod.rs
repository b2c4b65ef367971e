//! Command execution port
//!
//! Every external tool (kubectl, helm) is reached through [`CommandExecutor`].
//! Production code uses [`ProcessExecutor`]; tests use [`FakeExecutor`].

pub mod executor;
pub mod fake;
pub mod process;

pub use executor::{
    CommandError, CommandExecutor, CommandFailed, CommandResult, CommandSpec, TIMEOUT_EXIT_CODE,
};
pub use fake::FakeExecutor;
pub use process::{ExecutorOptions, ProcessExecutor};
