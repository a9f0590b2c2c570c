//! Command implementations for the snowctl CLI.
//!
//! Each submodule holds one command group. Commands build a response value
//! and hand it to [`Output::print`]; diagnostics go to stderr.

mod connection;
mod show;
mod sql;

pub use connection::{
    connection_list, connection_remove, connection_set, connection_set_default,
    connection_test, connection_use, SetOptions,
};
pub use show::{show_account, DEFAULT_WINDOW_DAYS};
pub use sql::sql;

use std::io::IsTerminal;

use crate::config::ConfigPaths;
use crate::output::Output;
use crate::warehouse::TimeoutConfig;

/// Reads one environment variable.
pub type EnvLookup = fn(&str) -> Option<String>;

fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Everything a command needs besides its own arguments.
pub struct Runtime {
    pub paths: ConfigPaths,
    pub output: Output,
    /// `-c/--connection` override
    pub connection: Option<String>,
    pub timeouts: TimeoutConfig,
    /// Source of `SNOWFLAKE_*` values and secrets
    pub env: EnvLookup,
}

impl Runtime {
    pub fn new(
        paths: ConfigPaths,
        output: Output,
        connection: Option<String>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            paths,
            output,
            connection,
            timeouts,
            env: process_env,
        }
    }

    /// Spinner only when the user has not asked for silence.
    pub(crate) fn show_progress(&self) -> bool {
        !self.output.is_quiet()
    }
}

/// Prompts need a human on both ends.
pub(crate) fn stdin_is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}
