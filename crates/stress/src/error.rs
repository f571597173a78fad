//! Error types for the soak driver.

use std::path::PathBuf;

use thiserror::Error;

use kvsoak_backend::BackendError;
use kvsoak_rpc::{ErrorKind, RpcError};

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`StressConfig`](crate::StressConfig).
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Config file could not be written.
    #[error("failed to write config file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value is out of range or inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Soak driver failures. Every one of these is fatal to the run.
#[derive(Debug, Error)]
pub enum StressError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("backend: {0}")]
    Backend(#[from] BackendError),

    /// An RPC failed where the scenario expected success.
    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),

    /// An RPC produced something other than one of the whitelisted errors.
    #[error("{operation}: expected one of {expected:?}, got {actual}")]
    UnexpectedOutcome {
        operation: String,
        expected: Vec<ErrorKind>,
        actual: String,
    },

    /// A scenario check on returned data failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Two commands registered under the same name.
    #[error("duplicate command name: {0}")]
    DuplicateCommand(String),

    /// A watchdog slot was armed while already armed.
    #[error("watchdog slot {slot} ({command}) is already armed")]
    AlreadyArmed { slot: usize, command: String },

    /// The watchdog thread could not be started.
    #[error("cannot start watchdog thread: {0}")]
    WatchdogThread(#[source] std::io::Error),

    #[error("setup of {command} failed: {source}")]
    Setup {
        command: String,
        #[source]
        source: Box<StressError>,
    },

    #[error("iteration {iteration} of {command} failed: {source}")]
    Exec {
        command: String,
        iteration: u64,
        #[source]
        source: Box<StressError>,
    },

    /// A command task panicked or was cancelled.
    #[error("command task failed: {0}")]
    Task(String),

    /// The introspection server could not bind or serve.
    #[error("introspection server on {addr}: {source}")]
    Introspection {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl StressError {
    /// Shorthand for [`StressError::Assertion`].
    pub fn assertion(message: impl Into<String>) -> Self {
        StressError::Assertion(message.into())
    }
}

/// Result type for the soak driver
pub type Result<T> = std::result::Result<T, StressError>;

/// Fail with an assertion error unless `condition` holds.
pub fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(StressError::Assertion(message()))
    }
}
