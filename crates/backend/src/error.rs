//! Backend lifecycle errors.

use std::time::Duration;

use thiserror::Error;

/// Failures starting or stopping a server.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Listener could not bind.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Server program could not be launched.
    #[error("cannot spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Server program exited before printing every readiness marker.
    #[error("{program} exited before becoming ready (missing markers: {missing:?})")]
    ExitedEarly {
        program: String,
        missing: Vec<String>,
    },

    /// Readiness markers did not all appear in time.
    #[error("{program} not ready after {timeout:?} (missing markers: {missing:?})")]
    StartupTimeout {
        program: String,
        timeout: Duration,
        missing: Vec<String>,
    },

    /// Any other I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;
