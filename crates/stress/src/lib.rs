//! # kvsoak stress
//!
//! A long-running soak driver for a store client. Every registered command
//! loops forever on a single-threaded runtime, each iteration supervised by a
//! watchdog, while an HTTP introspection surface publishes per-command
//! counters.
//!
//! - [`CommandRegistry`] / [`CommandSpec`] - the scenarios to run
//! - [`Runner`] - setup, then self-resubmitting loops
//! - [`Watchdog`] - per-iteration deadlines with a configurable hang action
//! - [`IntrospectionServer`] - `GET /types/command/{id}` snapshots
//! - [`scenarios`] - never-connected, disconnected, reconnect, failure and
//!   success sweeps

pub mod config;
pub mod context;
pub mod error;
pub mod introspection;
pub mod logging;
pub mod registry;
pub mod runner;
pub mod scenarios;
pub mod watchdog;

pub use config::{ServerMode, StressConfig, CONFIG_FILE_NAME};
pub use context::{CommandContext, CommandSnapshot, ContextTable};
pub use error::{ensure, ConfigError, Result, StressError};
pub use introspection::IntrospectionServer;
pub use registry::{CommandRegistry, CommandSpec};
pub use runner::{Runner, RunnerOptions};
pub use scenarios::{default_registry, ScenarioEnv};
pub use watchdog::{HangAction, HangReport, Watchdog, WatchdogGuard};
