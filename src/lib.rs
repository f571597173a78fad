//! kvsoak - integration and soak harness for a key-value RPC client/server pair
//!
//! kvsoak stands up store servers, drives a long-lived client against them
//! through every request/response and failure path, and watches for hangs.
//!
//! # Quick Start
//!
//! ```ignore
//! use kvsoak::stress::{default_registry, Runner, RunnerOptions, ScenarioEnv, Watchdog, HangAction};
//!
//! let env = Arc::new(ScenarioEnv::loopback_for_tests());
//! let watchdog = Watchdog::start(Duration::from_secs(30), HangAction::Abort)?;
//! let runner = Runner::new(default_registry(env)?, Arc::new(watchdog), RunnerOptions::default());
//! LocalSet::new().run_until(runner.start()).await?;
//! ```
//!
//! # Architecture
//!
//! - [`rpc`] - instruction set, error kinds and the `StoreClient` contract
//! - [`transport`] - wire framing and the reconnecting `RpcClient`
//! - [`backend`] - loopback and external-process servers
//! - [`stress`] - registry, runner, watchdog, introspection and scenarios

pub use kvsoak_backend as backend;
pub use kvsoak_rpc as rpc;
pub use kvsoak_stress as stress;
pub use kvsoak_transport as transport;

pub use kvsoak_rpc::{ErrorKind, Request, Response, RpcError, StoreClient};
pub use kvsoak_transport::{ClientConfig, RpcClient};
