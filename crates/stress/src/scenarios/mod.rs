//! The soak scenarios.
//!
//! Each scenario is a [`CommandSpec`](crate::CommandSpec) whose iteration is a
//! small state machine run from scratch. Servers and clients a scenario keeps
//! across iterations are owned by the scenario struct and never shared.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kvsoak_backend::{Backend, LoopbackBackend, ProcessBackend};
use kvsoak_transport::ClientConfig;

use crate::config::{ServerMode, StressConfig};
use crate::error::{ConfigError, Result};
use crate::registry::CommandRegistry;

mod disconnected;
mod expect;
mod failure_sweep;
mod never_connected;
mod reconnect;
mod success_sweep;

pub use disconnected::DisconnectedAfterConnect;
pub use expect::expect_error;
pub use failure_sweep::FailureSweep;
pub use never_connected::NeverConnected;
pub use reconnect::ReconnectCycle;
pub use success_sweep::{run_success_sweep, SuccessSweep};

/// Bounded polling used while waiting for a fresh server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts: u32,
    pub delay: Duration,
}

/// Hands out one port per scenario.
#[derive(Debug)]
pub struct PortAllocator {
    next: AtomicU16,
}

impl PortAllocator {
    /// Ports counting up from `base`. A base of 0 asks the OS each time.
    pub fn new(base: u16) -> Self {
        Self {
            next: AtomicU16::new(base),
        }
    }

    pub fn allocate(&self) -> std::io::Result<u16> {
        if self.next.load(Ordering::Relaxed) == 0 {
            // Bind and release; the port stays free long enough for a test.
            let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
            return Ok(listener.local_addr()?.port());
        }
        let port = self.next.fetch_add(1, Ordering::Relaxed);
        if port == u16::MAX {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "port range exhausted",
            ));
        }
        Ok(port)
    }
}

/// Everything the scenarios need from the outside world.
pub struct ScenarioEnv {
    /// Launches servers.
    pub backend: Arc<dyn Backend>,
    /// Client settings template; the port is filled in per scenario.
    pub client: ClientConfig,
    /// Address that never has a backend.
    pub unreachable: ClientConfig,
    /// Reconnect cycle polling budget.
    pub reconnect: RetryBudget,
    ports: PortAllocator,
}

impl ScenarioEnv {
    pub fn new(
        backend: Arc<dyn Backend>,
        client: ClientConfig,
        unreachable: ClientConfig,
        reconnect: RetryBudget,
        base_port: u16,
    ) -> Self {
        Self {
            backend,
            client,
            unreachable,
            reconnect,
            ports: PortAllocator::new(base_port),
        }
    }

    /// Environment described by a config file.
    pub fn from_config(config: &StressConfig) -> std::result::Result<Self, ConfigError> {
        let backend: Arc<dyn Backend> = match config.server.mode {
            ServerMode::Loopback => {
                Arc::new(LoopbackBackend::with_host(config.server.host.clone()))
            }
            ServerMode::Process => {
                let process = config.process_config().ok_or_else(|| {
                    ConfigError::Invalid("server.mode = \"process\" requires server.program".into())
                })?;
                Arc::new(ProcessBackend::new(process))
            }
        };
        let unreachable = ClientConfig {
            host: config.unreachable.host.clone(),
            port: config.unreachable.port,
            ..config.client_config(config.unreachable.port)
        };
        Ok(Self::new(
            backend,
            config.client_config(0),
            unreachable,
            RetryBudget {
                attempts: config.reconnect.attempts,
                delay: Duration::from_millis(config.reconnect.delay_ms),
            },
            config.server.base_port,
        ))
    }

    /// Loopback servers on OS-assigned ports with short timeouts.
    pub fn loopback_for_tests() -> Self {
        let client = ClientConfig {
            connect_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            ..ClientConfig::new("127.0.0.1", 0)
        };
        let unreachable = ClientConfig {
            host: "backend.invalid".to_string(),
            port: 4099,
            ..client.clone()
        };
        Self::new(
            Arc::new(LoopbackBackend::new()),
            client,
            unreachable,
            RetryBudget {
                attempts: 50,
                delay: Duration::from_millis(20),
            },
            0,
        )
    }

    /// A fresh port for one scenario.
    pub fn allocate_port(&self) -> Result<u16> {
        Ok(self
            .ports
            .allocate()
            .map_err(kvsoak_backend::BackendError::Io)?)
    }

    /// Client settings for a server on `port`.
    pub fn client_for(&self, port: u16) -> ClientConfig {
        ClientConfig {
            port,
            ..self.client.clone()
        }
    }
}

/// Every scenario, in a fixed order.
pub fn default_registry(env: Arc<ScenarioEnv>) -> Result<CommandRegistry> {
    CommandRegistry::new()
        .with(NeverConnected::new(Arc::clone(&env)))?
        .with(DisconnectedAfterConnect::new(Arc::clone(&env)))?
        .with(ReconnectCycle::new(Arc::clone(&env)))?
        .with(FailureSweep::new(Arc::clone(&env)))?
        .with(SuccessSweep::new(env))
}
