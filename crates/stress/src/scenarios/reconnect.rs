//! Server restarts under one long-lived client.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use kvsoak_rpc::{ErrorKind, StoreClient};
use kvsoak_transport::RpcClient;

use crate::context::CommandContext;
use crate::error::{Result, StressError};
use crate::registry::CommandSpec;
use crate::scenarios::{expect_error, ScenarioEnv};

/// The same client survives every iteration: start a server on its port,
/// ping until the client reconnects, stop the server, and require the next
/// call to fail with a transport kind.
///
/// Each iteration launches a server, so this command iterates far slower
/// than the others.
pub struct ReconnectCycle {
    env: Arc<ScenarioEnv>,
    port: u16,
    client: Option<RpcClient>,
    reconnects: u64,
}

impl ReconnectCycle {
    pub fn new(env: Arc<ScenarioEnv>) -> Self {
        Self {
            env,
            port: 0,
            client: None,
            reconnects: 0,
        }
    }
}

#[async_trait(?Send)]
impl CommandSpec for ReconnectCycle {
    fn name(&self) -> &str {
        "reconnect cycle"
    }

    async fn setup(&mut self, _ctx: &CommandContext) -> Result<()> {
        self.port = self.env.allocate_port()?;
        self.client = Some(RpcClient::connect(self.env.client_for(self.port)));
        Ok(())
    }

    async fn exec(&mut self, _ctx: &CommandContext) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| StressError::assertion("client not set up"))?;
        let budget = self.env.reconnect;
        let server = self.env.backend.start(self.port).await?;

        let mut attempt = 0;
        let connected = loop {
            attempt += 1;
            match client.ping().await {
                Ok(()) => break true,
                Err(e) if attempt < budget.attempts => {
                    debug!(attempt, error = %e, "not reconnected yet");
                    tokio::time::sleep(budget.delay).await;
                }
                Err(_) => break false,
            }
        };
        if !connected {
            server.stop().await?;
            return Err(StressError::assertion(format!(
                "client did not reconnect within {} attempts {:?} apart",
                budget.attempts, budget.delay
            )));
        }
        self.reconnects += 1;
        debug!(attempt, reconnects = self.reconnects, "reconnected");

        server.stop().await?;
        expect_error("ping", client.ping().await, ErrorKind::TRANSPORT)?;
        Ok(())
    }
}
