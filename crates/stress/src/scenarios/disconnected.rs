//! Calls after the server behind a connected client goes away.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use kvsoak_rpc::{ConnectionState, ErrorKind, StoreClient};
use kvsoak_transport::RpcClient;

use crate::context::CommandContext;
use crate::error::{ensure, Result};
use crate::registry::CommandSpec;
use crate::scenarios::{expect_error, ScenarioEnv};

/// Each iteration: start a throwaway server, connect a fresh client, prove
/// the connection, stop the server, then require the next call to fail with
/// a transport kind.
pub struct DisconnectedAfterConnect {
    env: Arc<ScenarioEnv>,
    port: u16,
}

impl DisconnectedAfterConnect {
    pub fn new(env: Arc<ScenarioEnv>) -> Self {
        Self { env, port: 0 }
    }
}

#[async_trait(?Send)]
impl CommandSpec for DisconnectedAfterConnect {
    fn name(&self) -> &str {
        "disconnected after connect"
    }

    async fn setup(&mut self, _ctx: &CommandContext) -> Result<()> {
        self.port = self.env.allocate_port()?;
        Ok(())
    }

    async fn exec(&mut self, _ctx: &CommandContext) -> Result<()> {
        let server = self.env.backend.start(self.port).await?;
        let client = RpcClient::connect(self.env.client_for(server.port()));

        let connected = client.ping().await;
        let stopped = server.stop().await;
        if let Err(e) = connected {
            client.close().await;
            return Err(e.into());
        }
        stopped?;

        // Wait for the client to notice so the check below does not race the
        // teardown. Either way the call must fail with a transport kind.
        let noticed = client
            .wait_for_state(ConnectionState::Unavailable, Duration::from_secs(5))
            .await;
        debug!(noticed, "server stopped");

        let outcome = client.ping().await;
        client.close().await;
        expect_error("ping", outcome, ErrorKind::TRANSPORT)?;
        ensure(client.state() == ConnectionState::Closed, || {
            format!("client state after close is {}", client.state())
        })
    }
}
