//! Calls against an address that never has a backend.

use std::sync::Arc;

use async_trait::async_trait;

use kvsoak_rpc::{ErrorKind, StoreClient};
use kvsoak_transport::RpcClient;

use crate::context::CommandContext;
use crate::error::Result;
use crate::registry::CommandSpec;
use crate::scenarios::{expect_error, ScenarioEnv};

/// One long-lived client pointed at an unreachable address. Every call must
/// fail with `NoBackends`.
pub struct NeverConnected {
    env: Arc<ScenarioEnv>,
    client: Option<RpcClient>,
}

impl NeverConnected {
    pub fn new(env: Arc<ScenarioEnv>) -> Self {
        Self { env, client: None }
    }
}

#[async_trait(?Send)]
impl CommandSpec for NeverConnected {
    fn name(&self) -> &str {
        "never connected"
    }

    async fn setup(&mut self, _ctx: &CommandContext) -> Result<()> {
        self.client = Some(RpcClient::connect(self.env.unreachable.clone()));
        Ok(())
    }

    async fn exec(&mut self, ctx: &CommandContext) -> Result<()> {
        let Some(client) = self.client.as_ref() else {
            return Err(crate::StressError::assertion("client not set up"));
        };
        // Rotate through a few request shapes so more than one code path
        // meets the missing backend.
        match ctx.iterations_started() % 3 {
            0 => expect_error("ping", client.ping().await, &[ErrorKind::NoBackends])?,
            1 => expect_error(
                "listBuckets",
                client.list_buckets().await,
                &[ErrorKind::NoBackends],
            )?,
            _ => expect_error(
                "getObject",
                client.get_object("soak", "k").await,
                &[ErrorKind::NoBackends],
            )?,
        };
        Ok(())
    }
}
