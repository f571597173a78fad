//! Shared test utilities for all integration test suites.
//!
//! Import with `#[path = "../common/mod.rs"] mod common;` from a suite main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::time::Duration;

pub use kvsoak::backend::{Backend, LoopbackBackend, LoopbackServer, ServerHandle};
pub use kvsoak::rpc::{
    object, BatchOp, BucketConfig, ConnectionState, ErrorKind, Filter, IndexType, StoreClient,
};
pub use kvsoak::stress::{
    CommandContext, CommandRegistry, CommandSpec, HangAction, HangReport, Runner, RunnerOptions,
    ScenarioEnv, StressError, Watchdog,
};
pub use kvsoak::transport::{ClientConfig, RpcClient};

/// Client settings with short timeouts for a local server.
pub fn fast_client(port: u16) -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_secs(5),
        min_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        ..ClientConfig::new("127.0.0.1", port)
    }
}

/// A loopback server on a free port and a client connected to it.
pub struct TestStore {
    pub server: LoopbackServer,
    pub client: RpcClient,
}

impl TestStore {
    pub async fn new() -> Self {
        let server = LoopbackServer::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind loopback server");
        let client = RpcClient::connect(fast_client(server.port()));
        TestStore { server, client }
    }

    /// Bucket with `field1` indexed as a number.
    pub async fn with_bucket(name: &str) -> Self {
        let store = Self::new().await;
        store
            .client
            .create_bucket(name, BucketConfig::default().with_index("field1", IndexType::Number))
            .await
            .expect("Failed to create bucket");
        store
    }

    pub async fn stop(self) {
        self.client.close().await;
        Box::new(self.server).stop().await.expect("Failed to stop server");
    }
}

/// Watchdog whose hangs are only recorded, never fatal.
pub fn lenient_watchdog(budget: Duration) -> Watchdog {
    Watchdog::start(budget, HangAction::Custom(std::sync::Arc::new(|_: &HangReport| {})))
        .expect("Failed to start watchdog")
}
