//! Scenario contracts against the loopback backend

use std::sync::Arc;
use std::time::Duration;

use tokio::task::LocalSet;

use crate::common::*;
use kvsoak::stress::scenarios::{
    run_success_sweep, DisconnectedAfterConnect, FailureSweep, NeverConnected, ReconnectCycle,
};

async fn run_alone(spec: impl CommandSpec + 'static, iterations: u64) -> Arc<CommandContext> {
    let registry = CommandRegistry::new().with(spec).unwrap();
    let runner = Runner::new(
        registry,
        Arc::new(lenient_watchdog(Duration::from_secs(30))),
        RunnerOptions {
            max_iterations: Some(iterations),
        },
    );
    let ctx = Arc::clone(runner.contexts().get(0).unwrap());
    LocalSet::new().run_until(runner.start()).await.unwrap();
    ctx
}

#[tokio::test(flavor = "current_thread")]
async fn never_connected_always_reports_no_backends() {
    let env = Arc::new(ScenarioEnv::loopback_for_tests());
    let ctx = run_alone(NeverConnected::new(env), 30).await;
    assert_eq!(ctx.iterations_started(), 30);
}

#[tokio::test(flavor = "current_thread")]
async fn refused_port_also_counts_as_unreachable() {
    let mut env = ScenarioEnv::loopback_for_tests();
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    env.unreachable = fast_client(port);
    let ctx = run_alone(NeverConnected::new(Arc::new(env)), 10).await;
    assert_eq!(ctx.iterations_started(), 10);
}

#[tokio::test(flavor = "current_thread")]
async fn disconnected_after_connect_sees_transport_errors() {
    let env = Arc::new(ScenarioEnv::loopback_for_tests());
    let ctx = run_alone(DisconnectedAfterConnect::new(env), 5).await;
    assert_eq!(ctx.iterations_started(), 5);
}

#[tokio::test(flavor = "current_thread")]
async fn reconnect_cycle_keeps_one_client() {
    let env = Arc::new(ScenarioEnv::loopback_for_tests());
    let ctx = run_alone(ReconnectCycle::new(env), 4).await;
    assert_eq!(ctx.iterations_started(), 4);
}

#[tokio::test(flavor = "current_thread")]
async fn failure_sweep_gets_the_documented_kinds() {
    let env = Arc::new(ScenarioEnv::loopback_for_tests());
    let ctx = run_alone(FailureSweep::new(env), 5).await;
    assert_eq!(ctx.iterations_started(), 5);
}

#[tokio::test(flavor = "current_thread")]
async fn success_sweep_is_repeatable_on_one_bucket_name() {
    let store = TestStore::new().await;
    // Same name twice: the first run must leave nothing behind.
    run_success_sweep(&store.client, "repeat").await.unwrap();
    run_success_sweep(&store.client, "repeat").await.unwrap();
    assert!(store.client.list_buckets().await.unwrap().is_empty());
    store.stop().await;
}

#[tokio::test(flavor = "current_thread")]
async fn scenario_failure_stops_the_run() {
    // Point the never-connected scenario at a live server: the first call
    // succeeds, which is outside its whitelist.
    let server = LoopbackServer::bind("127.0.0.1:0").await.unwrap();
    let mut env = ScenarioEnv::loopback_for_tests();
    env.unreachable = fast_client(server.port());
    let registry = CommandRegistry::new()
        .with(NeverConnected::new(Arc::new(env)))
        .unwrap();
    let runner = Runner::new(
        registry,
        Arc::new(lenient_watchdog(Duration::from_secs(30))),
        RunnerOptions::default(),
    );

    let err = LocalSet::new().run_until(runner.start()).await.unwrap_err();
    match err {
        StressError::Exec { command, iteration, source } => {
            assert_eq!(command, "never connected");
            assert_eq!(iteration, 1);
            assert!(matches!(*source, StressError::UnexpectedOutcome { .. }));
        }
        other => panic!("Expected Exec error, got {:?}", other),
    }
    Box::new(server).stop().await.unwrap();
}
