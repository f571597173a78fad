//! Runner invariants over the full scenario registry

use std::sync::Arc;
use std::time::Duration;

use tokio::task::LocalSet;

use crate::common::*;
use kvsoak::stress::default_registry;

#[tokio::test(flavor = "current_thread")]
async fn every_scenario_completes_a_bounded_run() {
    let env = Arc::new(ScenarioEnv::loopback_for_tests());
    let registry = default_registry(env).unwrap();
    let watchdog = Arc::new(lenient_watchdog(Duration::from_secs(30)));
    let runner = Runner::new(
        registry,
        Arc::clone(&watchdog),
        RunnerOptions {
            max_iterations: Some(3),
        },
    );
    let contexts = runner.contexts();

    LocalSet::new().run_until(runner.start()).await.unwrap();

    assert_eq!(contexts.len(), 5);
    for ctx in contexts.iter() {
        assert!(ctx.is_set_up(), "{} never set up", ctx.label());
        assert_eq!(ctx.iterations_started(), 3, "{}", ctx.label());
        assert!(ctx.last_started() >= ctx.setup_done(), "{}", ctx.label());
    }
    assert_eq!(watchdog.armed_count(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn counters_never_go_backwards() {
    let env = Arc::new(ScenarioEnv::loopback_for_tests());
    let registry = CommandRegistry::new()
        .with(kvsoak::stress::scenarios::NeverConnected::new(env))
        .unwrap();
    let runner = Runner::new(
        registry,
        Arc::new(lenient_watchdog(Duration::from_secs(30))),
        RunnerOptions {
            max_iterations: Some(200),
        },
    );
    let contexts = runner.contexts();
    let ctx = Arc::clone(contexts.get(0).unwrap());

    let local = LocalSet::new();
    local
        .run_until(async move {
            let handle = tokio::task::spawn_local(runner.start());
            let mut last = 0;
            while !handle.is_finished() {
                let now = ctx.iterations_started();
                assert!(now >= last, "went from {} to {}", last, now);
                last = now;
                tokio::task::yield_now().await;
            }
            handle.await.unwrap().unwrap();
            assert_eq!(ctx.iterations_started(), 200);
        })
        .await;
}
