//! Introspection while commands are running

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::LocalSet;

use crate::common::*;
use kvsoak::stress::scenarios::{NeverConnected, SuccessSweep};
use kvsoak::stress::IntrospectionServer;

#[tokio::test(flavor = "current_thread")]
async fn snapshots_track_a_live_run() {
    let env = Arc::new(ScenarioEnv::loopback_for_tests());
    let registry = CommandRegistry::new()
        .with(NeverConnected::new(Arc::clone(&env)))
        .unwrap()
        .with(SuccessSweep::new(env))
        .unwrap();
    let runner = Runner::new(
        registry,
        Arc::new(lenient_watchdog(Duration::from_secs(30))),
        RunnerOptions {
            max_iterations: Some(100_000),
        },
    );
    let contexts = runner.contexts();
    let server = IntrospectionServer::start("127.0.0.1:0".parse().unwrap(), contexts.clone())
        .await
        .unwrap();
    let base = format!("http://{}", server.local_addr());

    let local = LocalSet::new();
    local
        .run_until(async move {
            let run = tokio::task::spawn_local(runner.start());

            // Wait for both setups.
            while !contexts.iter().all(|ctx| ctx.is_set_up()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let ids: Vec<usize> = reqwest::get(format!("{}/types/command", base))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            assert_eq!(ids, vec![0, 1]);

            let mut previous = 0;
            for _ in 0..3 {
                let snap: Value = reqwest::get(format!("{}/types/command/1", base))
                    .await
                    .unwrap()
                    .json()
                    .await
                    .unwrap();
                assert_eq!(snap["label"], "success sweep");
                assert!(snap["functionName"]
                    .as_str()
                    .unwrap()
                    .ends_with("SuccessSweep"));
                let started = snap["iterationsStarted"].as_u64().unwrap();
                assert!(started >= 1);
                assert!(started >= previous);
                assert!(snap["lastStartedTimestamp"].is_string());
                previous = started;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }

            run.abort();
            let _ = run.await;
        })
        .await;
    server.shutdown().await;
}
