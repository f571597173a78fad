//! Hang detection through the runner

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::LocalSet;

use crate::common::*;

/// Sleeps past the budget on its second iteration.
struct Sleepy;

#[async_trait(?Send)]
impl CommandSpec for Sleepy {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn exec(&mut self, ctx: &CommandContext) -> kvsoak::stress::Result<()> {
        if ctx.iterations_started() == 2 {
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        Ok(())
    }
}

#[tokio::test(flavor = "current_thread")]
async fn overrun_reports_the_hung_command() {
    let reports = Arc::new(Mutex::new(Vec::<HangReport>::new()));
    let sink = Arc::clone(&reports);
    let watchdog = Watchdog::start(
        Duration::from_millis(100),
        HangAction::Custom(Arc::new(move |report: &HangReport| {
            sink.lock().push(report.clone());
        })),
    )
    .unwrap();
    let registry = CommandRegistry::new().with(Sleepy).unwrap();
    let runner = Runner::new(
        registry,
        Arc::new(watchdog),
        RunnerOptions {
            max_iterations: Some(3),
        },
    );

    LocalSet::new().run_until(runner.start()).await.unwrap();

    let reports = reports.lock();
    assert_eq!(reports.len(), 1, "{:?}", *reports);
    assert_eq!(reports[0].command, "sleepy");
    assert_eq!(reports[0].iteration, 2);
    assert_eq!(reports[0].slot, 0);
    assert!(reports[0].elapsed >= Duration::from_millis(100));
}
