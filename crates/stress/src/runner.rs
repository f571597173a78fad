//! The command runner.
//!
//! Every registered command gets its own local task: setup, then a loop of
//! iterations supervised by the watchdog. Loops yield to the scheduler
//! between iterations, so thousands of cheap iterations never starve a
//! sibling command waiting on a timer or socket.
//!
//! # Example
//!
//! ```ignore
//! let runner = Runner::new(registry, Arc::new(watchdog), RunnerOptions::default());
//! let contexts = runner.contexts();
//! LocalSet::new().run_until(runner.start()).await?;
//! ```

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

use crate::context::{CommandContext, ContextTable};
use crate::error::{Result, StressError};
use crate::registry::{CommandRegistry, CommandSpec};
use crate::watchdog::Watchdog;

/// Runner knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Stop each command after this many iterations. `None` runs forever.
    pub max_iterations: Option<u64>,
}

/// Drives every command of a registry.
pub struct Runner {
    specs: Vec<Box<dyn CommandSpec>>,
    contexts: ContextTable,
    watchdog: Arc<Watchdog>,
    options: RunnerOptions,
}

impl Runner {
    /// Allocate one context per command. Nothing runs until [`start`](Self::start).
    pub fn new(registry: CommandRegistry, watchdog: Arc<Watchdog>, options: RunnerOptions) -> Self {
        let specs = registry.into_specs();
        let contexts = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                Arc::new(CommandContext::new(
                    index,
                    spec.name(),
                    spec.function_name(),
                ))
            })
            .collect();
        Self {
            specs,
            contexts: ContextTable::new(contexts),
            watchdog,
            options,
        }
    }

    /// Shared view of every command's counters.
    pub fn contexts(&self) -> ContextTable {
        self.contexts.clone()
    }

    /// Run all commands. Must be polled inside a [`tokio::task::LocalSet`].
    ///
    /// Returns the first setup or iteration failure; the remaining commands
    /// are cancelled. With `max_iterations` unset this only returns on
    /// failure.
    pub async fn start(self) -> Result<()> {
        let Runner {
            specs,
            contexts,
            watchdog,
            options,
        } = self;
        info!(commands = specs.len(), "starting commands");

        let mut tasks = JoinSet::new();
        for (spec, ctx) in specs.into_iter().zip(contexts.iter()) {
            let span = info_span!("command", name = %ctx.label());
            tasks.spawn_local(
                drive(spec, Arc::clone(ctx), Arc::clone(&watchdog), options).instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| StressError::Task(e.to_string()))
                .and_then(|result| result);
            if let Err(e) = outcome {
                error!(error = %e, "command failed; stopping run");
                tasks.shutdown().await;
                return Err(e);
            }
        }
        info!("all commands finished");
        Ok(())
    }
}

async fn drive(
    mut spec: Box<dyn CommandSpec>,
    ctx: Arc<CommandContext>,
    watchdog: Arc<Watchdog>,
    options: RunnerOptions,
) -> Result<()> {
    ctx.begin_setup();
    debug!("setup started");
    // Setup is supervised as iteration 0.
    let guard = watchdog.arm(ctx.index(), ctx.label(), 0)?;
    let setup = spec.setup(&ctx).await;
    guard.disarm();
    if let Err(e) = setup {
        error!(error = %e, "setup failed");
        return Err(StressError::Setup {
            command: ctx.label().to_string(),
            source: Box::new(e),
        });
    }
    ctx.finish_setup();
    info!("setup done; looping");

    loop {
        if let Some(max) = options.max_iterations {
            if ctx.iterations_started() >= max {
                break;
            }
        }
        let iteration = ctx.begin_iteration();
        let guard = watchdog.arm(ctx.index(), ctx.label(), iteration)?;
        let outcome = spec.exec(&ctx).await;
        guard.disarm();

        if let Err(e) = outcome {
            error!(iteration, error = %e, "iteration failed");
            return Err(StressError::Exec {
                command: ctx.label().to_string(),
                iteration,
                source: Box::new(e),
            });
        }
        debug!(iteration, "iteration done");
        tokio::task::yield_now().await;
    }

    info!(iterations = ctx.iterations_started(), "loop finished");
    Ok(())
}
