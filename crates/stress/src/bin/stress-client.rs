//! `stress-client`: run every soak scenario until killed.
//!
//! Exit status: 0 after a bounded run (`--iterations`), 1 when a command
//! fails, 70 or a core dump when the watchdog fires, 130 on Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::LocalSet;
use tracing::{error, info};

use kvsoak_stress::{
    default_registry, logging, ContextTable, IntrospectionServer, Runner, RunnerOptions,
    ScenarioEnv, ServerMode, StressConfig, Watchdog, CONFIG_FILE_NAME,
};

#[derive(Parser, Debug)]
#[command(name = "stress-client")]
#[command(about = "Soak a store client against every RPC code path")]
#[command(version)]
struct Args {
    /// Config file; a missing file means defaults
    #[arg(short, long, env = "KVSOAK_CONFIG", default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Write the default config to --config if it does not exist, then exit
    #[arg(long)]
    init_config: bool,

    /// Per-iteration watchdog budget in milliseconds
    #[arg(long)]
    watchdog_ms: Option<u64>,

    /// Introspection server port (0 = any free port)
    #[arg(long)]
    introspection_port: Option<u16>,

    /// Where servers come from
    #[arg(long, value_enum)]
    server_mode: Option<ServerMode>,

    /// Stop each command after N iterations instead of running forever
    #[arg(long)]
    iterations: Option<u64>,

    /// Base log level (RUST_LOG overrides)
    #[arg(long)]
    log_level: Option<String>,

    /// Print the registered commands and exit
    #[arg(long)]
    list: bool,
}

impl Args {
    fn apply(&self, config: &mut StressConfig) {
        if let Some(ms) = self.watchdog_ms {
            config.watchdog_ms = ms;
        }
        if let Some(port) = self.introspection_port {
            config.introspection.port = port;
        }
        if let Some(mode) = self.server_mode {
            config.server.mode = mode;
        }
        if let Some(n) = self.iterations {
            config.iterations = Some(n);
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init_config {
        StressConfig::write_default_if_missing(&args.config)?;
        println!("{}", args.config.display());
        return Ok(());
    }

    let mut config = StressConfig::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;
    logging::init(&config.log_level)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    let local = LocalSet::new();
    let result = local.block_on(&runtime, run(config, args.list));
    if let Err(e) = &result {
        error!(error = %e, "soak failed");
    }
    result
}

async fn run(config: StressConfig, list: bool) -> anyhow::Result<()> {
    let env = Arc::new(ScenarioEnv::from_config(&config)?);
    let registry = default_registry(env)?;

    if list {
        for (id, name) in registry.names().enumerate() {
            println!("{}\t{}", id, name);
        }
        return Ok(());
    }

    let watchdog = Watchdog::start(config.watchdog_budget(), config.parsed_hang_action()?)?;
    let runner = Runner::new(
        registry,
        Arc::new(watchdog),
        RunnerOptions {
            max_iterations: config.iterations,
        },
    );
    let contexts = runner.contexts();
    let introspection = IntrospectionServer::start(config.introspection_addr()?, contexts.clone())
        .await?;
    info!(
        addr = %introspection.local_addr(),
        commands = contexts.len(),
        watchdog_ms = config.watchdog_ms,
        "soak started"
    );

    tokio::select! {
        result = runner.start() => {
            introspection.shutdown().await;
            result?;
            log_snapshots(&contexts);
            info!("soak finished");
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            log_snapshots(&contexts);
            info!("interrupted");
            std::process::exit(130);
        }
    }
}

fn log_snapshots(contexts: &ContextTable) {
    for snapshot in contexts.snapshots() {
        info!(
            command = %snapshot.label,
            iterations = snapshot.iterations_started,
            last_started = snapshot.last_started_timestamp.as_deref().unwrap_or("never"),
            "final counters"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("stress-client").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_file_values() {
        let mut config = StressConfig::default();
        config.watchdog_ms = 5_000;
        config.log_level = "warn".into();

        parse(&[
            "--watchdog-ms",
            "750",
            "--introspection-port",
            "0",
            "--server-mode",
            "process",
            "--iterations",
            "3",
        ])
        .apply(&mut config);

        assert_eq!(config.watchdog_ms, 750);
        assert_eq!(config.introspection.port, 0);
        assert_eq!(config.server.mode, ServerMode::Process);
        assert_eq!(config.iterations, Some(3));
        // Not given on the command line, so the file value stands.
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn no_flags_leave_config_untouched() {
        let mut config = StressConfig::default();
        config.watchdog_ms = 1_234;
        parse(&[]).apply(&mut config);
        assert_eq!(config.watchdog_ms, 1_234);
        assert_eq!(config.iterations, None);
    }

    #[test]
    fn unknown_server_mode_is_rejected() {
        let parsed = Args::try_parse_from(["stress-client", "--server-mode", "cloud"]);
        assert!(parsed.is_err());
    }
}
