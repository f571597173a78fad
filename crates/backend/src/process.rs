//! External server process.
//!
//! The server program is launched in its own process group with the port
//! substituted into its arguments. It is considered ready once every
//! configured marker has appeared on its stdout. Teardown kills the whole
//! group so helper processes the server forked do not outlive it.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{BackendError, Result};
use crate::{Backend, ServerHandle};

/// Placeholder replaced by the port in program arguments.
pub const PORT_PLACEHOLDER: &str = "{port}";

/// How to launch the server program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Program to run.
    pub program: String,
    /// Arguments; `{port}` is substituted.
    pub args: Vec<String>,
    /// Substrings that must each appear on stdout before the server is ready.
    pub ready_markers: Vec<String>,
    /// Bound on waiting for the markers.
    pub startup_timeout: Duration,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl ProcessConfig {
    /// Config with no arguments, no markers and a 30 second startup bound.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ready_markers: Vec::new(),
            startup_timeout: Duration::from_secs(30),
            env: BTreeMap::new(),
        }
    }

    /// Arguments with the port substituted.
    pub fn args_for(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port))
            .collect()
    }
}

/// Launches a [`ServerProcess`] per `start`.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    config: ProcessConfig,
}

impl ProcessBackend {
    pub fn new(config: ProcessConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    fn name(&self) -> &str {
        &self.config.program
    }

    async fn start(&self, port: u16) -> Result<Box<dyn ServerHandle>> {
        let process = ServerProcess::spawn(&self.config, port).await?;
        Ok(Box::new(process))
    }
}

/// A running server program.
pub struct ServerProcess {
    program: String,
    port: u16,
    child: Child,
}

impl ServerProcess {
    /// Launch the program and wait until it is ready.
    pub async fn spawn(config: &ProcessConfig, port: u16) -> Result<Self> {
        let mut command = Command::new(&config.program);
        command
            .args(config.args_for(port))
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| BackendError::Spawn {
            program: config.program.clone(),
            source,
        })?;
        let pid = child.id();
        info!(program = %config.program, ?pid, port, "server process spawned");

        let stdout = child.stdout.take().ok_or_else(|| {
            BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "child stdout not captured",
            ))
        })?;
        let mut process = Self {
            program: config.program.clone(),
            port,
            child,
        };

        let mut lines = BufReader::new(stdout).lines();
        let mut missing = config.ready_markers.clone();
        let waited = tokio::time::timeout(
            config.startup_timeout,
            wait_ready(&mut lines, &mut missing),
        )
        .await;

        let failure = match waited {
            Ok(true) => None,
            Ok(false) => Some(BackendError::ExitedEarly {
                program: config.program.clone(),
                missing,
            }),
            Err(_) => Some(BackendError::StartupTimeout {
                program: config.program.clone(),
                timeout: config.startup_timeout,
                missing,
            }),
        };
        if let Some(err) = failure {
            process.kill().await;
            return Err(err);
        }

        let program = process.program.clone();
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(program = %program, "{}", line);
            }
        });
        info!(program = %process.program, port, "server process ready");
        Ok(process)
    }

    /// OS process id, while running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn kill(&mut self) {
        kill_group(&mut self.child);
        if let Err(e) = self.child.wait().await {
            warn!(program = %self.program, error = %e, "waiting for killed server failed");
        }
    }
}

#[async_trait]
impl ServerHandle for ServerProcess {
    fn port(&self) -> u16 {
        self.port
    }

    async fn stop(mut self: Box<Self>) -> Result<()> {
        self.kill().await;
        info!(program = %self.program, port = self.port, "server process stopped");
        Ok(())
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        kill_group(&mut self.child);
    }
}

/// Read stdout, striking markers off `missing` as they appear. False on EOF
/// with markers left; `missing` stays accurate if the future is dropped.
async fn wait_ready(
    lines: &mut Lines<BufReader<ChildStdout>>,
    missing: &mut Vec<String>,
) -> bool {
    while !missing.is_empty() {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("{}", line);
                missing.retain(|marker| !line.contains(marker.as_str()));
            }
            Ok(None) | Err(_) => return false,
        }
    }
    true
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        // The child leads its own group, so its pid is the group id.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc == 0 {
            return;
        }
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.start_kill();
}
