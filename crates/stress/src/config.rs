//! Soak driver configuration via `kvsoak.toml`.
//!
//! Every setting has a default, so a missing file is the same as an empty
//! one. Command-line flags override file values after loading.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kvsoak_backend::ProcessConfig;
use kvsoak_transport::ClientConfig;

use crate::error::ConfigError;
use crate::watchdog::HangAction;

/// Config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "kvsoak.toml";

/// Where servers come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// In-process loopback server over an in-memory store.
    Loopback,
    /// External server program, one process per server.
    Process,
}

/// Server launch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub mode: ServerMode,
    /// Host clients connect to.
    pub host: String,
    /// First port handed to scenarios; each scenario takes the next one.
    /// `0` asks the OS for a free port per scenario.
    pub base_port: u16,
    /// Server program (`process` mode).
    pub program: Option<String>,
    /// Program arguments; `{port}` is replaced by the scenario's port.
    pub args: Vec<String>,
    /// Stdout substrings that together mean the server and its store are up.
    pub ready_markers: Vec<String>,
    /// Bound on one server start. Must stay below `watchdog_ms`, since
    /// servers start inside supervised setups and iterations.
    pub startup_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            mode: ServerMode::Loopback,
            host: "127.0.0.1".to_string(),
            base_port: 4100,
            program: None,
            args: Vec::new(),
            ready_markers: Vec::new(),
            startup_timeout_ms: 20_000,
        }
    }
}

/// Client timing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2_000,
            request_timeout_ms: 10_000,
            min_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

/// Bounded retry used by the reconnect cycle while waiting for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            attempts: 20,
            delay_ms: 250,
        }
    }
}

/// Address the never-connected scenario points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnreachableSettings {
    pub host: String,
    pub port: u16,
}

impl Default for UnreachableSettings {
    fn default() -> Self {
        Self {
            host: "backend.invalid".to_string(),
            port: 4099,
        }
    }
}

/// Introspection server bind address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrospectionSettings {
    pub host: String,
    pub port: u16,
}

impl Default for IntrospectionSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9080,
        }
    }
}

/// Soak driver configuration loaded from `kvsoak.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Per-iteration budget before the watchdog fires.
    pub watchdog_ms: u64,
    /// `"abort"` (core dump) or `"exit"`.
    pub hang_action: String,
    /// Base log level; `RUST_LOG` wins when set.
    pub log_level: String,
    /// Stop each command after this many iterations. Unset means forever.
    pub iterations: Option<u64>,
    pub introspection: IntrospectionSettings,
    pub server: ServerSettings,
    pub client: ClientSettings,
    pub reconnect: ReconnectSettings,
    pub unreachable: UnreachableSettings,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            watchdog_ms: 30_000,
            hang_action: "abort".to_string(),
            log_level: "info".to_string(),
            iterations: None,
            introspection: IntrospectionSettings::default(),
            server: ServerSettings::default(),
            client: ClientSettings::default(),
            reconnect: ReconnectSettings::default(),
            unreachable: UnreachableSettings::default(),
        }
    }
}

impl StressConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# kvsoak soak driver configuration

# Budget for one iteration of any command, in milliseconds.
watchdog_ms = 30000

# What to do when an iteration overruns its budget:
#   "abort" = abort the process and leave a core dump (default)
#   "exit"  = exit with status 70, for hosts without core dumps
hang_action = "abort"

# Base log level. RUST_LOG overrides this when set.
log_level = "info"

# Stop every command after this many iterations. Unset = run until killed.
# iterations = 1000

[introspection]
host = "127.0.0.1"
port = 9080

[server]
# "loopback" = in-process server over an in-memory store
# "process"  = launch `program` once per server
mode = "loopback"
host = "127.0.0.1"
base_port = 4100
# program = "kvstore-server"
# args = ["--port", "{port}"]
# ready_markers = ["rpc server listening", "store ready"]
# Must be below watchdog_ms.
startup_timeout_ms = 20000

[client]
connect_timeout_ms = 2000
request_timeout_ms = 10000
min_backoff_ms = 100
max_backoff_ms = 2000

# Reconnect cycle: how long to keep pinging a fresh server.
[reconnect]
attempts = 20
delay_ms = 250

# Never-connected scenario target.
[unreachable]
host = "backend.invalid"
port = 4099
"#
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: StressConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog_ms == 0 {
            return Err(ConfigError::Invalid("watchdog_ms must be positive".into()));
        }
        self.parsed_hang_action()?;
        if self.reconnect.attempts == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.attempts must be at least 1".into(),
            ));
        }
        if self.client.min_backoff_ms > self.client.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "client.min_backoff_ms ({}) exceeds client.max_backoff_ms ({})",
                self.client.min_backoff_ms, self.client.max_backoff_ms
            )));
        }
        if self.server.mode == ServerMode::Process && self.server.program.is_none() {
            return Err(ConfigError::Invalid(
                "server.mode = \"process\" requires server.program".into(),
            ));
        }
        if self.server.mode == ServerMode::Process
            && self.server.startup_timeout_ms >= self.watchdog_ms
        {
            return Err(ConfigError::Invalid(format!(
                "server.startup_timeout_ms ({}) must be below watchdog_ms ({})",
                self.server.startup_timeout_ms, self.watchdog_ms
            )));
        }
        self.introspection_addr()?;
        Ok(())
    }

    pub fn watchdog_budget(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }

    /// Parse `hang_action`.
    pub fn parsed_hang_action(&self) -> Result<HangAction, ConfigError> {
        HangAction::from_name(&self.hang_action).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unknown hang_action '{}'. Expected \"abort\" or \"exit\".",
                self.hang_action
            ))
        })
    }

    pub fn introspection_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.introspection.host.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "introspection.host '{}' is not an IP address",
                self.introspection.host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.introspection.port))
    }

    /// Client settings for a server on `port`.
    pub fn client_config(&self, port: u16) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.client.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.client.request_timeout_ms),
            min_backoff: Duration::from_millis(self.client.min_backoff_ms),
            max_backoff: Duration::from_millis(self.client.max_backoff_ms),
            ..ClientConfig::new(self.server.host.clone(), port)
        }
    }

    /// Launch settings for `process` mode.
    pub fn process_config(&self) -> Option<ProcessConfig> {
        let program = self.server.program.as_ref()?;
        let mut config = ProcessConfig::new(program.clone());
        config.args = self.server.args.clone();
        config.ready_markers = self.server.ready_markers.clone();
        config.startup_timeout = Duration::from_millis(self.server.startup_timeout_ms);
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_to_defaults() {
        let parsed: StressConfig = toml::from_str(StressConfig::default_toml()).unwrap();
        assert_eq!(parsed, StressConfig::default());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StressConfig::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config.watchdog_ms, 30_000);
        assert_eq!(config.introspection.port, 9080);
        assert_eq!(config.reconnect, ReconnectSettings::default());
    }

    #[test]
    fn write_default_does_not_clobber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "watchdog_ms = 5000\n").unwrap();
        StressConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(StressConfig::from_file(&path).unwrap().watchdog_ms, 5000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[reconnect]\nattempts = 3\n").unwrap();
        let config = StressConfig::from_file(&path).unwrap();
        assert_eq!(config.reconnect.attempts, 3);
        assert_eq!(config.reconnect.delay_ms, 250);
        assert_eq!(config.server.mode, ServerMode::Loopback);
    }

    #[test]
    fn bad_values_are_rejected_eagerly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "hang_action = \"reboot\"\n").unwrap();
        assert!(matches!(
            StressConfig::from_file(&path),
            Err(ConfigError::Invalid(_))
        ));

        std::fs::write(&path, "[server]\nmode = \"process\"\n").unwrap();
        assert!(matches!(
            StressConfig::from_file(&path),
            Err(ConfigError::Invalid(_))
        ));

        std::fs::write(&path, "watchdog_ms = \"soon\"\n").unwrap();
        assert!(matches!(
            StressConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn process_config_carries_server_settings() {
        let mut config = StressConfig::default();
        config.server.mode = ServerMode::Process;
        config.server.program = Some("kvstore-server".into());
        config.server.args = vec!["--port".into(), "{port}".into()];
        config.server.ready_markers = vec!["ready".into()];
        config.validate().unwrap();

        let process = config.process_config().unwrap();
        assert_eq!(process.args_for(4101), vec!["--port", "4101"]);
        assert_eq!(process.ready_markers, vec!["ready"]);
    }

    #[test]
    fn startup_timeout_must_fit_inside_the_watchdog() {
        let mut config = StressConfig::default();
        config.server.mode = ServerMode::Process;
        config.server.program = Some("kvstore-server".into());
        config.validate().unwrap();

        config.server.startup_timeout_ms = config.watchdog_ms;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("startup_timeout_ms"), "{}", err);

        // Loopback servers never wait on startup_timeout.
        config.server.mode = ServerMode::Loopback;
        config.validate().unwrap();
    }

    #[test]
    fn client_config_uses_server_host() {
        let config = StressConfig::default();
        let client = config.client_config(4102);
        assert_eq!(client.address(), "127.0.0.1:4102");
        assert_eq!(client.connect_timeout, Duration::from_secs(2));
    }
}
