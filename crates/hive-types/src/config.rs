//! Configuration for the controller side of the bridge.
//!
//! [`BridgeConfig`] is loaded from `hive.toml` (or built from defaults) and
//! controls where the per-session listener binds, which executor program is
//! spawned, and the timeouts applied to requests, connection setup and
//! shutdown.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::HiveError;

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "hive.toml";

/// Where the per-session WebSocket listener binds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListenConfig {
    /// Host or IP the listener binds and the executor connects back to.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port; `0` picks a free port per session.
    #[serde(default)]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

/// How the executor process is launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Executable to run (resolved through `PATH` when not absolute).
    #[serde(default = "default_program")]
    pub program: PathBuf,
    /// Arguments placed before the controller address, which is always last.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("hive-executor")
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Seconds a request may stay unanswered; `0` waits forever.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Seconds to wait for the executor to connect back.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Milliseconds between SIGTERM and SIGKILL when stopping the executor.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    2000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
            listen: ListenConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, HiveError> {
        toml::from_str(content).map_err(|e| HiveError::ConfigError(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, HiveError> {
        toml::to_string_pretty(self).map_err(|e| HiveError::ConfigError(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, HiveError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HiveError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Request timeout, `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
