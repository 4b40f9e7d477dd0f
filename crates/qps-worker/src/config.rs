//! Worker configuration.

use std::fs;
use std::path::{Path, PathBuf};

use qps_protocol::{DEFAULT_DRIVER_PORT, DEFAULT_SERVER_PORT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("driver port and server port are both {0}")]
    PortConflict(u16),
}

/// Worker configuration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address both the driver listener and servers-under-test bind to.
    pub bind_address: String,
    /// Port the driver connects to.
    pub driver_port: u16,
    /// Fixed port for every server-under-test this worker starts. 0 lets each
    /// server pick a free port; statuses report the one it bound.
    pub server_port: u16,
    /// Abort the process when a driver sends a client or server kind this
    /// build does not know. Only safe when drivers and workers are deployed
    /// in version lock-step.
    pub strict_kinds: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            driver_port: DEFAULT_DRIVER_PORT,
            server_port: DEFAULT_SERVER_PORT,
            strict_kinds: false,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check for settings the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Port 0 on both sides means "pick any", which never collides
        if self.driver_port != 0 && self.driver_port == self.server_port {
            return Err(ConfigError::PortConflict(self.driver_port));
        }
        Ok(())
    }

    /// Address the driver listener binds to.
    pub fn driver_addr(&self) -> (String, u16) {
        (self.bind_address.clone(), self.driver_port)
    }
}
