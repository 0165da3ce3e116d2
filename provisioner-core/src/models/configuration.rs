//! Configuration data structures

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Verbosity of the `provisioner` tracing targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// Path of the JSON instance store
    pub store_path: PathBuf,
    /// Maximum number of tasks executing at once
    pub worker_count: usize,
    /// Upper bound on a single step execution (None = unbounded)
    pub step_timeout_seconds: Option<u64>,
    /// Exit code used when a failure cannot be recorded
    pub double_fault_exit_code: i32,
}

impl Default for Configuration {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            log_level: LogLevel::Info,
            store_path: home.join(".provisioner").join("instances.json"),
            worker_count: 4,
            step_timeout_seconds: None,
            double_fault_exit_code: 70, // EX_SOFTWARE
        }
    }
}

impl Configuration {
    /// Read a TOML configuration file; a missing file yields the defaults
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Configuration::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// `<config dir>/provisioner/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("no user configuration directory"))?;
        Ok(config_dir.join("provisioner").join("config.toml"))
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_seconds.map(Duration::from_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.worker_count == 0 || self.worker_count > 256 {
            errors.push("worker_count must be between 1 and 256".to_string());
        }

        if let Some(timeout) = self.step_timeout_seconds {
            if timeout == 0 || timeout > 3600 {
                errors.push("step_timeout_seconds must be between 1 and 3600".to_string());
            }
        }

        if self.double_fault_exit_code == 0 {
            errors.push("double_fault_exit_code must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
