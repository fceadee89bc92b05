// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Every timer and bound the engine consumes lives here as a plain field so
//! tests can construct a config with arbitrary values. The daemon loads an
//! optional TOML file and applies env overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// File-watch debounce settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatcherConfig {
    /// Quiescence window W before a dirty folder is reported (ms)
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000 }
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Upper bound on debounce extension under a continuous burst (5×W)
    pub fn debounce_cap(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.saturating_mul(5))
    }
}

/// Embedder worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Keep-alive window K: how long the loaded model is retained after the
    /// last interactive request (seconds)
    pub keep_alive_seconds: u64,
    /// Agent-active window A: how long background admission stays paused
    /// after an immediate request (seconds)
    pub agent_active_seconds: u64,
    /// Grace period before force-terminating workers on shutdown (seconds)
    pub shutdown_grace_period_seconds: u64,
    /// Respawn dead workers automatically
    pub auto_restart: bool,
    /// Restart attempts before a worker is given up on
    pub max_restart_attempts: u32,
    /// Delay between kill and respawn (ms)
    pub restart_delay_ms: u64,
    /// Health probe cadence (ms)
    pub health_probe_ms: u64,
    /// Per-request deadline for worker calls (ms)
    pub request_timeout_ms: u64,
    /// Number of worker processes (one model resident per worker)
    pub pool_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            keep_alive_seconds: 180,
            agent_active_seconds: 180,
            shutdown_grace_period_seconds: 30,
            auto_restart: true,
            max_restart_attempts: 3,
            restart_delay_ms: 1000,
            health_probe_ms: 10_000,
            request_timeout_ms: 60_000,
            pool_size: 1,
        }
    }
}

impl WorkerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    pub fn agent_active(&self) -> Duration {
        Duration::from_secs(self.agent_active_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_seconds)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn health_probe(&self) -> Duration {
        Duration::from_millis(self.health_probe_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Task scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on in-flight tasks across all folders
    pub max_concurrent_tasks: usize,
    /// Pending-queue bound per folder; overflow throttles discovery
    pub folder_queue_limit: usize,
    /// Bounded retries for failed background embed tasks
    pub background_retry_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
            folder_queue_limit: 1024,
            background_retry_limit: 3,
        }
    }
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Daemon state directory (folder list, models catalog, logs, socket)
    pub state_dir: PathBuf,
    /// Name of the per-folder private state directory. Opaque single unit:
    /// joined to the folder root verbatim, always excluded from scans.
    pub reserved_dir: ReservedDir,
    /// Command line used to spawn an embedder worker process
    pub embedder_cmd: Vec<String>,
    /// Scan include globs (empty = everything)
    pub include: Vec<String>,
    /// Scan exclude globs
    pub exclude: Vec<String>,
    pub watcher: WatcherConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
}

impl DaemonConfig {
    /// Load from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("fidxd.sock")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("fidxd.lock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("fidxd.log")
    }

    pub fn folders_path(&self) -> PathBuf {
        self.state_dir.join("folders.json")
    }

    pub fn models_path(&self) -> PathBuf {
        self.state_dir.join("models.toml")
    }
}

/// Reserved per-folder state directory name.
///
/// Wrapped so callers cannot accidentally treat it as a path fragment with
/// separators; validation rejects anything that is not a single component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReservedDir(String);

impl ReservedDir {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The private state directory for a managed folder
    pub fn state_dir_for(&self, folder: &Path) -> PathBuf {
        folder.join(&self.0)
    }
}

impl Default for ReservedDir {
    fn default() -> Self {
        Self(".fidx".to_string())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
