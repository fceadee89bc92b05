// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: FIDX_STATE_DIR > XDG_STATE_HOME/fidx > ~/.local/state/fidx
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("FIDX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("fidx"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/fidx"))
}

/// Timer check interval override (default: 1000ms)
pub fn timer_check_interval() -> Duration {
    std::env::var("FIDX_TIMER_CHECK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

/// IPC read/write timeout override
pub fn ipc_timeout() -> Duration {
    std::env::var("FIDX_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(fidx_wire::DEFAULT_TIMEOUT)
}

/// Embedder worker command override (whitespace-separated)
pub fn embedder_cmd() -> Option<Vec<String>> {
    let raw = std::env::var("FIDX_EMBEDDER_CMD").ok()?;
    let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}
