// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State directory and socket resolution, mirroring the daemon's rules.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// FIDX_STATE_DIR > XDG_STATE_HOME/fidx > ~/.local/state/fidx
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FIDX_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("fidx"));
    }
    let home = std::env::var("HOME").context("neither FIDX_STATE_DIR nor HOME is set")?;
    Ok(PathBuf::from(home).join(".local/state/fidx"))
}

pub fn socket_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("fidxd.sock"))
}
