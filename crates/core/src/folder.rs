// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Managed folder model and lifecycle states

use crate::model::ModelId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a managed folder.
///
/// Transitions are driven exclusively by the orchestrator:
/// pending → scanning → ready → indexing → active, with error reachable
/// from scanning/indexing, scanning re-entered on watcher dirt, and gone
/// terminal after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderState {
    Pending,
    Scanning,
    Ready,
    Indexing,
    Active,
    Error,
    Gone,
}

impl FolderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FolderState::Gone)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FolderState::Pending => "pending",
            FolderState::Scanning => "scanning",
            FolderState::Ready => "ready",
            FolderState::Indexing => "indexing",
            FolderState::Active => "active",
            FolderState::Error => "error",
            FolderState::Gone => "gone",
        }
    }
}

impl fmt::Display for FolderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a folder notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Error,
    Warning,
    Info,
}

/// User-visible message attached to a folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: NotificationKind::Error, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { kind: NotificationKind::Warning, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { kind: NotificationKind::Info, message: message.into() }
    }
}

/// A managed folder as tracked by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Absolute path; unique key
    pub path: PathBuf,
    /// Model selected for this folder
    pub model_id: ModelId,
    pub state: FolderState,
    /// 0–100; meaningful only during scanning/indexing
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    #[serde(default)]
    pub created_at_epoch_ms: u64,
}

impl Folder {
    pub fn new(path: PathBuf, model_id: ModelId, created_at_epoch_ms: u64) -> Self {
        Self {
            path,
            model_id,
            state: FolderState::Pending,
            progress: 0,
            notification: None,
            created_at_epoch_ms,
        }
    }
}

#[cfg(test)]
#[path = "folder_tests.rs"]
mod tests;
