// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Folder–Model Data Model (FMDM).
//!
//! The FMDM is the authoritative, broadcast-only snapshot of daemon state.
//! Snapshots are immutable values; the broadcaster produces a fresh one per
//! mutation and every subscriber sees snapshots whole and in the same order.

use crate::folder::{Folder, FolderState, Notification};
use crate::model::{CuratedModel, ModelId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Declared kind of a control-bus client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Interactive,
    Cli,
    Automation,
}

/// A connected client as published in the FMDM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub kind: ClientKind,
}

/// Daemon identity published in the FMDM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonIdentity {
    pub pid: u32,
    /// RFC 3339 start timestamp
    pub started_at: String,
}

/// Public view of one managed folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderView {
    pub path: PathBuf,
    pub model_id: ModelId,
    pub state: FolderState,
    /// Meaningful only during scanning/indexing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

impl From<&Folder> for FolderView {
    fn from(folder: &Folder) -> Self {
        let progress = match folder.state {
            FolderState::Scanning | FolderState::Indexing | FolderState::Active => {
                Some(folder.progress)
            }
            _ => None,
        };
        Self {
            path: folder.path.clone(),
            model_id: folder.model_id.clone(),
            state: folder.state,
            progress,
            notification: folder.notification.clone(),
        }
    }
}

/// One immutable FMDM snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fmdm {
    pub folders: Vec<FolderView>,
    pub curated_models: Vec<CuratedModel>,
    pub daemon: DaemonIdentity,
    pub clients: Vec<ClientInfo>,
}

impl Fmdm {
    pub fn new(daemon: DaemonIdentity, curated_models: Vec<CuratedModel>) -> Self {
        Self {
            folders: Vec::new(),
            curated_models,
            daemon,
            clients: Vec::new(),
        }
    }

    pub fn folder(&self, path: &std::path::Path) -> Option<&FolderView> {
        self.folders.iter().find(|f| f.path == path)
    }
}

#[cfg(test)]
#[path = "fmdm_tests.rs"]
mod tests;
