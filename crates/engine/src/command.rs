// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commands from the control bus to the engine

use fidx_core::{BusError, ModelId};
use std::path::PathBuf;
use tokio::sync::oneshot;

/// Reply to a folder mutation: `Ok` may carry an informational note
pub type CmdReply = oneshot::Sender<Result<Option<String>, BusError>>;

/// Reply to a search routing request
pub type SearchReply = oneshot::Sender<Result<(), BusError>>;

/// A command for the engine loop
#[derive(Debug)]
pub enum EngineCmd {
    /// Start managing a folder (idempotent by path)
    AddFolder {
        path: PathBuf,
        model_id: ModelId,
        reply: CmdReply,
    },

    /// Stop managing a folder and delete its private state
    RemoveFolder { path: PathBuf, reply: CmdReply },

    /// Route a search: ensure the folder's model is hot, at IMMEDIATE
    /// priority. Query execution itself lives outside the daemon.
    Search {
        path: PathBuf,
        query: String,
        limit: usize,
        reply: SearchReply,
    },
}
