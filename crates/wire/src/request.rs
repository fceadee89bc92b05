// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use fidx_core::{ClientKind, ModelId, RequestId};
use serde::{Deserialize, Serialize};

/// Message from a control client to the daemon.
///
/// `connection.init` must be the first message on a connection; anything
/// else gets the connection closed with a protocol error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// Declare the client kind; first message on every connection
    #[serde(rename = "connection.init", rename_all = "camelCase")]
    ConnectionInit { client_kind: ClientKind },

    /// Start managing a folder. Idempotent by path: re-adding with the same
    /// model succeeds, with a different model errors.
    #[serde(rename = "folder.add", rename_all = "camelCase")]
    FolderAdd {
        id: RequestId,
        path: PathBuf,
        model_id: ModelId,
    },

    /// Stop managing a folder and delete its private state directory.
    /// Idempotent: removing an unknown folder succeeds with a note.
    #[serde(rename = "folder.remove")]
    FolderRemove { id: RequestId, path: PathBuf },

    /// Route a semantic search; scheduled at IMMEDIATE priority
    #[serde(rename = "search.request", rename_all = "camelCase")]
    SearchRequest {
        id: RequestId,
        folder_path: PathBuf,
        query: String,
        limit: usize,
    },

    /// Liveness check
    #[serde(rename = "ping")]
    Ping { id: RequestId },

    /// Graceful daemon stop; the reply is sent before the daemon exits
    #[serde(rename = "daemon.shutdown")]
    DaemonShutdown { id: RequestId },
}

impl ClientRequest {
    /// Correlation id, when the message carries one
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            ClientRequest::ConnectionInit { .. } => None,
            ClientRequest::FolderAdd { id, .. }
            | ClientRequest::FolderRemove { id, .. }
            | ClientRequest::SearchRequest { id, .. }
            | ClientRequest::Ping { id }
            | ClientRequest::DaemonShutdown { id } => Some(id),
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
