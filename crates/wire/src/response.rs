// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use fidx_core::{BusError, Fmdm, RequestId};
use serde::{Deserialize, Serialize};

/// Message from the daemon to a control client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonMessage {
    /// Connection accepted after a valid `connection.init`
    #[serde(rename = "connection.ack")]
    ConnectionAck,

    /// A fresh FMDM snapshot; emitted on every publish
    #[serde(rename = "fmdm.update")]
    FmdmUpdate { fmdm: Fmdm },

    /// Per-request outcome, correlated by the client-chosen id
    #[serde(rename = "reply")]
    Reply {
        id: RequestId,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<BusError>,
        /// Informational note on success (e.g. "not present" for an
        /// idempotent remove of an unknown folder)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },

    /// Protocol-level violation; the connection is closed after this
    #[serde(rename = "error")]
    Error { message: String },
}

impl DaemonMessage {
    pub fn ok(id: RequestId) -> Self {
        DaemonMessage::Reply { id, ok: true, error: None, note: None }
    }

    pub fn ok_with_note(id: RequestId, note: impl Into<String>) -> Self {
        DaemonMessage::Reply { id, ok: true, error: None, note: Some(note.into()) }
    }

    pub fn err(id: RequestId, error: BusError) -> Self {
        DaemonMessage::Reply { id, ok: false, error: Some(error), note: None }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
