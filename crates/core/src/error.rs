// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-bus error kinds

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds surfaced to control clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    UnknownFolder,
    FolderAlreadyExists,
    InvalidPath,
    ModelUnavailable,
    WorkerUnavailable,
    IndexStoreCorrupt,
    Internal,
}

/// An error as delivered in a control-bus reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {message}")]
pub struct BusError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BusError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_snake_case() {
        let json = serde_json::to_string(&ErrorKind::FolderAlreadyExists).unwrap();
        assert_eq!(json, "\"folder_already_exists\"");
        let json = serde_json::to_string(&ErrorKind::IndexStoreCorrupt).unwrap();
        assert_eq!(json, "\"index_store_corrupt\"");
    }

    #[test]
    fn bus_error_round_trips() {
        let err = BusError::new(ErrorKind::UnknownFolder, "no such folder");
        let json = serde_json::to_string(&err).unwrap();
        let back: BusError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
