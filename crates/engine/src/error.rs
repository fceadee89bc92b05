// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type

use fidx_core::{BusError, ErrorKind};
use thiserror::Error;

/// Errors from engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("folder is not managed: {0}")]
    UnknownFolder(String),

    #[error("folder already managed with model {existing}")]
    AlreadyExists { existing: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("model not in curated catalog: {0}")]
    ModelUnavailable(String),

    #[error("no embedder worker available: {0}")]
    WorkerUnavailable(String),

    #[error(transparent)]
    Storage(#[from] fidx_storage::StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Translate to the control-bus error surface
    pub fn into_bus_error(self) -> BusError {
        let kind = match &self {
            EngineError::UnknownFolder(_) => ErrorKind::UnknownFolder,
            EngineError::AlreadyExists { .. } => ErrorKind::FolderAlreadyExists,
            EngineError::InvalidPath(_) => ErrorKind::InvalidPath,
            EngineError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            EngineError::WorkerUnavailable(_) => ErrorKind::WorkerUnavailable,
            EngineError::Storage(_) | EngineError::Internal(_) => ErrorKind::Internal,
        };
        BusError::new(kind, self.to_string())
    }
}
