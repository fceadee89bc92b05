// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fidx-storage: the persistent folder registry.
//!
//! Two durable structures: the global folder list (`folders.json` in the
//! daemon state dir) and one fingerprint table per managed folder, living
//! inside that folder's private state directory next to its vector store.

mod fingerprints;
mod registry;

pub use fingerprints::{FingerprintTable, RegistryHealth};
pub use registry::{AddError, FolderRecord, FolderRegistry};

use thiserror::Error;

/// Errors from durable storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
