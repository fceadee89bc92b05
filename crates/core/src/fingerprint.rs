// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document fingerprints and scan change sets

use crate::model::ModelId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Content-derived identity of one file inside a managed folder.
///
/// Two fingerprints are equal iff (content hash, model id) match; size and
/// mtime are hints the change detector uses to skip hashing, never identity.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    /// Path relative to the folder root
    pub relpath: PathBuf,
    /// Hex-encoded SHA-256 of the file content
    pub content_hash: String,
    pub size: u64,
    pub mtime_epoch_ms: u64,
    /// Model used at last embed
    pub model_id: ModelId,
}

impl PartialEq for DocumentFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash && self.model_id == other.model_id
    }
}

impl DocumentFingerprint {
    /// Whether (size, mtime) both match — the only case where hashing may
    /// be skipped during change detection.
    pub fn hints_match(&self, size: u64, mtime_epoch_ms: u64) -> bool {
        self.size == size && self.mtime_epoch_ms == mtime_epoch_ms
    }
}

/// Disjoint result of comparing the on-disk tree against stored fingerprints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// On-disk paths with no stored fingerprint
    pub added: Vec<PathBuf>,
    /// On-disk paths whose content hash or model id differs from stored
    pub modified: Vec<PathBuf>,
    /// Stored paths absent on disk
    pub removed: Vec<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Documents that need (re-)embedding
    pub fn work_count(&self) -> usize {
        self.added.len() + self.modified.len()
    }
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
