// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Change detection: compare the on-disk tree against stored fingerprints.
//!
//! The detector is a pure reporter — it never mutates the registry. Content
//! hash is authoritative; (size, mtime) equality is only a licence to skip
//! hashing. A file whose mtime changed but whose hash matches is not
//! modified.

use fidx_core::{ChangeSet, DocumentFingerprint, ModelId, ReservedDir};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from a scan walk
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("scan cancelled")]
    Cancelled,
}

/// Include/exclude policy for the walk.
///
/// Patterns match the path relative to the folder root; the reserved state
/// directory is always excluded regardless of policy.
#[derive(Clone)]
pub struct ScanPolicy {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
    reserved: String,
}

impl ScanPolicy {
    pub fn new(
        include: &[String],
        exclude: &[String],
        reserved: &ReservedDir,
    ) -> Result<Self, DetectorError> {
        let compile = |patterns: &[String]| -> Result<Vec<glob::Pattern>, glob::PatternError> {
            patterns.iter().map(|p| glob::Pattern::new(p)).collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            reserved: reserved.as_str().to_string(),
        })
    }

    /// Directories are only pruned by the reserved name and excludes;
    /// include patterns apply to files.
    fn admits_dir(&self, relpath: &Path) -> bool {
        if relpath
            .components()
            .any(|c| c.as_os_str().to_string_lossy() == self.reserved)
        {
            return false;
        }
        let text = relpath.to_string_lossy();
        !self.exclude.iter().any(|p| p.matches(&text))
    }

    fn admits_file(&self, relpath: &Path) -> bool {
        if !self.admits_dir(relpath) {
            return false;
        }
        let text = relpath.to_string_lossy();
        self.include.is_empty() || self.include.iter().any(|p| p.matches(&text))
    }
}

/// Hash a file's content, returning (hex sha256, size, mtime epoch ms).
pub(crate) fn hash_file(path: &Path) -> std::io::Result<(String, u64, u64)> {
    let metadata = fs::metadata(path)?;
    let content = fs::read(path)?;
    let hash = format!("{:x}", Sha256::digest(&content));
    Ok((hash, metadata.len(), mtime_epoch_ms(&metadata)))
}

pub(crate) fn mtime_epoch_ms(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Walk `root` and diff it against `stored`, producing disjoint
/// added/modified/removed sets plus the number of files examined.
pub fn detect_changes(
    root: &Path,
    policy: &ScanPolicy,
    stored: &HashMap<PathBuf, DocumentFingerprint>,
    model_id: &ModelId,
    cancel: &CancellationToken,
) -> Result<(ChangeSet, usize), DetectorError> {
    let mut changes = ChangeSet::default();
    let mut seen: Vec<PathBuf> = Vec::new();
    let mut examined = 0usize;

    walk(root, root, policy, cancel, &mut |relpath, abspath| {
        examined += 1;
        seen.push(relpath.to_owned());

        let Some(fingerprint) = stored.get(relpath) else {
            changes.added.push(relpath.to_owned());
            return Ok(());
        };

        // A different selected model invalidates every document outright.
        if &fingerprint.model_id != model_id {
            changes.modified.push(relpath.to_owned());
            return Ok(());
        }

        let metadata = fs::metadata(abspath).map_err(|e| DetectorError::Io {
            path: abspath.to_owned(),
            source: e,
        })?;
        if fingerprint.hints_match(metadata.len(), mtime_epoch_ms(&metadata)) {
            return Ok(());
        }

        let (hash, _, _) = hash_file(abspath).map_err(|e| DetectorError::Io {
            path: abspath.to_owned(),
            source: e,
        })?;
        if hash != fingerprint.content_hash {
            changes.modified.push(relpath.to_owned());
        }
        Ok(())
    })?;

    for relpath in stored.keys() {
        if !seen.contains(relpath) {
            changes.removed.push(relpath.clone());
        }
    }

    changes.added.sort();
    changes.modified.sort();
    changes.removed.sort();
    Ok((changes, examined))
}

fn walk(
    root: &Path,
    dir: &Path,
    policy: &ScanPolicy,
    cancel: &CancellationToken,
    visit: &mut impl FnMut(&Path, &Path) -> Result<(), DetectorError>,
) -> Result<(), DetectorError> {
    if cancel.is_cancelled() {
        return Err(DetectorError::Cancelled);
    }

    let entries = fs::read_dir(dir).map_err(|e| DetectorError::Io {
        path: dir.to_owned(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| DetectorError::Io { path: dir.to_owned(), source: e })?;
        let path = entry.path();
        let Ok(relpath) = path.strip_prefix(root) else {
            continue;
        };

        let file_type = entry.file_type().map_err(|e| DetectorError::Io {
            path: path.clone(),
            source: e,
        })?;
        if file_type.is_dir() {
            if policy.admits_dir(relpath) {
                walk(root, &path, policy, cancel, visit)?;
            }
        } else if file_type.is_file() && policy.admits_file(relpath) {
            visit(relpath, &path)?;
        }
        // Symlinks are skipped: following them could escape the folder root.
    }
    Ok(())
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod tests;
