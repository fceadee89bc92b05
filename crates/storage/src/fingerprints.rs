// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-folder fingerprint table.
//!
//! An append-only JSONL log inside the folder's private state directory.
//! Each line is an upsert or a tombstone keyed by relative path; a commit
//! is one appended line plus fsync, which makes the per-document upsert
//! atomic: after a crash either the previous record or the new one is
//! observable, never a partial row. The log is compacted in place (tmp +
//! rename) once dead records outnumber live ones.

use crate::StorageError;
use fidx_core::DocumentFingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// File name of the fingerprint log inside the state directory
pub const FINGERPRINTS_FILE: &str = "fingerprints.jsonl";

/// Compaction is considered once this many dead records accumulate
const COMPACT_MIN_DEAD: usize = 16;

#[derive(Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Record {
    Put { fingerprint: DocumentFingerprint },
    Del { relpath: PathBuf },
}

/// Whether a folder's durable state can be trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryHealth {
    Ok,
    /// The folder must be re-indexed from scratch
    NeedsRebuild { reason: String },
}

/// Durable map of relative path → fingerprint for one folder
pub struct FingerprintTable {
    path: PathBuf,
    file: File,
    entries: HashMap<PathBuf, DocumentFingerprint>,
    /// Superseded and tombstone records still occupying log lines
    dead: usize,
}

impl FingerprintTable {
    /// Open (or create) the fingerprint table in `state_dir`.
    pub fn open(state_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join(FINGERPRINTS_FILE);

        let (entries, dead, corrupt_from) = Self::scan(&path)?;
        if let Some(offset) = corrupt_from {
            // Preserve what parsed, rotate the damaged log aside.
            let bak = path.with_extension("jsonl.bak");
            warn!(
                path = %path.display(),
                offset,
                valid = entries.len(),
                "Corrupt fingerprint log, rotating to .bak and keeping valid prefix",
            );
            let _ = fs::rename(&path, &bak);
            Self::rewrite(&path, &entries)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file, entries, dead })
    }

    /// Scan the log, returning (live entries, dead count, corruption offset).
    fn scan(
        path: &Path,
    ) -> Result<(HashMap<PathBuf, DocumentFingerprint>, usize, Option<u64>), StorageError> {
        let mut entries = HashMap::new();
        let mut dead = 0usize;

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((entries, 0, None));
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut offset = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    return Ok((entries, dead, Some(offset)));
                }
                Err(e) => return Err(e.into()),
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                offset += bytes_read as u64;
                continue;
            }

            // A torn final line (crash mid-append) parses as garbage; stop
            // at the first unparseable record either way.
            let record: Record = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(_) => return Ok((entries, dead, Some(offset))),
            };

            match record {
                Record::Put { fingerprint } => {
                    if entries.insert(fingerprint.relpath.clone(), fingerprint).is_some() {
                        dead += 1;
                    }
                }
                Record::Del { relpath } => {
                    if entries.remove(&relpath).is_some() {
                        dead += 1;
                    }
                    dead += 1;
                }
            }
            offset += bytes_read as u64;
        }

        Ok((entries, dead, None))
    }

    fn rewrite(path: &Path, entries: &HashMap<PathBuf, DocumentFingerprint>) -> Result<(), StorageError> {
        // The state directory may have been deleted out from under us
        // (corruption recovery); recreate it rather than failing the rewrite.
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file = File::create(&tmp)?;
            for fingerprint in entries.values() {
                let record = Record::Put { fingerprint: fingerprint.clone() };
                serde_json::to_writer(&mut file, &record)?;
                file.write_all(b"\n")?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Number of live fingerprints
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relpath: &Path) -> Option<&DocumentFingerprint> {
        self.entries.get(relpath)
    }

    /// Clone of the live map, for the change detector
    pub fn snapshot(&self) -> HashMap<PathBuf, DocumentFingerprint> {
        self.entries.clone()
    }

    pub fn relpaths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    /// Atomic per-document upsert: append one record and fsync.
    ///
    /// Only called after the vector-store write for the same document has
    /// been made durable; that sequencing keeps the table and the store
    /// reconcilable after a crash.
    pub fn commit(&mut self, fingerprint: DocumentFingerprint) -> Result<(), StorageError> {
        let record = Record::Put { fingerprint: fingerprint.clone() };
        self.append(&record)?;
        if self.entries.insert(fingerprint.relpath.clone(), fingerprint).is_some() {
            self.dead += 1;
        }
        self.maybe_compact()
    }

    /// Atomic delete: append a tombstone and fsync.
    pub fn forget(&mut self, relpath: &Path) -> Result<(), StorageError> {
        if !self.entries.contains_key(relpath) {
            return Ok(());
        }
        let record = Record::Del { relpath: relpath.to_owned() };
        self.append(&record)?;
        self.entries.remove(relpath);
        self.dead += 2;
        self.maybe_compact()
    }

    fn append(&mut self, record: &Record) -> Result<(), StorageError> {
        let mut bytes = serde_json::to_vec(record)?;
        bytes.push(b'\n');
        self.file.write_all(&bytes)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn maybe_compact(&mut self) -> Result<(), StorageError> {
        if self.dead < COMPACT_MIN_DEAD || self.dead <= self.entries.len() {
            return Ok(());
        }
        Self::rewrite(&self.path, &self.entries)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.dead = 0;
        Ok(())
    }

    /// Drop every fingerprint and rewrite an empty log.
    ///
    /// Used when a folder is forced into a full rebuild: stale rows must
    /// not survive into the fresh index.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        Self::rewrite(&self.path, &self.entries)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.dead = 0;
        Ok(())
    }

    /// Cross-check the table against the set of documents the vector store
    /// knows about. `None` means the store is missing or unreadable.
    pub fn verify_store(&self, store_docs: Option<&HashSet<PathBuf>>) -> RegistryHealth {
        match store_docs {
            None => {
                if self.entries.is_empty() {
                    RegistryHealth::Ok
                } else {
                    RegistryHealth::NeedsRebuild {
                        reason: "vector store missing or unreadable".to_string(),
                    }
                }
            }
            Some(docs) => {
                let table: HashSet<&PathBuf> = self.entries.keys().collect();
                let store: HashSet<&PathBuf> = docs.iter().collect();
                if table == store {
                    RegistryHealth::Ok
                } else {
                    RegistryHealth::NeedsRebuild {
                        reason: "fingerprint table and vector store disagree".to_string(),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "fingerprints_tests.rs"]
mod tests;
