// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global folder list.
//!
//! A single JSON document keyed by absolute path, kept in insertion order
//! so `list` is deterministic. Saved atomically (tmp + fsync + rename +
//! directory fsync); a corrupt file on load is rotated to `.bak` and the
//! daemon starts with an empty list rather than refusing to boot.

use crate::StorageError;
use fidx_core::{ModelId, ReservedDir};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// A managed folder as persisted in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub path: PathBuf,
    pub model_id: ModelId,
    pub created_at_epoch_ms: u64,
}

/// Why a folder could not be added
#[derive(Debug, Error)]
pub enum AddError {
    #[error("folder already managed with model {existing_model}")]
    AlreadyExists { existing_model: ModelId },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    folders: IndexMap<PathBuf, FolderRecord>,
}

/// Durable list of managed folders
pub struct FolderRegistry {
    path: PathBuf,
    reserved: ReservedDir,
    folders: IndexMap<PathBuf, FolderRecord>,
}

impl FolderRegistry {
    /// Open the registry at `path` (e.g. `<state_dir>/folders.json`).
    pub fn open(path: &Path, reserved: ReservedDir) -> Result<Self, StorageError> {
        let folders = match Self::load_file(path) {
            Ok(folders) => folders,
            Err(e) => {
                let bak = rotate_bak_path(path);
                warn!(
                    path = %path.display(),
                    bak = %bak.display(),
                    error = %e,
                    "Corrupt folder registry, rotating to .bak and starting empty",
                );
                let _ = fs::rename(path, &bak);
                IndexMap::new()
            }
        };
        Ok(Self { path: path.to_owned(), reserved, folders })
    }

    fn load_file(path: &Path) -> Result<IndexMap<PathBuf, FolderRecord>, StorageError> {
        if !path.exists() {
            return Ok(IndexMap::new());
        }
        let file = File::open(path)?;
        let parsed: RegistryFile = serde_json::from_reader(BufReader::new(file))?;
        Ok(parsed.folders)
    }

    /// All managed folders, in insertion order.
    pub fn list(&self) -> Vec<FolderRecord> {
        self.folders.values().cloned().collect()
    }

    pub fn get(&self, path: &Path) -> Option<&FolderRecord> {
        self.folders.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.folders.contains_key(path)
    }

    /// Register a folder. The path must be absolute and an existing
    /// directory; the managed folder set is flat (no nesting check beyond
    /// exact-path uniqueness).
    pub fn add(
        &mut self,
        path: &Path,
        model_id: ModelId,
        created_at_epoch_ms: u64,
    ) -> Result<FolderRecord, AddError> {
        if !path.is_absolute() {
            return Err(AddError::InvalidPath(format!(
                "{} is not absolute",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(AddError::InvalidPath(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        if let Some(existing) = self.folders.get(path) {
            return Err(AddError::AlreadyExists { existing_model: existing.model_id.clone() });
        }

        let record = FolderRecord { path: path.to_owned(), model_id, created_at_epoch_ms };
        self.folders.insert(path.to_owned(), record.clone());
        self.save()?;
        Ok(record)
    }

    /// Remove a folder and delete its private state directory.
    ///
    /// Returns `false` when the folder was not managed (idempotent remove).
    pub fn remove(&mut self, path: &Path) -> Result<bool, StorageError> {
        // shift_remove keeps the insertion order of the remaining entries
        if self.folders.shift_remove(path).is_none() {
            return Ok(false);
        }
        self.save()?;

        let state_dir = self.reserved.state_dir_for(path);
        if state_dir.exists() {
            fs::remove_dir_all(&state_dir)?;
        }
        Ok(true)
    }

    /// The private state directory for a managed folder
    pub fn state_dir_for(&self, folder: &Path) -> PathBuf {
        self.reserved.state_dir_for(folder)
    }

    /// Persist the folder list atomically.
    fn save(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            let snapshot = RegistryFile { folders: self.folders.clone() };
            serde_json::to_writer(&mut writer, &snapshot)?;
            writer.flush()?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        // Make the rename durable across power loss
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let from = bak(n);
        if from.exists() {
            let _ = fs::rename(&from, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
