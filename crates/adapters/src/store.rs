// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vector store writer.
//!
//! The physical schema and nearest-neighbour search belong to the store
//! implementation; the daemon only needs durable per-document writes,
//! removals, and a way to enumerate which documents the store knows about
//! so startup can cross-check it against the fingerprint table.

use fidx_core::ModelId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the default store inside a folder's state directory
pub const STORE_FILE: &str = "vectors.json";

/// Errors from vector store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable vector persistence for one folder's state directory.
///
/// `write_document` must be durable (fsynced) when it returns; the engine
/// commits the fingerprint only afterwards.
pub trait VectorStore: Send + Sync + 'static {
    fn write_document(
        &self,
        state_dir: &Path,
        relpath: &Path,
        model_id: &ModelId,
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError>;

    fn remove_document(&self, state_dir: &Path, relpath: &Path) -> Result<(), StoreError>;

    /// Documents the store holds rows for; `None` when the store file is
    /// missing or unreadable.
    fn doc_paths(&self, state_dir: &Path) -> Option<HashSet<PathBuf>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDoc {
    model_id: ModelId,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    docs: HashMap<PathBuf, StoredDoc>,
}

/// Default single-file store implementation
#[derive(Debug, Default, Clone)]
pub struct FileVectorStore;

impl FileVectorStore {
    pub fn new() -> Self {
        Self
    }

    fn load(path: &Path) -> Result<StoreFile, StoreError> {
        match File::open(path) {
            Ok(file) => Ok(serde_json::from_reader(BufReader::new(file))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(path: &Path, store: &StoreFile) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, store)?;
            writer.flush()?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl VectorStore for FileVectorStore {
    fn write_document(
        &self,
        state_dir: &Path,
        relpath: &Path,
        model_id: &ModelId,
        vectors: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        let path = state_dir.join(STORE_FILE);
        let mut store = Self::load(&path)?;
        store.docs.insert(
            relpath.to_owned(),
            StoredDoc { model_id: model_id.clone(), vectors: vectors.to_vec() },
        );
        Self::save(&path, &store)
    }

    fn remove_document(&self, state_dir: &Path, relpath: &Path) -> Result<(), StoreError> {
        let path = state_dir.join(STORE_FILE);
        let mut store = Self::load(&path)?;
        if store.docs.remove(relpath).is_some() {
            Self::save(&path, &store)?;
        }
        Ok(())
    }

    fn doc_paths(&self, state_dir: &Path) -> Option<HashSet<PathBuf>> {
        let path = state_dir.join(STORE_FILE);
        let file = File::open(&path).ok()?;
        let store: StoreFile = serde_json::from_reader(BufReader::new(file)).ok()?;
        Some(store.docs.into_keys().collect())
    }
}
