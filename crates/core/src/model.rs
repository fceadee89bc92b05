// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Curated model catalog.
//!
//! Model identifiers are opaque strings; the daemon neither parses nor
//! normalizes them. The catalog is the authority on which models may be
//! loaded and whether they are installed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Opaque embedding model identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Hardware class of a curated model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Gpu,
    Cpu,
}

/// A model the daemon is willing to load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedModel {
    pub id: ModelId,
    pub installed: bool,
    #[serde(rename = "type")]
    pub kind: ModelKind,
    /// Vector dimensionality, when known (reported by the worker on load)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

/// The set of curated models, loaded from `models.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(default)]
    pub models: Vec<CuratedModel>,
}

impl ModelCatalog {
    /// Load from a TOML file, falling back to the built-in list when the
    /// file is absent. A malformed file is an error, not a fallback.
    pub fn load(path: &Path) -> Result<Self, toml::de::Error> {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text),
            Err(_) => Ok(Self::builtin()),
        }
    }

    /// Built-in curated list used when no catalog file exists.
    pub fn builtin() -> Self {
        let entry = |id: &str, kind: ModelKind| CuratedModel {
            id: ModelId::new(id),
            installed: true,
            kind,
            dimensions: None,
        };
        Self {
            models: vec![
                entry("minilm-l6-v2", ModelKind::Cpu),
                entry("bge-small-en-v1.5", ModelKind::Cpu),
                entry("bge-m3", ModelKind::Gpu),
            ],
        }
    }

    pub fn get(&self, id: &ModelId) -> Option<&CuratedModel> {
        self.models.iter().find(|m| &m.id == id)
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.get(id).is_some()
    }

    /// Record the dimensionality a worker reported for a model
    pub fn set_dimensions(&mut self, id: &ModelId, dims: usize) {
        if let Some(model) = self.models.iter_mut().find(|m| &m.id == id) {
            model.dimensions = Some(dims);
        }
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
