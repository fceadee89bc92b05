// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedder worker pool bookkeeping.
//!
//! Pure state: which workers exist, what model each holds, whether they
//! are busy, and how the keep-alive pin restricts background swaps. The
//! runtime performs the actual spawning, loading, probing, and killing.

use fidx_adapters::WorkerHandle;
use fidx_core::{ModelId, WorkerId};
use std::sync::Arc;

/// Lifecycle state of one worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// Process spawned, not yet confirmed responsive
    Starting,
    /// Alive with no model loaded
    Ready,
    LoadingModel(ModelId),
    /// Model resident, no request in flight
    Idle(ModelId),
    /// Exactly one request in flight
    Busy(ModelId),
    /// Told to shut down; exit expected
    Draining,
    Dead,
}

impl WorkerState {
    pub fn loaded_model(&self) -> Option<&ModelId> {
        match self {
            WorkerState::Idle(m) | WorkerState::Busy(m) => Some(m),
            _ => None,
        }
    }
}

/// One supervised worker
pub struct WorkerEntry {
    pub id: WorkerId,
    pub handle: Option<Arc<dyn WorkerHandle>>,
    pub state: WorkerState,
    pub last_used_ms: u64,
    pub restart_count: u32,
    /// Keep-alive pin: until this time, background work may not swap the
    /// loaded model away (interactive work may).
    pub pinned_until_ms: u64,
    /// Model to restore after a restart
    pub last_model: Option<ModelId>,
}

impl WorkerEntry {
    pub fn new(id: WorkerId, handle: Arc<dyn WorkerHandle>) -> Self {
        Self {
            id,
            handle: Some(handle),
            state: WorkerState::Starting,
            last_used_ms: 0,
            restart_count: 0,
            pinned_until_ms: 0,
            last_model: None,
        }
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.state, WorkerState::Dead)
    }
}

/// The set of workers the daemon owns
#[derive(Default)]
pub struct WorkerPool {
    entries: Vec<WorkerEntry>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: WorkerEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, id: &WorkerId) -> Option<&WorkerEntry> {
        self.entries.iter().find(|w| &w.id == id)
    }

    pub fn get_mut(&mut self, id: &WorkerId) -> Option<&mut WorkerEntry> {
        self.entries.iter_mut().find(|w| &w.id == id)
    }

    pub fn remove(&mut self, id: &WorkerId) -> Option<WorkerEntry> {
        let index = self.entries.iter().position(|w| &w.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkerEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WorkerEntry> {
        self.entries.iter_mut()
    }

    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|w| w.is_live()).count()
    }

    /// A worker with the model resident and nothing in flight
    pub fn idle_with_model(&self, model_id: &ModelId) -> Option<WorkerId> {
        self.entries
            .iter()
            .find(|w| matches!(&w.state, WorkerState::Idle(m) if m == model_id))
            .map(|w| w.id.clone())
    }

    /// A worker that could take a `load_model` for `model_id`.
    ///
    /// Workers with no model win over swaps. A worker whose model is pinned
    /// by keep-alive is only eligible when `allow_swap_pinned` (interactive
    /// demand); a BUSY or LOADING worker is never eligible.
    pub fn loadable_worker(
        &self,
        model_id: &ModelId,
        allow_swap_pinned: bool,
        now_ms: u64,
    ) -> Option<WorkerId> {
        if let Some(w) = self
            .entries
            .iter()
            .find(|w| matches!(w.state, WorkerState::Ready))
        {
            return Some(w.id.clone());
        }
        self.entries
            .iter()
            .find(|w| match &w.state {
                WorkerState::Idle(m) if m != model_id => {
                    allow_swap_pinned || now_ms >= w.pinned_until_ms
                }
                _ => false,
            })
            .map(|w| w.id.clone())
    }

    /// Whether any worker currently holds or is loading the model
    pub fn model_resident(&self, model_id: &ModelId) -> bool {
        self.entries.iter().any(|w| match &w.state {
            WorkerState::Idle(m) | WorkerState::Busy(m) | WorkerState::LoadingModel(m) => {
                m == model_id
            }
            _ => false,
        })
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
