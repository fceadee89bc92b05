// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake embedder for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{EmbedderAdapter, WorkerError, WorkerHandle};
use async_trait::async_trait;
use fidx_core::{EngineEvent, ModelId, WorkerId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Recorded call to the fake embedder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedderCall {
    Spawn { worker: WorkerId },
    LoadModel { worker: WorkerId, model_id: ModelId },
    Embed { worker: WorkerId, texts: usize },
    Health { worker: WorkerId },
    Shutdown { worker: WorkerId },
    Kill { worker: WorkerId },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<EmbedderCall>,
    dims: HashMap<ModelId, usize>,
    default_dims: usize,
    loaded: HashMap<WorkerId, ModelId>,
    spawn_error: Option<String>,
    embed_errors: VecDeque<WorkerError>,
    health_failing: bool,
    event_txs: HashMap<WorkerId, mpsc::Sender<EngineEvent>>,
}

/// Fake embedder adapter.
///
/// Produces deterministic pseudo-vectors, records every call, and allows
/// scripted failures, held embeds, and simulated process exits.
#[derive(Clone)]
pub struct FakeEmbedder {
    inner: Arc<Mutex<FakeState>>,
    gate: watch::Sender<bool>,
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEmbedder {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                default_dims: 8,
                ..FakeState::default()
            })),
            gate,
        }
    }

    /// All recorded calls
    pub fn calls(&self) -> Vec<EmbedderCall> {
        self.inner.lock().calls.clone()
    }

    /// Number of embed calls made so far
    pub fn embed_calls(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, EmbedderCall::Embed { .. }))
            .count()
    }

    /// Models loaded, in call order
    pub fn loaded_models(&self) -> Vec<ModelId> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EmbedderCall::LoadModel { model_id, .. } => Some(model_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    /// Vector dimensionality reported for a given model
    pub fn set_dims(&self, model_id: &ModelId, dims: usize) {
        self.inner.lock().dims.insert(model_id.clone(), dims);
    }

    /// Make the next spawn fail
    pub fn set_spawn_error(&self, message: impl Into<String>) {
        self.inner.lock().spawn_error = Some(message.into());
    }

    /// Queue an error for an upcoming embed call
    pub fn fail_next_embed(&self, error: WorkerError) {
        self.inner.lock().embed_errors.push_back(error);
    }

    /// Make health probes fail until cleared
    pub fn set_health_failing(&self, failing: bool) {
        self.inner.lock().health_failing = failing;
    }

    /// Park all embed calls until `release_embeds`
    pub fn hold_embeds(&self) {
        let _ = self.gate.send(true);
    }

    pub fn release_embeds(&self) {
        let _ = self.gate.send(false);
    }

    /// Simulate a worker process exit
    pub async fn emit_exit(&self, worker: &WorkerId, code: Option<i32>) {
        let tx = self.inner.lock().event_txs.get(worker).cloned();
        if let Some(tx) = tx {
            let _ = tx
                .send(EngineEvent::WorkerExited { worker: worker.clone(), code })
                .await;
        }
    }
}

#[async_trait]
impl EmbedderAdapter for FakeEmbedder {
    async fn spawn(
        &self,
        worker: WorkerId,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<Arc<dyn WorkerHandle>, WorkerError> {
        {
            let mut state = self.inner.lock();
            state.calls.push(EmbedderCall::Spawn { worker: worker.clone() });
            if let Some(message) = state.spawn_error.take() {
                return Err(WorkerError::Spawn(message));
            }
            state.event_txs.insert(worker.clone(), event_tx);
        }
        Ok(Arc::new(FakeWorker {
            worker,
            inner: Arc::clone(&self.inner),
            gate: self.gate.subscribe(),
        }))
    }
}

struct FakeWorker {
    worker: WorkerId,
    inner: Arc<Mutex<FakeState>>,
    gate: watch::Receiver<bool>,
}

impl FakeWorker {
    async fn wait_gate(&self) {
        let mut gate = self.gate.clone();
        loop {
            if !*gate.borrow() {
                return;
            }
            if gate.changed().await.is_err() {
                return;
            }
        }
    }

    fn emit_exit_task(&self, code: Option<i32>) {
        let tx = self.inner.lock().event_txs.get(&self.worker).cloned();
        let worker = self.worker.clone();
        if let Some(tx) = tx {
            tokio::spawn(async move {
                let _ = tx.send(EngineEvent::WorkerExited { worker, code }).await;
            });
        }
    }
}

/// Deterministic pseudo-embedding: stable across runs, distinct per text.
fn pseudo_vector(text: &str, dims: usize) -> Vec<f32> {
    let mut seed: u64 = 1469598103934665603;
    for byte in text.as_bytes() {
        seed ^= u64::from(*byte);
        seed = seed.wrapping_mul(1099511628211);
    }
    (0..dims)
        .map(|i| {
            let v = seed.wrapping_mul(i as u64 + 1) % 1000;
            v as f32 / 1000.0
        })
        .collect()
}

#[async_trait]
impl WorkerHandle for FakeWorker {
    async fn load_model(
        &self,
        model_id: &ModelId,
        _deadline: Duration,
    ) -> Result<usize, WorkerError> {
        let mut state = self.inner.lock();
        state.calls.push(EmbedderCall::LoadModel {
            worker: self.worker.clone(),
            model_id: model_id.clone(),
        });
        state.loaded.insert(self.worker.clone(), model_id.clone());
        Ok(state.dims.get(model_id).copied().unwrap_or(state.default_dims))
    }

    async fn embed(
        &self,
        texts: Vec<String>,
        _deadline: Duration,
    ) -> Result<Vec<Vec<f32>>, WorkerError> {
        let dims = {
            let mut state = self.inner.lock();
            state.calls.push(EmbedderCall::Embed {
                worker: self.worker.clone(),
                texts: texts.len(),
            });
            if let Some(err) = state.embed_errors.pop_front() {
                return Err(err);
            }
            let loaded = state.loaded.get(&self.worker).cloned();
            match loaded {
                Some(model) => state.dims.get(&model).copied().unwrap_or(state.default_dims),
                None => {
                    return Err(WorkerError::Remote {
                        kind: "no_model".to_string(),
                        message: "embed before load_model".to_string(),
                    })
                }
            }
        };

        self.wait_gate().await;
        Ok(texts.iter().map(|t| pseudo_vector(t, dims)).collect())
    }

    async fn health(&self, _deadline: Duration) -> Result<(), WorkerError> {
        let mut state = self.inner.lock();
        state.calls.push(EmbedderCall::Health { worker: self.worker.clone() });
        if state.health_failing {
            return Err(WorkerError::Deadline);
        }
        Ok(())
    }

    async fn shutdown(&self, _deadline: Duration) -> Result<(), WorkerError> {
        self.inner
            .lock()
            .calls
            .push(EmbedderCall::Shutdown { worker: self.worker.clone() });
        self.emit_exit_task(Some(0));
        Ok(())
    }

    fn kill(&self) {
        self.inner
            .lock()
            .calls
            .push(EmbedderCall::Kill { worker: self.worker.clone() });
        self.emit_exit_task(None);
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
