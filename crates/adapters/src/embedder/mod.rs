// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedder worker adapter.
//!
//! The engine owns worker lifecycle policy (model residency, keep-alive,
//! restart); this module owns the mechanics of talking to one worker
//! process. Fakes live behind the `test-support` feature.

mod process;
pub mod protocol;

#[cfg(any(test, feature = "test-support"))]
mod fake;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{EmbedderCall, FakeEmbedder};
pub use process::ProcessEmbedder;

use async_trait::async_trait;
use fidx_core::{EngineEvent, ModelId, WorkerId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from worker communication
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// The process exited or its pipes closed mid-request
    #[error("worker connection closed")]
    Closed,

    #[error("worker request deadline elapsed")]
    Deadline,

    /// The worker reported an error payload
    #[error("worker error ({kind}): {message}")]
    Remote { kind: String, message: String },

    #[error("worker protocol violation: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Translate into the engine-level embed failure classification
    pub fn into_embed_error(self) -> fidx_core::EmbedError {
        match self {
            WorkerError::Closed | WorkerError::Spawn(_) => fidx_core::EmbedError::WorkerRestarted,
            WorkerError::Deadline => fidx_core::EmbedError::Deadline,
            WorkerError::Remote { kind, message } => {
                fidx_core::EmbedError::Worker { kind, message }
            }
            WorkerError::Protocol(message) => {
                fidx_core::EmbedError::Worker { kind: "protocol".into(), message }
            }
            WorkerError::Io(e) => {
                fidx_core::EmbedError::Worker { kind: "io".into(), message: e.to_string() }
            }
        }
    }
}

/// A live connection to one worker process.
///
/// Every call carries a deadline; on expiry the request fails and the
/// caller decides whether to probe or restart the worker.
#[async_trait]
pub trait WorkerHandle: Send + Sync {
    /// Load a model, returning its vector dimensionality
    async fn load_model(&self, model_id: &ModelId, deadline: Duration)
        -> Result<usize, WorkerError>;

    async fn embed(
        &self,
        texts: Vec<String>,
        deadline: Duration,
    ) -> Result<Vec<Vec<f32>>, WorkerError>;

    async fn health(&self, deadline: Duration) -> Result<(), WorkerError>;

    /// Ask the worker to exit on its own
    async fn shutdown(&self, deadline: Duration) -> Result<(), WorkerError>;

    /// Force-terminate the process
    fn kill(&self);
}

/// Spawns embedder workers.
///
/// `event_tx` receives a `WorkerExited` event when the process dies, which
/// is how the engine learns about crashes without polling.
#[async_trait]
pub trait EmbedderAdapter: Send + Sync + 'static {
    async fn spawn(
        &self,
        worker: WorkerId,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<Arc<dyn WorkerHandle>, WorkerError>;
}
