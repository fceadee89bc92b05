// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events processed by the daemon's engine loop.
//!
//! Long-running effects (scans, embed calls, store writes) run in spawned
//! tasks and report back through these events; the engine applies them one
//! at a time, which is what gives lifecycle transitions their total order.

use crate::fingerprint::ChangeSet;
use crate::id::WorkerId;
use crate::model::ModelId;
use std::path::PathBuf;

/// Deadline identifiers for the engine's polled timer wheel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Debounce window for a dirty folder
    Debounce(PathBuf),
    /// Keep-alive expiry for a worker's loaded model
    KeepAlive(WorkerId),
    /// Agent-active window expiry (background admission resumes)
    AgentActive,
    /// Periodic health probe for a worker
    HealthProbe(WorkerId),
    /// Delayed respawn of a dead worker
    WorkerRestart(WorkerId),
    /// Backoff retry of a failed scan
    ScanRetry(PathBuf),
}

/// Result of a completed folder scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub changes: ChangeSet,
    /// Files examined during the walk
    pub examined: usize,
    /// The state directory was missing or corrupt; every document was
    /// treated as added and stale fingerprints were discarded
    pub rebuild: bool,
}

/// A document embedded and ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedDocument {
    pub relpath: PathBuf,
    pub vectors: Vec<Vec<f32>>,
    pub content_hash: String,
    pub size: u64,
    pub mtime_epoch_ms: u64,
    pub model_id: ModelId,
}

/// Why an embed call failed, as seen by the scheduler's retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    /// The worker restarted mid-request; retryable for background work
    WorkerRestarted,
    /// The per-request deadline elapsed; the worker is suspect
    Deadline,
    /// The worker reported an error payload
    Worker { kind: String, message: String },
    /// Reading or chunking the document failed
    Document(String),
}

impl EmbedError {
    /// Whether background work may retry after this failure
    pub fn retryable(&self) -> bool {
        matches!(self, EmbedError::WorkerRestarted | EmbedError::Deadline)
    }
}

impl std::fmt::Display for EmbedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedError::WorkerRestarted => f.write_str("worker restarted mid-request"),
            EmbedError::Deadline => f.write_str("worker request deadline elapsed"),
            EmbedError::Worker { kind, message } => write!(f, "worker error ({kind}): {message}"),
            EmbedError::Document(message) => write!(f, "document error: {message}"),
        }
    }
}

/// Worker health as judged by the probe loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerHealth {
    Healthy,
    /// Slow but responsive
    Degraded,
    /// Non-responsive beyond the probe timeout
    Unhealthy,
}

/// Events delivered to the engine loop
#[derive(Debug)]
pub enum EngineEvent {
    /// A scan task finished
    ScanFinished {
        task_id: u64,
        folder: PathBuf,
        outcome: Result<ScanReport, String>,
    },

    /// An embed call for one document finished
    EmbedFinished {
        task_id: u64,
        outcome: Result<EmbeddedDocument, EmbedError>,
    },

    /// A store write plus fingerprint commit finished
    WriteFinished {
        task_id: u64,
        outcome: Result<(), String>,
    },

    /// A document removal (store row + fingerprint) finished
    RemoveFinished {
        task_id: u64,
        outcome: Result<(), String>,
    },

    /// Raw platform watcher ping, before debouncing
    WatcherPing { folder: PathBuf },

    /// A `load_model` call finished; `Ok` carries the reported dimensions
    ModelLoaded {
        worker: WorkerId,
        model_id: ModelId,
        outcome: Result<usize, String>,
    },

    /// An embedder worker process exited
    WorkerExited {
        worker: WorkerId,
        code: Option<i32>,
    },

    /// Outcome of a health probe
    HealthReport {
        worker: WorkerId,
        status: WorkerHealth,
    },

    /// A deadline from the timer wheel fired
    TimerFired { key: TimerKey },
}
