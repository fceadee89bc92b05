// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime tests driven through fake adapters and a fake clock.
//!
//! The rig owns the engine event channel the daemon loop would normally
//! own: `settle` drains completion events until the runtime is quiescent,
//! and `advance` moves the fake clock then fires due timers.

mod concurrency;
mod lifecycle;
mod preemption;
mod recovery;
mod watching;
mod worker_policy;

use super::*;
use crate::command::EngineCmd;
use fidx_adapters::{FakeEmbedder, FakeWatch, FileVectorStore};
use fidx_core::{
    BusError, FakeClock, FolderState, ModelCatalog, ModelId, SchedulerConfig, WatcherConfig,
    WorkerConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

pub(crate) const MODEL: &str = "minilm-l6-v2";

pub(crate) struct Rig {
    pub runtime: Runtime<FakeClock>,
    pub clock: FakeClock,
    pub event_rx: mpsc::Receiver<EngineEvent>,
    pub embedder: FakeEmbedder,
    pub watch: FakeWatch,
    pub state: Arc<TempDir>,
    pub data: Arc<TempDir>,
    pub published: Vec<Vec<FolderView>>,
}

fn test_config(state_dir: PathBuf) -> DaemonConfig {
    DaemonConfig {
        state_dir,
        watcher: WatcherConfig { debounce_ms: 100 },
        worker: WorkerConfig {
            keep_alive_seconds: 60,
            agent_active_seconds: 60,
            shutdown_grace_period_seconds: 1,
            auto_restart: true,
            max_restart_attempts: 3,
            restart_delay_ms: 100,
            // Far enough out that probes never fire unless a test asks
            health_probe_ms: 3_600_000,
            request_timeout_ms: 5_000,
            pool_size: 1,
        },
        scheduler: SchedulerConfig::default(),
        ..DaemonConfig::default()
    }
}

impl Rig {
    pub fn new() -> Self {
        let state = Arc::new(TempDir::new().unwrap());
        let data = Arc::new(TempDir::new().unwrap());
        Self::with_dirs(state, data)
    }

    pub fn with_dirs(state: Arc<TempDir>, data: Arc<TempDir>) -> Self {
        let clock = FakeClock::new();
        let embedder = FakeEmbedder::new();
        let watch = FakeWatch::new();
        let (event_tx, event_rx) = mpsc::channel(256);

        let runtime = Runtime::new(
            test_config(state.path().to_path_buf()),
            clock.clone(),
            ModelCatalog::builtin(),
            RuntimeDeps {
                embedder: Arc::new(embedder.clone()),
                watcher: Arc::new(watch.clone()),
                store: Arc::new(FileVectorStore::new()),
            },
            event_tx,
        )
        .unwrap();

        Self { runtime, clock, event_rx, embedder, watch, state, data, published: Vec::new() }
    }

    /// Simulate a daemon restart over the same on-disk state.
    pub fn restart(self) -> Self {
        let Rig { state, data, .. } = self;
        Self::with_dirs(state, data)
    }

    /// Create a folder with the given files under the data directory.
    pub fn folder_with_files(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let folder = self.data.path().join(name);
        std::fs::create_dir_all(&folder).unwrap();
        for (relpath, content) in files {
            let path = folder.join(relpath);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        folder
    }

    /// Drain completion events until the runtime goes quiet.
    pub async fn settle(&mut self) {
        loop {
            match tokio::time::timeout(Duration::from_millis(250), self.event_rx.recv()).await {
                Ok(Some(event)) => {
                    self.runtime.handle_event(event).await;
                    self.pump_publishes();
                }
                _ => break,
            }
        }
        self.pump_publishes();
    }

    /// Advance the fake clock and fire due timers, then settle.
    pub async fn advance(&mut self, duration: Duration) {
        self.clock.advance(duration);
        self.runtime.tick().await;
        self.pump_publishes();
        self.settle().await;
    }

    fn pump_publishes(&mut self) {
        self.published.extend(self.runtime.drain_publishes());
    }

    pub async fn add_folder(&mut self, path: &Path) -> Result<Option<String>, BusError> {
        self.add_folder_with_model(path, MODEL).await
    }

    pub async fn add_folder_with_model(
        &mut self,
        path: &Path,
        model: &str,
    ) -> Result<Option<String>, BusError> {
        let (tx, rx) = oneshot::channel();
        self.runtime
            .handle_command(EngineCmd::AddFolder {
                path: path.to_path_buf(),
                model_id: ModelId::new(model),
                reply: tx,
            })
            .await;
        self.pump_publishes();
        rx.await.unwrap()
    }

    pub async fn remove_folder(&mut self, path: &Path) -> Result<Option<String>, BusError> {
        let (tx, rx) = oneshot::channel();
        self.runtime
            .handle_command(EngineCmd::RemoveFolder { path: path.to_path_buf(), reply: tx })
            .await;
        self.pump_publishes();
        rx.await.unwrap()
    }

    /// Issue a search; the receiver resolves when the query embed is done.
    pub async fn search(&mut self, path: &Path, query: &str) -> oneshot::Receiver<Result<(), BusError>> {
        let (tx, rx) = oneshot::channel();
        self.runtime
            .handle_command(EngineCmd::Search {
                path: path.to_path_buf(),
                query: query.to_string(),
                limit: 10,
                reply: tx,
            })
            .await;
        self.pump_publishes();
        rx
    }

    /// Distinct state sequence a folder went through, from the publish log.
    pub fn states_for(&self, path: &Path) -> Vec<FolderState> {
        let mut states = Vec::new();
        for snapshot in &self.published {
            if let Some(view) = snapshot.iter().find(|f| f.path == path) {
                if states.last() != Some(&view.state) {
                    states.push(view.state);
                }
            }
        }
        states
    }

    /// Progress values published for a folder, in order.
    pub fn progress_for(&self, path: &Path) -> Vec<u8> {
        self.published
            .iter()
            .filter_map(|snapshot| {
                snapshot.iter().find(|f| f.path == path).and_then(|f| f.progress)
            })
            .collect()
    }
}
