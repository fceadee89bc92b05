// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine runtime: one owner for every folder lifecycle, the task
//! scheduler, and the worker pool.
//!
//! Driven from the daemon loop: `handle_command` for control-bus commands,
//! `handle_event` for completion events from spawned effect tasks, and
//! `tick` for time. Each call may queue FMDM publishes, which the daemon
//! drains in order after every call.

mod docs;
mod folders;
mod scan;
mod workers;

pub(crate) use folders::{DocWork, FolderRuntime};

use crate::command::{EngineCmd, SearchReply};
use crate::debounce::Debouncer;
use crate::detector::ScanPolicy;
use crate::error::EngineError;
use crate::pool::WorkerPool;
use crate::scheduler::{CanDispatch, Priority, Scheduler, Task, TaskKind};
use crate::timers::TimerWheel;

use fidx_adapters::{EmbedderAdapter, VectorStore, WatchAdapter};
use fidx_core::{
    Clock, DaemonConfig, EngineEvent, FolderView, ModelCatalog, ModelId, TimerKey, WorkerId,
};
use fidx_storage::FolderRegistry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Adapter dependencies injected at construction
pub struct RuntimeDeps {
    pub embedder: Arc<dyn EmbedderAdapter>,
    pub watcher: Arc<dyn WatchAdapter>,
    pub store: Arc<dyn VectorStore>,
}

/// The coordination core
pub struct Runtime<C: Clock> {
    pub(crate) config: DaemonConfig,
    pub(crate) clock: C,
    pub(crate) catalog: ModelCatalog,
    pub(crate) registry: FolderRegistry,
    pub(crate) embedder: Arc<dyn EmbedderAdapter>,
    pub(crate) watcher: Arc<dyn WatchAdapter>,
    pub(crate) store: Arc<dyn VectorStore>,
    pub(crate) event_tx: mpsc::Sender<EngineEvent>,
    pub(crate) scheduler: Scheduler,
    pub(crate) pool: WorkerPool,
    pub(crate) timers: TimerWheel,
    pub(crate) debouncer: Debouncer,
    pub(crate) policy: Arc<ScanPolicy>,
    pub(crate) folders: indexmap::IndexMap<PathBuf, FolderRuntime>,
    /// Dimensionality per model as reported by workers; a mismatch across
    /// restarts is a fatal worker fault
    pub(crate) model_dims: HashMap<ModelId, usize>,
    /// Worker each in-flight embed task was dispatched to
    pub(crate) task_workers: HashMap<u64, WorkerId>,
    /// Reply senders for in-flight or queued search routing tasks
    pub(crate) search_waiters: HashMap<u64, SearchReply>,
    /// FMDM publish points queued for the daemon to broadcast in order
    pub(crate) publishes: Vec<Vec<FolderView>>,
    pub(crate) draining: bool,
}

impl<C: Clock> Runtime<C> {
    pub fn new(
        config: DaemonConfig,
        clock: C,
        catalog: ModelCatalog,
        deps: RuntimeDeps,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let registry = FolderRegistry::open(&config.folders_path(), config.reserved_dir.clone())?;
        let policy = Arc::new(
            ScanPolicy::new(&config.include, &config.exclude, &config.reserved_dir)
                .map_err(|e| EngineError::Internal(e.to_string()))?,
        );
        let debouncer = Debouncer::new(config.watcher.debounce(), config.watcher.debounce_cap());
        let scheduler = Scheduler::new(config.scheduler.clone());

        Ok(Self {
            config,
            clock,
            catalog,
            registry,
            embedder: deps.embedder,
            watcher: deps.watcher,
            store: deps.store,
            event_tx,
            scheduler,
            pool: WorkerPool::new(),
            timers: TimerWheel::new(),
            debouncer,
            policy,
            folders: indexmap::IndexMap::new(),
            model_dims: HashMap::new(),
            task_workers: HashMap::new(),
            search_waiters: HashMap::new(),
            publishes: Vec::new(),
            draining: false,
        })
    }

    /// Rebuild folder lifecycles from the durable registry at startup.
    ///
    /// Every folder re-enters through the normal scan path; unchanged
    /// folders produce empty change sets and reach ACTIVE without a single
    /// embed call.
    pub async fn restore(&mut self) {
        for record in self.registry.list() {
            if let Err(e) = self.adopt_folder(
                record.path.clone(),
                record.model_id.clone(),
                record.created_at_epoch_ms,
            ) {
                warn!(folder = %record.path.display(), error = %e, "failed to restore folder");
                continue;
            }
            self.start_scan(&record.path, Priority::Background);
        }
        self.publish();
        self.dispatch().await;
    }

    pub async fn handle_command(&mut self, cmd: EngineCmd) {
        match cmd {
            EngineCmd::AddFolder { path, model_id, reply } => {
                let result = self.add_folder(path, model_id);
                let _ = reply.send(result.map_err(EngineError::into_bus_error));
            }
            EngineCmd::RemoveFolder { path, reply } => {
                let result = self.remove_folder(&path);
                let _ = reply.send(result.map_err(EngineError::into_bus_error));
            }
            EngineCmd::Search { path, query, limit, reply } => {
                self.route_search(path, query, limit, reply);
            }
        }
        self.dispatch().await;
    }

    pub async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::ScanFinished { task_id, folder, outcome } => {
                self.on_scan_finished(task_id, folder, outcome);
            }
            EngineEvent::EmbedFinished { task_id, outcome } => {
                self.on_embed_finished(task_id, outcome);
            }
            EngineEvent::WriteFinished { task_id, outcome } => {
                self.on_doc_committed(task_id, outcome);
            }
            EngineEvent::RemoveFinished { task_id, outcome } => {
                self.on_doc_committed(task_id, outcome);
            }
            EngineEvent::WatcherPing { folder } => {
                self.on_watcher_ping(folder);
            }
            EngineEvent::ModelLoaded { worker, model_id, outcome } => {
                self.on_model_loaded(worker, model_id, outcome);
            }
            EngineEvent::WorkerExited { worker, code } => {
                self.on_worker_exited(worker, code);
            }
            EngineEvent::HealthReport { worker, status } => {
                self.on_health_report(worker, status);
            }
            EngineEvent::TimerFired { key } => {
                self.on_timer(key).await;
            }
        }
        self.dispatch().await;
    }

    /// Fire due deadlines. Called on the daemon's timer cadence.
    pub async fn tick(&mut self) {
        let now = self.clock.now();
        for key in self.timers.fired(now) {
            self.on_timer(key).await;
        }
        self.dispatch().await;
    }

    async fn on_timer(&mut self, key: TimerKey) {
        match key {
            TimerKey::Debounce(folder) => self.on_debounce_fired(&folder),
            TimerKey::ScanRetry(folder) => self.on_scan_retry(&folder),
            TimerKey::KeepAlive(worker) => self.on_keep_alive_expired(&worker),
            TimerKey::AgentActive => self.on_agent_active_expired(),
            TimerKey::HealthProbe(worker) => self.start_health_probe(&worker),
            TimerKey::WorkerRestart(worker) => self.respawn_worker(worker).await,
        }
    }

    /// FMDM publish points accumulated since the last drain, in order.
    pub fn drain_publishes(&mut self) -> Vec<Vec<FolderView>> {
        std::mem::take(&mut self.publishes)
    }

    pub fn folder_views(&self) -> Vec<FolderView> {
        self.folders.values().map(|rt| FolderView::from(&rt.folder)).collect()
    }

    pub(crate) fn publish(&mut self) {
        self.publishes.push(self.folder_views());
    }

    /// Dispatch every currently admissible task.
    pub(crate) async fn dispatch(&mut self) {
        loop {
            let now_ms = self.clock.epoch_ms();
            let mut loads: Vec<(WorkerId, ModelId)> = Vec::new();
            let mut want_spawn = false;

            let task = {
                let pool = &self.pool;
                let pool_size = self.config.worker.pool_size;
                self.scheduler.pop_next(|task| {
                    if !task.kind.needs_worker() {
                        return CanDispatch::Run;
                    }
                    if pool.idle_with_model(&task.model_id).is_some() {
                        return CanDispatch::Run;
                    }
                    if pool.model_resident(&task.model_id) {
                        // Loaded but busy, or already loading: wait.
                        return CanDispatch::Wait;
                    }
                    let allow_swap = task.priority >= Priority::Interactive;
                    if let Some(worker) = pool.loadable_worker(&task.model_id, allow_swap, now_ms)
                    {
                        loads.push((worker, task.model_id.clone()));
                        return CanDispatch::NeedsModel;
                    }
                    if pool.live_count() < pool_size {
                        want_spawn = true;
                    }
                    CanDispatch::Wait
                })
            };

            let mut progressed = false;
            for (worker, model_id) in loads {
                if self.begin_load(worker, model_id) {
                    progressed = true;
                }
            }
            if want_spawn && self.spawn_worker().await {
                progressed = true;
            }

            match task {
                Some(task) => self.run_task(task).await,
                None => {
                    if !progressed {
                        break;
                    }
                }
            }
        }
    }

    async fn run_task(&mut self, task: Task) {
        debug!(task_id = task.id, folder = %task.folder.display(), kind = ?task.kind, "dispatching task");
        match &task.kind {
            TaskKind::Scan => self.spawn_scan_task(task),
            TaskKind::EmbedDocument { .. } | TaskKind::EmbedQuery { .. } => {
                self.spawn_embed_task(task);
            }
            TaskKind::WriteResults { .. } => self.spawn_write_task(task),
            TaskKind::RemoveDocument { .. } => self.spawn_remove_task(task),
        }
    }

    /// Graceful stop: cancel lifecycles in reverse creation order, then
    /// drain workers within the configured grace period.
    pub async fn shutdown(&mut self, event_rx: &mut mpsc::Receiver<EngineEvent>) {
        self.draining = true;

        let paths: Vec<PathBuf> = self.folders.keys().cloned().collect();
        for path in paths.iter().rev() {
            if let Some(rt) = self.folders.get_mut(path) {
                rt.cancel.cancel();
                rt.watch_guard = None;
            }
            let dropped = self.scheduler.cancel_folder(path);
            self.resolve_dropped_waiters(dropped);
            self.timers.cancel_folder(path);
        }

        let request_timeout = self.config.worker.request_timeout();
        let mut expected = 0usize;
        for entry in self.pool.iter_mut() {
            if !entry.is_live() {
                continue;
            }
            if let Some(handle) = entry.handle.clone() {
                entry.state = crate::pool::WorkerState::Draining;
                expected += 1;
                tokio::spawn(async move {
                    let _ = handle.shutdown(request_timeout).await;
                });
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.worker.shutdown_grace();
        while expected > 0 {
            match tokio::time::timeout_at(deadline, event_rx.recv()).await {
                Ok(Some(EngineEvent::WorkerExited { worker, .. })) => {
                    self.pool.remove(&worker);
                    expected -= 1;
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => break,
            }
        }

        // Force-terminate anything that ignored the grace period.
        for entry in self.pool.iter() {
            if let Some(handle) = &entry.handle {
                handle.kill();
            }
        }
    }

    pub(crate) fn resolve_dropped_waiters(&mut self, dropped: Vec<Task>) {
        for task in dropped {
            if let Some(waiter) = self.search_waiters.remove(&task.id) {
                let _ = waiter.send(Err(fidx_core::BusError::new(
                    fidx_core::ErrorKind::UnknownFolder,
                    "folder removed while search was queued",
                )));
            }
        }
    }
}

#[cfg(test)]
impl<C: Clock> Runtime<C> {
    pub(crate) fn folder_state(&self, path: &std::path::Path) -> Option<fidx_core::FolderState> {
        self.folders.get(path).map(|rt| rt.folder.state)
    }

    pub(crate) fn folder_progress(&self, path: &std::path::Path) -> Option<u8> {
        self.folders.get(path).map(|rt| rt.folder.progress)
    }

    pub(crate) fn folder_notification(
        &self,
        path: &std::path::Path,
    ) -> Option<fidx_core::Notification> {
        self.folders.get(path).and_then(|rt| rt.folder.notification.clone())
    }

    pub(crate) fn fingerprint_count(&self, path: &std::path::Path) -> usize {
        self.folders.get(path).map(|rt| rt.table.lock().len()).unwrap_or(0)
    }

    pub(crate) fn fingerprint(
        &self,
        path: &std::path::Path,
        relpath: &std::path::Path,
    ) -> Option<fidx_core::DocumentFingerprint> {
        self.folders
            .get(path)
            .and_then(|rt| rt.table.lock().get(relpath).cloned())
    }

    pub(crate) fn is_background_paused(&self) -> bool {
        self.scheduler.background_paused()
    }

    pub(crate) fn managed_folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Loaded model per live worker (None = no model resident)
    pub(crate) fn worker_models(&self) -> Vec<Option<ModelId>> {
        self.pool
            .iter()
            .filter(|w| w.is_live())
            .map(|w| w.state.loaded_model().cloned())
            .collect()
    }

    pub(crate) fn live_worker_count(&self) -> usize {
        self.pool.live_count()
    }
}

#[cfg(test)]
#[path = "../runtime_tests/mod.rs"]
mod tests;
