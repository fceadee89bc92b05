// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Folder lifecycle orchestration.
//!
//! One `FolderRuntime` per managed folder; the runtime's event loop is the
//! only writer, so per-folder transitions are totally ordered. Transitions
//! queue an FMDM publish each, and a fresh scanning→ready→indexing cycle
//! legitimately resets progress to zero.

use super::Runtime;
use crate::command::SearchReply;
use crate::debounce::OpenWindow;
use crate::error::EngineError;
use crate::scheduler::{Priority, Task, TaskKind};
use fidx_adapters::WatchGuard;
use fidx_core::{
    Clock, Folder, FolderState, ModelId, Notification, TimerKey,
};
use fidx_storage::{AddError, FingerprintTable};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Discovered document work not yet admitted to the scheduler
/// (the per-folder queue bound throttles admission, never drops)
#[derive(Debug, Clone)]
pub(crate) enum DocWork {
    Embed(PathBuf),
    Remove(PathBuf),
}

/// Live state for one managed folder
pub(crate) struct FolderRuntime {
    pub folder: Folder,
    pub table: Arc<Mutex<FingerprintTable>>,
    /// Work discovered by the last scan, fed to the scheduler under the
    /// per-folder queue bound
    pub backlog: VecDeque<DocWork>,
    /// Size of the current indexing episode's work set
    pub episode_total: usize,
    /// Documents committed (or terminally skipped) this episode
    pub episode_done: usize,
    pub watch_guard: Option<Box<dyn WatchGuard>>,
    pub debounce: Option<OpenWindow>,
    /// A watcher ping arrived while the folder was busy; rescan when idle
    pub rescan_pending: bool,
    pub scan_attempts: u32,
    pub cancel: CancellationToken,
    pub removing: bool,
}

impl<C: Clock> Runtime<C> {
    /// Create the runtime state for a folder already present in the
    /// registry (startup restore and fresh adds share this path).
    pub(crate) fn adopt_folder(
        &mut self,
        path: PathBuf,
        model_id: ModelId,
        created_at_epoch_ms: u64,
    ) -> Result<(), EngineError> {
        let state_dir = self.registry.state_dir_for(&path);
        let table = FingerprintTable::open(&state_dir)?;
        let folder = Folder::new(path.clone(), model_id, created_at_epoch_ms);
        self.folders.insert(
            path,
            FolderRuntime {
                folder,
                table: Arc::new(Mutex::new(table)),
                backlog: VecDeque::new(),
                episode_total: 0,
                episode_done: 0,
                watch_guard: None,
                debounce: None,
                rescan_pending: false,
                scan_attempts: 0,
                cancel: CancellationToken::new(),
                removing: false,
            },
        );
        Ok(())
    }

    /// `folder.add`: idempotent by path. Re-adding with the same model
    /// succeeds (and retries a folder stuck in ERROR); a different model is
    /// an error.
    pub(crate) fn add_folder(
        &mut self,
        path: PathBuf,
        model_id: ModelId,
    ) -> Result<Option<String>, EngineError> {
        if !self.catalog.contains(&model_id) {
            return Err(EngineError::ModelUnavailable(model_id.to_string()));
        }

        if let Some(rt) = self.folders.get(&path) {
            if rt.folder.model_id == model_id {
                if rt.folder.state == FolderState::Error {
                    info!(folder = %path.display(), "retrying folder after error");
                    self.clear_notification(&path);
                    self.start_scan(&path, Priority::Interactive);
                    return Ok(Some("retrying after error".to_string()));
                }
                return Ok(Some("already managed".to_string()));
            }
            return Err(EngineError::AlreadyExists {
                existing: rt.folder.model_id.to_string(),
            });
        }

        let created_at = self.clock.epoch_ms();
        let record = self
            .registry
            .add(&path, model_id, created_at)
            .map_err(|e| match e {
                AddError::AlreadyExists { existing_model } => EngineError::AlreadyExists {
                    existing: existing_model.to_string(),
                },
                AddError::InvalidPath(msg) => EngineError::InvalidPath(msg),
                AddError::Storage(e) => EngineError::Storage(e),
            })?;

        self.adopt_folder(record.path.clone(), record.model_id, record.created_at_epoch_ms)?;
        info!(folder = %path.display(), "folder added");
        self.publish();
        self.start_scan(&path, Priority::Interactive);
        Ok(None)
    }

    /// `folder.remove`: idempotent; cancels all pending work, disarms the
    /// watcher, and deletes the private state directory.
    pub(crate) fn remove_folder(&mut self, path: &Path) -> Result<Option<String>, EngineError> {
        let Some(mut rt) = self.folders.shift_remove(path) else {
            return Ok(Some("not present".to_string()));
        };

        rt.removing = true;
        rt.cancel.cancel();
        rt.watch_guard = None;

        let dropped = self.scheduler.cancel_folder(path);
        self.resolve_dropped_waiters(dropped);
        self.timers.cancel_folder(path);
        self.registry.remove(path)?;

        info!(folder = %path.display(), "folder removed");
        self.publish();
        Ok(None)
    }

    /// `search.request`: route the query embed at IMMEDIATE priority. The
    /// reply resolves when the query has been embedded (or failed).
    pub(crate) fn route_search(
        &mut self,
        path: PathBuf,
        query: String,
        _limit: usize,
        reply: SearchReply,
    ) {
        let Some(rt) = self.folders.get(&path) else {
            let _ = reply.send(Err(fidx_core::BusError::new(
                fidx_core::ErrorKind::UnknownFolder,
                format!("no managed folder at {}", path.display()),
            )));
            return;
        };

        let model_id = rt.folder.model_id.clone();
        let cancel = rt.cancel.child_token();
        let id = self.scheduler.next_task_id();
        self.search_waiters.insert(id, reply);
        self.scheduler.enqueue(Task {
            id,
            folder: path,
            kind: TaskKind::EmbedQuery { text: query },
            model_id,
            priority: Priority::Immediate,
            enqueued_at_ms: self.clock.epoch_ms(),
            cancel,
            attempts: 0,
        });

        // Accepting an IMMEDIATE request arms the agent-active window:
        // background admission pauses within this scheduler pass.
        self.extend_agent_active();
    }

    /// Transition a folder into SCANNING and queue the scan task.
    pub(crate) fn start_scan(&mut self, path: &Path, priority: Priority) {
        let Some(rt) = self.folders.get_mut(path) else { return };
        if rt.removing {
            return;
        }
        rt.folder.state = FolderState::Scanning;
        rt.folder.progress = 0;
        rt.rescan_pending = false;
        let model_id = rt.folder.model_id.clone();
        let cancel = rt.cancel.child_token();
        self.publish();

        let id = self.scheduler.next_task_id();
        self.scheduler.enqueue(Task {
            id,
            folder: path.to_path_buf(),
            kind: TaskKind::Scan,
            model_id,
            priority,
            enqueued_at_ms: self.clock.epoch_ms(),
            cancel,
            attempts: 0,
        });
    }

    /// Transition into ACTIVE: progress complete, watcher armed. A ping
    /// that arrived while busy immediately triggers the next scan.
    pub(crate) fn enter_active(&mut self, path: &Path) {
        let rescan = {
            let Some(rt) = self.folders.get_mut(path) else { return };
            rt.folder.state = FolderState::Active;
            rt.folder.progress = 100;
            rt.rescan_pending
        };
        self.arm_watcher(path);
        self.publish();

        if rescan {
            self.start_scan(path, Priority::Background);
        }
    }

    /// Transition into ERROR with a notification; pending work is dropped.
    pub(crate) fn fail_folder(&mut self, path: &Path, message: String) {
        warn!(folder = %path.display(), error = %message, "folder entered error state");
        let dropped = self.scheduler.cancel_folder(path);
        self.resolve_dropped_waiters(dropped);
        self.timers.cancel_folder(path);
        if let Some(rt) = self.folders.get_mut(path) {
            rt.backlog.clear();
            rt.folder.state = FolderState::Error;
            rt.folder.notification = Some(Notification::error(message));
        }
        self.publish();
    }

    pub(crate) fn clear_notification(&mut self, path: &Path) {
        if let Some(rt) = self.folders.get_mut(path) {
            rt.folder.notification = None;
        }
    }

    fn arm_watcher(&mut self, path: &Path) {
        let Some(rt) = self.folders.get_mut(path) else { return };
        if rt.watch_guard.is_some() {
            return;
        }
        match self.watcher.watch(path, self.event_tx.clone()) {
            Ok(guard) => rt.watch_guard = Some(guard),
            Err(e) => {
                warn!(folder = %path.display(), error = %e, "failed to arm file watcher");
                rt.folder.notification =
                    Some(Notification::warning(format!("file watching unavailable: {e}")));
            }
        }
    }

    /// Raw watcher ping: debounce it, or remember it if the folder is busy.
    pub(crate) fn on_watcher_ping(&mut self, path: PathBuf) {
        let now = self.clock.now();
        let Some(rt) = self.folders.get_mut(&path) else { return };
        if rt.removing {
            return;
        }
        if rt.folder.state != FolderState::Active {
            rt.rescan_pending = true;
            return;
        }
        let deadline = self.debouncer.ping(&mut rt.debounce, now);
        self.timers.set(TimerKey::Debounce(path), deadline);
    }

    /// Debounce window closed: the folder is dirty.
    pub(crate) fn on_debounce_fired(&mut self, path: &Path) {
        let Some(rt) = self.folders.get_mut(path) else { return };
        rt.debounce = None;
        if rt.removing {
            return;
        }
        if rt.folder.state == FolderState::Active {
            self.start_scan(path, Priority::Background);
        } else {
            rt.rescan_pending = true;
        }
    }

    /// Feed backlog work to the scheduler up to the folder's queue bound.
    pub(crate) fn top_up_folder(&mut self, path: &Path) {
        loop {
            let Some(rt) = self.folders.get_mut(path) else { return };
            if rt.backlog.is_empty() || !self.scheduler.has_folder_capacity(path) {
                return;
            }
            let Some(work) = rt.backlog.pop_front() else { return };
            let model_id = rt.folder.model_id.clone();
            let cancel = rt.cancel.child_token();
            let kind = match work {
                DocWork::Embed(relpath) => TaskKind::EmbedDocument { relpath },
                DocWork::Remove(relpath) => TaskKind::RemoveDocument { relpath },
            };
            let id = self.scheduler.next_task_id();
            self.scheduler.enqueue(Task {
                id,
                folder: path.to_path_buf(),
                kind,
                model_id,
                priority: Priority::Background,
                enqueued_at_ms: self.clock.epoch_ms(),
                cancel,
                attempts: 0,
            });
        }
    }

    /// Recompute and publish a folder's indexing progress.
    pub(crate) fn update_progress(&mut self, path: &Path) {
        let Some(rt) = self.folders.get_mut(path) else { return };
        if rt.episode_total == 0 {
            return;
        }
        let done = rt.episode_done.min(rt.episode_total);
        let progress = (done * 100 / rt.episode_total) as u8;
        // Monotone within one episode: total is fixed and done only grows.
        if progress != rt.folder.progress {
            rt.folder.progress = progress;
            self.publish();
        }
    }

    /// Whether this folder's indexing episode has fully drained.
    pub(crate) fn episode_drained(&self, path: &Path) -> bool {
        let Some(rt) = self.folders.get(path) else { return false };
        rt.backlog.is_empty()
            && rt.episode_done >= rt.episode_total
            && self.scheduler.folder_idle(path)
    }
}
