// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan effect tasks and their completion handling.
//!
//! The walk and hashing run on the blocking pool; the runtime only sees a
//! `ScanFinished` event. Startup corruption checks happen here too: a scan
//! first cross-checks the fingerprint table against the vector store and
//! downgrades to a full rebuild when they disagree.

use super::Runtime;
use crate::detector::detect_changes;
use crate::scheduler::{Priority, Task};
use fidx_core::{Clock, EngineEvent, FolderState, Notification, ScanReport, TimerKey};
use fidx_storage::RegistryHealth;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded retries for scans hitting transient filesystem errors
const SCAN_RETRY_LIMIT: u32 = 3;

/// Base delay for scan retry backoff (doubles per attempt)
const SCAN_RETRY_BASE: Duration = Duration::from_millis(500);

impl<C: Clock> Runtime<C> {
    /// Run one scan on the blocking pool.
    pub(crate) fn spawn_scan_task(&mut self, task: Task) {
        let Some(rt) = self.folders.get(&task.folder) else {
            // Folder vanished between enqueue and dispatch.
            self.scheduler.complete(task.id);
            return;
        };

        let task_id = task.id;
        let folder = task.folder.clone();
        let root = folder.clone();
        let model_id = task.model_id.clone();
        let cancel = task.cancel.clone();
        let policy = self.policy.clone();
        let table = rt.table.clone();
        let store = self.store.clone();
        let state_dir = self.registry.state_dir_for(&folder);
        let event_tx = self.event_tx.clone();

        tokio::task::spawn_blocking(move || {
            let store_docs = store.doc_paths(&state_dir);
            let health = table.lock().verify_store(store_docs.as_ref());
            let rebuild = matches!(health, RegistryHealth::NeedsRebuild { .. });
            if let RegistryHealth::NeedsRebuild { reason } = &health {
                warn!(folder = %folder.display(), reason, "folder state needs full rebuild");
            }

            // On rebuild the stored fingerprints are not to be trusted:
            // diff against nothing so every document comes back as added.
            let stored = if rebuild { HashMap::new() } else { table.lock().snapshot() };

            let outcome = detect_changes(&root, &policy, &stored, &model_id, &cancel)
                .map(|(changes, examined)| ScanReport { changes, examined, rebuild })
                .map_err(|e| e.to_string());

            let _ = event_tx.blocking_send(EngineEvent::ScanFinished { task_id, folder, outcome });
        });
    }

    pub(crate) fn on_scan_finished(
        &mut self,
        task_id: u64,
        folder: PathBuf,
        outcome: Result<ScanReport, String>,
    ) {
        self.scheduler.complete(task_id);

        let Some(rt) = self.folders.get(&folder) else { return };
        if rt.removing || rt.cancel.is_cancelled() {
            return;
        }

        match outcome {
            Ok(report) => self.apply_scan_report(&folder, report),
            Err(message) => self.retry_or_fail_scan(&folder, message),
        }
    }

    fn apply_scan_report(&mut self, folder: &std::path::Path, report: ScanReport) {
        debug!(
            folder = %folder.display(),
            added = report.changes.added.len(),
            modified = report.changes.modified.len(),
            removed = report.changes.removed.len(),
            examined = report.examined,
            rebuild = report.rebuild,
            "scan complete"
        );

        let episode_total = {
            let Some(rt) = self.folders.get_mut(folder) else { return };
            rt.scan_attempts = 0;

            if report.rebuild {
                let clear_result = rt.table.lock().clear();
                if let Err(e) = clear_result {
                    let message = format!("failed to reset fingerprint table: {e}");
                    self.fail_folder(folder, message);
                    return;
                }
                rt.folder.notification = Some(Notification::warning(
                    "index state was missing or corrupt; rebuilding",
                ));
            }

            rt.backlog.clear();
            for relpath in &report.changes.removed {
                rt.backlog.push_back(super::DocWork::Remove(relpath.clone()));
            }
            for relpath in report.changes.added.iter().chain(&report.changes.modified) {
                rt.backlog.push_back(super::DocWork::Embed(relpath.clone()));
            }
            rt.episode_total = rt.backlog.len();
            rt.episode_done = 0;

            rt.folder.state = FolderState::Ready;
            rt.folder.progress = 0;
            rt.episode_total
        };
        self.publish();

        if episode_total == 0 {
            self.enter_active(folder);
        } else {
            if let Some(rt) = self.folders.get_mut(folder) {
                rt.folder.state = FolderState::Indexing;
            }
            self.publish();
            self.top_up_folder(folder);
        }
    }

    fn retry_or_fail_scan(&mut self, folder: &std::path::Path, message: String) {
        let attempts = {
            let Some(rt) = self.folders.get_mut(folder) else { return };
            rt.scan_attempts += 1;
            rt.scan_attempts
        };

        if attempts <= SCAN_RETRY_LIMIT {
            let delay = SCAN_RETRY_BASE * 2u32.saturating_pow(attempts - 1);
            info!(
                folder = %folder.display(),
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "scan failed, retrying with backoff"
            );
            let now = self.clock.now();
            self.timers
                .set_after(TimerKey::ScanRetry(folder.to_path_buf()), now, delay);
        } else {
            self.fail_folder(folder, format!("scan failed after {attempts} attempts: {message}"));
        }
    }

    /// Backoff timer fired: queue the scan again.
    pub(crate) fn on_scan_retry(&mut self, folder: &std::path::Path) {
        let Some(rt) = self.folders.get(folder) else { return };
        if rt.removing || rt.folder.state != FolderState::Scanning {
            return;
        }
        let model_id = rt.folder.model_id.clone();
        let cancel = rt.cancel.child_token();
        let id = self.scheduler.next_task_id();
        self.scheduler.enqueue(Task {
            id,
            folder: folder.to_path_buf(),
            kind: crate::scheduler::TaskKind::Scan,
            model_id,
            priority: Priority::Background,
            enqueued_at_ms: self.clock.epoch_ms(),
            cancel,
            attempts: 0,
        });
    }
}
