// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document pipeline effects: embed, write, remove.
//!
//! Per-document order is strict: embed → vector-store write (fsync) →
//! fingerprint commit. The write task enqueues only after its embed
//! completes, so the ordering holds by construction.

use super::Runtime;
use crate::scheduler::{InFlightKind, Priority, Task, TaskKind};
use fidx_adapters::chunk::{chunk_text, MAX_CHUNK_CHARS};
use fidx_core::{
    BusError, Clock, DocumentFingerprint, EmbedError, EmbeddedDocument, EngineEvent, ErrorKind,
    FolderState, Notification,
};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

impl<C: Clock> Runtime<C> {
    /// Dispatch an embed (document or query) to an idle worker holding the
    /// task's model. The scheduler only admits these when such a worker
    /// exists, so failure to find one just requeues.
    pub(crate) fn spawn_embed_task(&mut self, task: Task) {
        let Some(worker_id) = self.pool.idle_with_model(&task.model_id) else {
            self.scheduler.complete(task.id);
            self.scheduler.requeue_front(task);
            return;
        };
        let handle = match self.pool.get_mut(&worker_id) {
            Some(entry) => match entry.handle.clone() {
                Some(handle) => {
                    entry.state = crate::pool::WorkerState::Busy(task.model_id.clone());
                    entry.last_used_ms = self.clock.epoch_ms();
                    handle
                }
                None => {
                    self.scheduler.complete(task.id);
                    self.scheduler.requeue_front(task);
                    return;
                }
            },
            None => {
                self.scheduler.complete(task.id);
                self.scheduler.requeue_front(task);
                return;
            }
        };

        self.task_workers.insert(task.id, worker_id);
        let timeout = self.config.worker.request_timeout();
        let event_tx = self.event_tx.clone();
        let task_id = task.id;
        let model_id = task.model_id.clone();

        match task.kind {
            TaskKind::EmbedDocument { relpath } => {
                let abs = task.folder.join(&relpath);
                tokio::spawn(async move {
                    let outcome = embed_document(&*handle, abs, relpath, model_id, timeout).await;
                    let _ = event_tx
                        .send(EngineEvent::EmbedFinished { task_id, outcome })
                        .await;
                });
            }
            TaskKind::EmbedQuery { text } => {
                tokio::spawn(async move {
                    let outcome = handle
                        .embed(vec![text], timeout)
                        .await
                        .map(|vectors| EmbeddedDocument {
                            relpath: PathBuf::new(),
                            vectors,
                            content_hash: String::new(),
                            size: 0,
                            mtime_epoch_ms: 0,
                            model_id,
                        })
                        .map_err(|e| e.into_embed_error());
                    let _ = event_tx
                        .send(EngineEvent::EmbedFinished { task_id, outcome })
                        .await;
                });
            }
            // run_task routes only embed kinds here
            _ => {
                self.task_workers.remove(&task_id);
                self.scheduler.complete(task_id);
            }
        }
    }

    pub(crate) fn on_embed_finished(
        &mut self,
        task_id: u64,
        outcome: Result<EmbeddedDocument, EmbedError>,
    ) {
        let Some(in_flight) = self.scheduler.complete(task_id) else { return };
        if let Some(worker_id) = self.task_workers.remove(&task_id) {
            self.finish_worker_use(&worker_id, in_flight.priority);
        }

        match in_flight.kind {
            InFlightKind::EmbedQuery => {
                // The window stays open for at least A after completion.
                self.extend_agent_active();
                if let Some(waiter) = self.search_waiters.remove(&task_id) {
                    let result = match &outcome {
                        Ok(_) => Ok(()),
                        Err(e) => Err(BusError::new(
                            ErrorKind::WorkerUnavailable,
                            format!("query embedding failed: {e}"),
                        )),
                    };
                    let _ = waiter.send(result);
                }
            }
            InFlightKind::Embed => {
                let folder = in_flight.folder.clone();
                let gone = in_flight.cancel.is_cancelled()
                    || self.folders.get(&folder).map(|rt| rt.removing).unwrap_or(true);
                if gone {
                    debug!(task_id, "discarding embed result for removed folder");
                    return;
                }

                match outcome {
                    Ok(doc) => {
                        // Front of the folder queue: the document's write
                        // happens before any further embed is admitted, so
                        // a model swap can never land mid-document.
                        let id = self.scheduler.next_task_id();
                        self.scheduler.requeue_front(Task {
                            id,
                            folder,
                            kind: TaskKind::WriteResults { doc },
                            model_id: in_flight.model_id,
                            priority: in_flight.priority,
                            enqueued_at_ms: self.clock.epoch_ms(),
                            cancel: in_flight.cancel,
                            attempts: 0,
                        });
                    }
                    Err(e)
                        if e.retryable()
                            && in_flight.priority == Priority::Background
                            && in_flight.attempts < self.scheduler.retry_limit() =>
                    {
                        let Some(relpath) = in_flight.relpath else { return };
                        debug!(
                            folder = %folder.display(),
                            relpath = %relpath.display(),
                            attempt = in_flight.attempts + 1,
                            "retrying embed after transient worker failure"
                        );
                        let id = self.scheduler.next_task_id();
                        self.scheduler.requeue_front(Task {
                            id,
                            folder,
                            kind: TaskKind::EmbedDocument { relpath },
                            model_id: in_flight.model_id,
                            priority: in_flight.priority,
                            enqueued_at_ms: self.clock.epoch_ms(),
                            cancel: in_flight.cancel,
                            attempts: in_flight.attempts + 1,
                        });
                    }
                    Err(e) => {
                        let relpath = in_flight
                            .relpath
                            .map(|p| p.display().to_string())
                            .unwrap_or_default();
                        self.fail_folder(&folder, format!("embedding failed for {relpath}: {e}"));
                    }
                }
            }
            _ => {}
        }
    }

    /// Run a document's store write plus fingerprint commit on the
    /// blocking pool. The fingerprint commits only after the store write
    /// has been made durable.
    pub(crate) fn spawn_write_task(&mut self, task: Task) {
        let Some(rt) = self.folders.get(&task.folder) else {
            self.scheduler.complete(task.id);
            return;
        };
        let TaskKind::WriteResults { doc } = task.kind else {
            self.scheduler.complete(task.id);
            return;
        };
        let table = rt.table.clone();
        let store = self.store.clone();
        let state_dir = self.registry.state_dir_for(&task.folder);
        let event_tx = self.event_tx.clone();
        let task_id = task.id;

        tokio::task::spawn_blocking(move || {
            let fingerprint = DocumentFingerprint {
                relpath: doc.relpath.clone(),
                content_hash: doc.content_hash.clone(),
                size: doc.size,
                mtime_epoch_ms: doc.mtime_epoch_ms,
                model_id: doc.model_id.clone(),
            };
            let outcome = store
                .write_document(&state_dir, &doc.relpath, &doc.model_id, &doc.vectors)
                .map_err(|e| e.to_string())
                .and_then(|()| {
                    table
                        .lock()
                        .commit(fingerprint)
                        .map_err(|e| e.to_string())
                });
            let _ = event_tx.blocking_send(EngineEvent::WriteFinished { task_id, outcome });
        });
    }

    /// Remove a document's vectors and fingerprint.
    pub(crate) fn spawn_remove_task(&mut self, task: Task) {
        let Some(rt) = self.folders.get(&task.folder) else {
            self.scheduler.complete(task.id);
            return;
        };
        let TaskKind::RemoveDocument { relpath } = task.kind else {
            self.scheduler.complete(task.id);
            return;
        };
        let table = rt.table.clone();
        let store = self.store.clone();
        let state_dir = self.registry.state_dir_for(&task.folder);
        let event_tx = self.event_tx.clone();
        let task_id = task.id;

        tokio::task::spawn_blocking(move || {
            let outcome = store
                .remove_document(&state_dir, &relpath)
                .map_err(|e| e.to_string())
                .and_then(|()| table.lock().forget(&relpath).map_err(|e| e.to_string()));
            let _ = event_tx.blocking_send(EngineEvent::RemoveFinished { task_id, outcome });
        });
    }

    /// A write or remove finished: advance the folder's episode.
    pub(crate) fn on_doc_committed(&mut self, task_id: u64, outcome: Result<(), String>) {
        let Some(in_flight) = self.scheduler.complete(task_id) else { return };
        if in_flight.cancel.is_cancelled() {
            return;
        }
        let folder = in_flight.folder.clone();

        {
            let Some(rt) = self.folders.get_mut(&folder) else { return };
            if rt.removing {
                return;
            }
            rt.episode_done += 1;
            if let Err(message) = &outcome {
                // Registry/store write failures are fatal to this document
                // only: the fingerprint was not committed, so the next scan
                // sees the document as changed and retries it.
                warn!(
                    folder = %folder.display(),
                    relpath = ?in_flight.relpath,
                    error = %message,
                    "document commit failed; it will be retried on the next scan"
                );
                rt.folder.notification = Some(Notification::warning(format!(
                    "some documents failed to index: {message}"
                )));
            }
        }

        self.update_progress(&folder);
        self.top_up_folder(&folder);

        let indexing = self
            .folders
            .get(&folder)
            .map(|rt| rt.folder.state == FolderState::Indexing)
            .unwrap_or(false);
        if indexing && self.episode_drained(&folder) {
            self.enter_active(&folder);
        }
    }
}

/// Read, hash, chunk, and embed one document.
async fn embed_document(
    handle: &dyn fidx_adapters::WorkerHandle,
    abs: PathBuf,
    relpath: PathBuf,
    model_id: fidx_core::ModelId,
    timeout: std::time::Duration,
) -> Result<EmbeddedDocument, EmbedError> {
    let bytes = tokio::fs::read(&abs)
        .await
        .map_err(|e| EmbedError::Document(format!("{}: {e}", abs.display())))?;
    let metadata = tokio::fs::metadata(&abs)
        .await
        .map_err(|e| EmbedError::Document(format!("{}: {e}", abs.display())))?;
    let mtime_epoch_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let content_hash = format!("{:x}", Sha256::digest(&bytes));
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let chunks = chunk_text(&text, MAX_CHUNK_CHARS);

    let vectors = if chunks.is_empty() {
        Vec::new()
    } else {
        handle
            .embed(chunks, timeout)
            .await
            .map_err(|e| e.into_embed_error())?
    };

    Ok(EmbeddedDocument {
        relpath,
        vectors,
        content_hash,
        size: metadata.len(),
        mtime_epoch_ms,
        model_id,
    })
}
