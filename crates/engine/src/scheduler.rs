// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task queue and admission control.
//!
//! Three priority bands with FIFO order inside a band, except background
//! embed work which round-robins across folders sharing the pool so
//! progress advances in parallel. Admission rules enforced here:
//! a folder's scan excludes its embeds (and vice versa), background
//! admission pauses while an agent-active window is open, and per-folder
//! pending queues are bounded so discovery can throttle.

use fidx_core::{EmbeddedDocument, ModelId, SchedulerConfig};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Priority class; higher wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Background,
    Interactive,
    Immediate,
}

/// What a task does when dispatched
#[derive(Debug)]
pub enum TaskKind {
    /// Walk the folder and compute its change set
    Scan,
    /// Embed one document's content
    EmbedDocument { relpath: PathBuf },
    /// Embed a search query (routing only; no store write)
    EmbedQuery { text: String },
    /// Write vectors and commit the fingerprint for one document
    WriteResults { doc: EmbeddedDocument },
    /// Remove one document's vectors and fingerprint
    RemoveDocument { relpath: PathBuf },
}

impl TaskKind {
    pub fn needs_worker(&self) -> bool {
        matches!(self, TaskKind::EmbedDocument { .. } | TaskKind::EmbedQuery { .. })
    }

    /// Document-pipeline tasks occupy the folder's scheduler slot; query
    /// embeds do not touch fingerprints and are exempt.
    fn uses_folder_slot(&self) -> bool {
        !matches!(self, TaskKind::EmbedQuery { .. })
    }

    fn in_flight_kind(&self) -> InFlightKind {
        match self {
            TaskKind::Scan => InFlightKind::Scan,
            TaskKind::EmbedDocument { .. } => InFlightKind::Embed,
            TaskKind::EmbedQuery { .. } => InFlightKind::EmbedQuery,
            TaskKind::WriteResults { .. } => InFlightKind::Write,
            TaskKind::RemoveDocument { .. } => InFlightKind::Remove,
        }
    }
}

/// A schedulable unit of work
#[derive(Debug)]
pub struct Task {
    pub id: u64,
    pub folder: PathBuf,
    pub kind: TaskKind,
    pub model_id: ModelId,
    pub priority: Priority,
    pub enqueued_at_ms: u64,
    pub cancel: CancellationToken,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InFlightKind {
    Scan,
    Embed,
    EmbedQuery,
    Write,
    Remove,
}

/// Skeleton of a dispatched task, kept until its completion event
#[derive(Debug)]
pub struct InFlight {
    pub folder: PathBuf,
    pub kind: InFlightKind,
    pub model_id: ModelId,
    pub priority: Priority,
    pub cancel: CancellationToken,
    pub attempts: u32,
    pub relpath: Option<PathBuf>,
}

/// Verdict from the runtime on whether a task can run right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDispatch {
    Run,
    /// Resources busy; leave queued
    Wait,
    /// A worker must load the task's model first; leave queued
    NeedsModel,
}

/// The central cooperative scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    next_id: u64,
    immediate: VecDeque<Task>,
    interactive: VecDeque<Task>,
    background: Vec<(PathBuf, VecDeque<Task>)>,
    rr_next: usize,
    in_flight: HashMap<u64, InFlight>,
    background_paused: bool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            next_id: 0,
            immediate: VecDeque::new(),
            interactive: VecDeque::new(),
            background: Vec::new(),
            rr_next: 0,
            in_flight: HashMap::new(),
            background_paused: false,
        }
    }

    pub fn next_task_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn enqueue(&mut self, task: Task) {
        match task.priority {
            Priority::Immediate => self.immediate.push_back(task),
            Priority::Interactive => self.interactive.push_back(task),
            Priority::Background => self.folder_queue(task.folder.clone()).push_back(task),
        }
    }

    /// Put a task back at the front of its queue (retry path)
    pub fn requeue_front(&mut self, task: Task) {
        match task.priority {
            Priority::Immediate => self.immediate.push_front(task),
            Priority::Interactive => self.interactive.push_front(task),
            Priority::Background => self.folder_queue(task.folder.clone()).push_front(task),
        }
    }

    fn folder_queue(&mut self, folder: PathBuf) -> &mut VecDeque<Task> {
        if let Some(index) = self.background.iter().position(|(f, _)| *f == folder) {
            return &mut self.background[index].1;
        }
        self.background.push((folder, VecDeque::new()));
        let last = self.background.len() - 1;
        &mut self.background[last].1
    }

    /// Pending tasks for a folder across every band
    pub fn pending_for_folder(&self, folder: &Path) -> usize {
        let in_band = |q: &VecDeque<Task>| q.iter().filter(|t| t.folder == folder).count();
        in_band(&self.immediate)
            + in_band(&self.interactive)
            + self
                .background
                .iter()
                .find(|(f, _)| f == folder)
                .map(|(_, q)| q.len())
                .unwrap_or(0)
    }

    /// Backpressure check: may more document work be enqueued for a folder?
    pub fn has_folder_capacity(&self, folder: &Path) -> bool {
        self.pending_for_folder(folder) < self.config.folder_queue_limit
    }

    pub fn set_background_paused(&mut self, paused: bool) {
        self.background_paused = paused;
    }

    pub fn background_paused(&self) -> bool {
        self.background_paused
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight(&self, task_id: u64) -> Option<&InFlight> {
        self.in_flight.get(&task_id)
    }

    pub fn retry_limit(&self) -> u32 {
        self.config.background_retry_limit
    }

    fn scan_active(&self, folder: &Path) -> bool {
        self.in_flight
            .values()
            .any(|t| t.folder == folder && t.kind == InFlightKind::Scan)
    }

    fn pipeline_active(&self, folder: &Path) -> bool {
        self.in_flight
            .values()
            .any(|t| t.folder == folder && t.kind != InFlightKind::EmbedQuery)
    }

    /// Store writes and fingerprint commits are serialized per folder:
    /// both mutate single files owned by that folder.
    fn commit_active(&self, folder: &Path) -> bool {
        self.in_flight.values().any(|t| {
            t.folder == folder
                && matches!(t.kind, InFlightKind::Write | InFlightKind::Remove)
        })
    }

    /// Slot rules: a scan requires the folder pipeline to be quiet;
    /// document tasks require no scan in flight for their folder; commits
    /// additionally exclude each other per folder.
    fn slot_free(&self, task: &Task) -> bool {
        if !task.kind.uses_folder_slot() {
            return true;
        }
        match task.kind {
            TaskKind::Scan => !self.pipeline_active(&task.folder),
            TaskKind::WriteResults { .. } | TaskKind::RemoveDocument { .. } => {
                !self.scan_active(&task.folder) && !self.commit_active(&task.folder)
            }
            _ => !self.scan_active(&task.folder),
        }
    }

    /// Pop the next dispatchable task, highest band first.
    ///
    /// `verdict` tells the scheduler whether the runtime can actually run a
    /// candidate (worker availability). When a higher-band task is blocked
    /// on a worker, lower bands may not steal the worker: only their
    /// non-worker tasks remain eligible.
    pub fn pop_next(&mut self, mut verdict: impl FnMut(&Task) -> CanDispatch) -> Option<Task> {
        if self.in_flight.len() >= self.config.max_concurrent_tasks {
            return None;
        }

        let mut worker_reserved = false;

        for band in [Band::Immediate, Band::Interactive] {
            if let Some(task) = self.pop_from_band(band, &mut verdict, &mut worker_reserved) {
                return Some(task);
            }
        }

        self.pop_background(&mut verdict, worker_reserved)
    }

    fn pop_from_band(
        &mut self,
        band: Band,
        verdict: &mut impl FnMut(&Task) -> CanDispatch,
        worker_reserved: &mut bool,
    ) -> Option<Task> {
        let len = match band {
            Band::Immediate => self.immediate.len(),
            Band::Interactive => self.interactive.len(),
        };

        for index in 0..len {
            let (slot_free, needs_worker, blocked) = {
                let queue = match band {
                    Band::Immediate => &self.immediate,
                    Band::Interactive => &self.interactive,
                };
                let task = &queue[index];
                let needs_worker = task.kind.needs_worker();
                if needs_worker && *worker_reserved {
                    (false, needs_worker, true)
                } else {
                    (self.slot_free(task), needs_worker, false)
                }
            };

            if blocked || !slot_free {
                continue;
            }

            let queue = match band {
                Band::Immediate => &self.immediate,
                Band::Interactive => &self.interactive,
            };
            match verdict(&queue[index]) {
                CanDispatch::Run => {
                    let queue = match band {
                        Band::Immediate => &mut self.immediate,
                        Band::Interactive => &mut self.interactive,
                    };
                    let task = queue.remove(index)?;
                    self.mark_in_flight(&task);
                    return Some(task);
                }
                CanDispatch::Wait | CanDispatch::NeedsModel => {
                    if needs_worker {
                        *worker_reserved = true;
                    }
                }
            }
        }
        None
    }

    fn pop_background(
        &mut self,
        verdict: &mut impl FnMut(&Task) -> CanDispatch,
        worker_reserved: bool,
    ) -> Option<Task> {
        let folders = self.background.len();
        for offset in 0..folders {
            let index = (self.rr_next + offset) % folders.max(1);

            let front_ok = {
                let (_, queue) = &self.background[index];
                match queue.front() {
                    None => false,
                    Some(task) => {
                        let admit_new = !self.background_paused
                            || matches!(
                                task.kind,
                                TaskKind::WriteResults { .. } | TaskKind::RemoveDocument { .. }
                            );
                        admit_new
                            && !(task.kind.needs_worker() && worker_reserved)
                            && self.slot_free(task)
                    }
                }
            };
            if !front_ok {
                continue;
            }

            let run = {
                let (_, queue) = &self.background[index];
                match queue.front() {
                    Some(task) => matches!(verdict(task), CanDispatch::Run),
                    None => false,
                }
            };
            if run {
                let (_, queue) = &mut self.background[index];
                let task = queue.pop_front()?;
                self.rr_next = (index + 1) % folders;
                self.mark_in_flight(&task);
                return Some(task);
            }
        }
        None
    }

    fn mark_in_flight(&mut self, task: &Task) {
        let relpath = match &task.kind {
            TaskKind::EmbedDocument { relpath } | TaskKind::RemoveDocument { relpath } => {
                Some(relpath.clone())
            }
            TaskKind::WriteResults { doc } => Some(doc.relpath.clone()),
            _ => None,
        };
        self.in_flight.insert(
            task.id,
            InFlight {
                folder: task.folder.clone(),
                kind: task.kind.in_flight_kind(),
                model_id: task.model_id.clone(),
                priority: task.priority,
                cancel: task.cancel.clone(),
                attempts: task.attempts,
                relpath,
            },
        );
    }

    /// Record completion; returns the in-flight skeleton.
    pub fn complete(&mut self, task_id: u64) -> Option<InFlight> {
        self.in_flight.remove(&task_id)
    }

    /// Drop all pending tasks for a folder and cancel its in-flight ones
    /// (their results are discarded at completion). Returns the dropped
    /// pending tasks so the caller can resolve any attached waiters.
    pub fn cancel_folder(&mut self, folder: &Path) -> Vec<Task> {
        let mut dropped = Vec::new();
        for queue in [&mut self.immediate, &mut self.interactive] {
            let mut index = 0;
            while index < queue.len() {
                if queue[index].folder == folder {
                    if let Some(task) = queue.remove(index) {
                        task.cancel.cancel();
                        dropped.push(task);
                    }
                } else {
                    index += 1;
                }
            }
        }
        if let Some(index) = self.background.iter().position(|(f, _)| f == folder) {
            let (_, queue) = self.background.remove(index);
            for task in queue {
                task.cancel.cancel();
                dropped.push(task);
            }
            if self.rr_next > index {
                self.rr_next -= 1;
            }
        }
        for in_flight in self.in_flight.values() {
            if in_flight.folder == folder {
                in_flight.cancel.cancel();
            }
        }
        dropped
    }

    /// Whether a folder has any queued or in-flight document-pipeline work
    pub fn folder_idle(&self, folder: &Path) -> bool {
        self.pending_for_folder(folder) == 0 && !self.pipeline_active(folder)
    }

    /// Drain all queued IMMEDIATE tasks (used when no worker can be
    /// obtained at all, to fail their callers instead of hanging them).
    pub fn drain_immediate(&mut self) -> Vec<Task> {
        self.immediate.drain(..).collect()
    }

    /// Any in-flight IMMEDIATE task (used to decide agent-active expiry)
    pub fn immediate_in_flight(&self) -> bool {
        self.in_flight
            .values()
            .any(|t| t.priority == Priority::Immediate)
    }

    /// Total queued tasks (all bands)
    pub fn pending_count(&self) -> usize {
        self.immediate.len()
            + self.interactive.len()
            + self.background.iter().map(|(_, q)| q.len()).sum::<usize>()
    }
}

#[derive(Clone, Copy)]
enum Band {
    Immediate,
    Interactive,
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
