// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool management: spawn, model residency, keep-alive and
//! agent-active windows, health probing, and bounded auto-restart.

use super::Runtime;
use crate::pool::{WorkerEntry, WorkerState};
use fidx_core::{
    BusError, Clock, EngineEvent, ErrorKind, ModelId, TimerKey, WorkerHealth, WorkerId,
};
use tracing::{error, info, warn};

impl<C: Clock> Runtime<C> {
    /// Spawn a fresh worker process. Returns false when spawning failed or
    /// the daemon is draining.
    pub(crate) async fn spawn_worker(&mut self) -> bool {
        if self.draining {
            return false;
        }
        let worker = WorkerId::generate();
        match self.embedder.spawn(worker.clone(), self.event_tx.clone()).await {
            Ok(handle) => {
                info!(%worker, "embedder worker spawned");
                let mut entry = WorkerEntry::new(worker.clone(), handle);
                entry.state = WorkerState::Ready;
                self.pool.add(entry);
                let now = self.clock.now();
                self.timers.set_after(
                    TimerKey::HealthProbe(worker),
                    now,
                    self.config.worker.health_probe(),
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn embedder worker");
                // Don't leave interactive callers hanging on a worker that
                // will never exist.
                self.fail_queued_immediate(&format!("embedder unavailable: {e}"));
                false
            }
        }
    }

    /// Start a `load_model` on a worker; residency flips to the new model
    /// only once the worker confirms.
    pub(crate) fn begin_load(&mut self, worker: WorkerId, model_id: ModelId) -> bool {
        let timeout = self.config.worker.request_timeout();
        let Some(entry) = self.pool.get_mut(&worker) else { return false };
        if !matches!(entry.state, WorkerState::Ready | WorkerState::Idle(_)) {
            return false;
        }
        let Some(handle) = entry.handle.clone() else { return false };

        info!(%worker, model = %model_id, "loading model");
        entry.state = WorkerState::LoadingModel(model_id.clone());

        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = handle
                .load_model(&model_id, timeout)
                .await
                .map_err(|e| e.to_string());
            let _ = event_tx
                .send(EngineEvent::ModelLoaded { worker, model_id, outcome })
                .await;
        });
        true
    }

    pub(crate) fn on_model_loaded(
        &mut self,
        worker: WorkerId,
        model_id: ModelId,
        outcome: Result<usize, String>,
    ) {
        match outcome {
            Ok(dims) => {
                if let Some(&previous) = self.model_dims.get(&model_id) {
                    if previous != dims {
                        // Same model id reporting a different dimensionality
                        // would silently corrupt every stored vector.
                        error!(
                            %worker,
                            model = %model_id,
                            previous,
                            reported = dims,
                            "model dimensionality changed across restarts; fatal worker fault"
                        );
                        if let Some(entry) = self.pool.get_mut(&worker) {
                            entry.restart_count = self.config.worker.max_restart_attempts;
                            if let Some(handle) = &entry.handle {
                                handle.kill();
                            }
                        }
                        return;
                    }
                }
                self.model_dims.insert(model_id.clone(), dims);
                self.catalog.set_dimensions(&model_id, dims);

                if let Some(entry) = self.pool.get_mut(&worker) {
                    if matches!(entry.state, WorkerState::LoadingModel(_)) {
                        entry.state = WorkerState::Idle(model_id.clone());
                        entry.last_model = Some(model_id);
                    }
                }
            }
            Err(message) => {
                warn!(%worker, model = %model_id, error = %message, "model load failed, recycling worker");
                if let Some(entry) = self.pool.get(&worker) {
                    if let Some(handle) = &entry.handle {
                        // The exit event drives the restart policy.
                        handle.kill();
                    }
                }
            }
        }
    }

    /// An embed finished on a worker: back to idle, with the keep-alive
    /// pin refreshed only by interactive work.
    pub(crate) fn finish_worker_use(&mut self, worker: &WorkerId, priority: crate::scheduler::Priority) {
        let now_ms = self.clock.epoch_ms();
        let keep_alive = self.config.worker.keep_alive();
        let interactive = priority >= crate::scheduler::Priority::Interactive;

        let refreshed = {
            let Some(entry) = self.pool.get_mut(worker) else { return };
            if let WorkerState::Busy(model) = entry.state.clone() {
                entry.state = WorkerState::Idle(model);
            }
            entry.last_used_ms = now_ms;
            if interactive {
                entry.pinned_until_ms = now_ms + keep_alive.as_millis() as u64;
            }
            interactive
        };

        if refreshed {
            let now = self.clock.now();
            self.timers
                .set_after(TimerKey::KeepAlive(worker.clone()), now, keep_alive);
        }
    }

    /// Keep-alive expired: the model may be unloaded.
    pub(crate) fn on_keep_alive_expired(&mut self, worker: &WorkerId) {
        let now_ms = self.clock.epoch_ms();
        let Some(entry) = self.pool.get_mut(worker) else { return };
        match &entry.state {
            WorkerState::Idle(model) if now_ms >= entry.pinned_until_ms => {
                info!(%worker, model = %model, "keep-alive expired, releasing model residency");
                entry.last_model = Some(model.clone());
                entry.state = WorkerState::Ready;
            }
            // Busy or loading: the next completion re-arms as needed.
            _ => {}
        }
    }

    /// Arm (or extend) the agent-active window and pause background
    /// admission. Called when an IMMEDIATE request is accepted and again
    /// when one completes.
    pub(crate) fn extend_agent_active(&mut self) {
        self.scheduler.set_background_paused(true);
        let now = self.clock.now();
        self.timers
            .set_after(TimerKey::AgentActive, now, self.config.worker.agent_active());
    }

    /// Agent-active window expired: resume background admission unless an
    /// IMMEDIATE request is still in flight (its completion re-arms).
    pub(crate) fn on_agent_active_expired(&mut self) {
        if self.scheduler.immediate_in_flight() {
            return;
        }
        info!("agent-active window expired, resuming background admission");
        self.scheduler.set_background_paused(false);
    }

    pub(crate) fn start_health_probe(&mut self, worker: &WorkerId) {
        let timeout = self.config.worker.request_timeout();
        let Some(entry) = self.pool.get(worker) else { return };
        if !entry.is_live() {
            return;
        }
        let Some(handle) = entry.handle.clone() else { return };

        let event_tx = self.event_tx.clone();
        let worker = worker.clone();
        tokio::spawn(async move {
            let started = std::time::Instant::now();
            let status = match handle.health(timeout).await {
                Ok(()) if started.elapsed() > timeout / 2 => WorkerHealth::Degraded,
                Ok(()) => WorkerHealth::Healthy,
                Err(_) => WorkerHealth::Unhealthy,
            };
            let _ = event_tx
                .send(EngineEvent::HealthReport { worker, status })
                .await;
        });
    }

    pub(crate) fn on_health_report(&mut self, worker: WorkerId, status: WorkerHealth) {
        match status {
            WorkerHealth::Healthy => {}
            WorkerHealth::Degraded => {
                warn!(%worker, "worker is responding slowly");
            }
            WorkerHealth::Unhealthy => {
                warn!(%worker, "worker unresponsive, killing for restart");
                if let Some(entry) = self.pool.get(&worker) {
                    if let Some(handle) = &entry.handle {
                        handle.kill();
                    }
                }
                return;
            }
        }
        // Re-arm the probe after each report so probes never overlap.
        let now = self.clock.now();
        self.timers.set_after(
            TimerKey::HealthProbe(worker),
            now,
            self.config.worker.health_probe(),
        );
    }

    pub(crate) fn on_worker_exited(&mut self, worker: WorkerId, code: Option<i32>) {
        self.timers.cancel(&TimerKey::KeepAlive(worker.clone()));
        self.timers.cancel(&TimerKey::HealthProbe(worker.clone()));

        let (expected, restart_count) = {
            let Some(entry) = self.pool.get_mut(&worker) else { return };
            let expected = self.draining || matches!(entry.state, WorkerState::Draining);
            entry.state = WorkerState::Dead;
            entry.handle = None;
            (expected, entry.restart_count)
        };

        if expected {
            self.pool.remove(&worker);
            return;
        }

        let config = &self.config.worker;
        if config.auto_restart && restart_count < config.max_restart_attempts {
            info!(
                %worker,
                ?code,
                attempt = restart_count + 1,
                "worker exited unexpectedly, scheduling restart"
            );
            let now = self.clock.now();
            let delay = self.config.worker.restart_delay();
            self.timers
                .set_after(TimerKey::WorkerRestart(worker), now, delay);
        } else {
            self.give_up_worker(&worker);
        }
    }

    /// Restart-delay timer fired: respawn the process and restore its last
    /// loaded model.
    pub(crate) async fn respawn_worker(&mut self, worker: WorkerId) {
        if self.draining {
            return;
        }
        let last_model = {
            let Some(entry) = self.pool.get_mut(&worker) else { return };
            if !matches!(entry.state, WorkerState::Dead) {
                return;
            }
            entry.restart_count += 1;
            entry.last_model.clone()
        };

        match self.embedder.spawn(worker.clone(), self.event_tx.clone()).await {
            Ok(handle) => {
                info!(%worker, "worker restarted");
                if let Some(entry) = self.pool.get_mut(&worker) {
                    entry.handle = Some(handle);
                    entry.state = WorkerState::Ready;
                }
                let now = self.clock.now();
                self.timers.set_after(
                    TimerKey::HealthProbe(worker.clone()),
                    now,
                    self.config.worker.health_probe(),
                );
                if let Some(model_id) = last_model {
                    self.begin_load(worker, model_id);
                }
            }
            Err(e) => {
                let (count, max) = {
                    let Some(entry) = self.pool.get(&worker) else { return };
                    (entry.restart_count, self.config.worker.max_restart_attempts)
                };
                warn!(%worker, error = %e, attempt = count, "worker respawn failed");
                if count < max {
                    let now = self.clock.now();
                    let delay = self.config.worker.restart_delay();
                    self.timers
                        .set_after(TimerKey::WorkerRestart(worker), now, delay);
                } else {
                    self.give_up_worker(&worker);
                }
            }
        }
    }

    /// Restart attempts exhausted: drop the worker and surface the outage
    /// to interactive callers.
    pub(crate) fn give_up_worker(&mut self, worker: &WorkerId) {
        error!(%worker, "giving up on embedder worker after repeated failures");
        if let Some(entry) = self.pool.remove(worker) {
            if let Some(handle) = entry.handle {
                handle.kill();
            }
        }
        self.timers.cancel(&TimerKey::KeepAlive(worker.clone()));
        self.timers.cancel(&TimerKey::HealthProbe(worker.clone()));
        self.timers.cancel(&TimerKey::WorkerRestart(worker.clone()));
        self.fail_queued_immediate("embedder worker unavailable");
    }

    fn fail_queued_immediate(&mut self, message: &str) {
        for task in self.scheduler.drain_immediate() {
            if let Some(waiter) = self.search_waiters.remove(&task.id) {
                let _ = waiter.send(Err(BusError::new(ErrorKind::WorkerUnavailable, message)));
            }
        }
    }
}
