// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker supervision: keep-alive, restart, model restore, fatal faults.

use super::*;
use fidx_adapters::embedder::EmbedderCall;
use fidx_adapters::WorkerError;
use fidx_core::WorkerId;

const K: Duration = Duration::from_secs(60);

fn spawned_worker(rig: &Rig) -> WorkerId {
    rig.embedder
        .calls()
        .iter()
        .find_map(|c| match c {
            EmbedderCall::Spawn { worker } => Some(worker.clone()),
            _ => None,
        })
        .expect("a worker should have been spawned")
}

async fn active_folder(rig: &mut Rig) -> PathBuf {
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha"), ("b.txt", "beta")]);
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    folder
}

#[tokio::test]
async fn transient_worker_failure_retries_the_document() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha")]);

    rig.embedder.fail_next_embed(WorkerError::Closed);
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 1);
    assert_eq!(rig.embedder.embed_calls(), 2, "one failure plus one successful retry");
}

#[tokio::test]
async fn dead_worker_restarts_and_restores_its_model() {
    let mut rig = Rig::new();
    let _folder = active_folder(&mut rig).await;
    let worker = spawned_worker(&rig);
    let loads_before = rig.embedder.loaded_models().len();

    rig.embedder.emit_exit(&worker, None).await;
    rig.settle().await;

    // Dead until the restart delay elapses.
    assert_eq!(rig.runtime.live_worker_count(), 0);

    rig.advance(Duration::from_millis(100)).await;

    assert_eq!(rig.runtime.live_worker_count(), 1);
    let loads = rig.embedder.loaded_models();
    assert_eq!(loads.len(), loads_before + 1, "the last model is reloaded after restart");
    assert_eq!(loads.last().unwrap().as_str(), MODEL);
}

#[tokio::test]
async fn restarts_are_bounded() {
    let mut rig = Rig::new();
    let _folder = active_folder(&mut rig).await;
    let worker = spawned_worker(&rig);

    // Kill it once per allowed attempt, plus once more.
    for _ in 0..4 {
        rig.embedder.emit_exit(&worker, Some(1)).await;
        rig.settle().await;
        rig.advance(Duration::from_millis(100)).await;
    }

    // The original worker has been given up on; only a fresh spawn (new
    // worker id) could serve future work.
    let respawns = rig
        .embedder
        .calls()
        .iter()
        .filter(|c| matches!(c, EmbedderCall::Spawn { worker: w } if *w == worker))
        .count();
    assert!(respawns <= 4, "restart attempts must be bounded, saw {respawns}");
}

#[tokio::test]
async fn dimension_change_across_restart_is_fatal() {
    let mut rig = Rig::new();
    let _folder = active_folder(&mut rig).await;
    let worker = spawned_worker(&rig);

    // The same model id suddenly reports a different dimensionality.
    rig.embedder.set_dims(&ModelId::new(MODEL), 16);
    rig.embedder.emit_exit(&worker, None).await;
    rig.settle().await;
    rig.advance(Duration::from_millis(100)).await;

    // The restarted worker reloaded the model, the mismatch was detected,
    // and the worker was killed rather than trusted.
    assert!(
        rig.embedder.calls().iter().any(|c| matches!(c, EmbedderCall::Kill { .. })),
        "a dimensionality mismatch must kill the worker"
    );
}

#[tokio::test]
async fn keep_alive_holds_the_model_until_expiry() {
    let mut rig = Rig::new();
    let folder = active_folder(&mut rig).await;

    // An interactive search pins the model.
    let reply = rig.search(&folder, "needle").await;
    rig.settle().await;
    assert_eq!(reply.await.unwrap(), Ok(()));

    // Before K the model must remain loaded.
    rig.advance(K / 2).await;
    assert_eq!(
        rig.runtime.worker_models(),
        vec![Some(ModelId::new(MODEL))],
        "model unloaded before the keep-alive window expired"
    );

    // After K it may be (and here is) released.
    rig.advance(K).await;
    assert_eq!(rig.runtime.worker_models(), vec![None]);
}

#[tokio::test]
async fn unhealthy_probe_recycles_the_worker() {
    let mut rig = Rig::new();
    let _folder = active_folder(&mut rig).await;
    let worker = spawned_worker(&rig);

    rig.embedder.set_health_failing(true);
    rig.runtime
        .handle_event(EngineEvent::TimerFired { key: fidx_core::TimerKey::HealthProbe(worker) })
        .await;
    rig.settle().await;

    assert!(
        rig.embedder.calls().iter().any(|c| matches!(c, EmbedderCall::Kill { .. })),
        "an unhealthy worker must be killed for restart"
    );
}

#[tokio::test]
async fn graceful_shutdown_drains_workers() {
    let mut rig = Rig::new();
    let _folder = active_folder(&mut rig).await;
    assert_eq!(rig.runtime.live_worker_count(), 1);

    let Rig { mut runtime, mut event_rx, embedder, .. } = rig;
    runtime.shutdown(&mut event_rx).await;

    assert!(
        embedder.calls().iter().any(|c| matches!(c, EmbedderCall::Shutdown { .. })),
        "workers receive a graceful shutdown request"
    );
    assert_eq!(runtime.live_worker_count(), 0);
}
