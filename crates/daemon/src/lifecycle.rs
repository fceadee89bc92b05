// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup, the engine loop, and graceful shutdown.
//!
//! `serve` is the whole daemon minus process concerns (args, logging,
//! signals, lock file), so workspace specs can run it in-process against
//! fake adapters.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fidx_core::{Clock, DaemonConfig, DaemonIdentity, ModelCatalog};
use fidx_engine::{Runtime, RuntimeDeps};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Notify};
use tracing::info;

use crate::fmdm::FmdmBroadcaster;
use crate::listener::{ListenCtx, Listener};

/// Errors during daemon startup and shutdown
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine a state directory (set FIDX_STATE_DIR or HOME)")]
    NoStateDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] fidx_core::ConfigError),

    #[error("model catalog error: {0}")]
    Catalog(String),

    #[error("another daemon already holds the lock at {0}")]
    LockFailed(String),

    #[error("engine error: {0}")]
    Engine(String),
}

/// Everything `serve` needs beyond the socket
pub struct ServeOptions<C: Clock> {
    pub config: DaemonConfig,
    pub catalog: ModelCatalog,
    pub deps: RuntimeDeps,
    pub clock: C,
    /// Cadence of the timer tick that fires engine deadlines
    pub timer_check: Duration,
    pub ipc_timeout: Duration,
}

/// Acquire the single-instance lock, writing this process's pid into it.
pub fn acquire_lock(path: &Path) -> Result<File, LifecycleError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(path.display().to_string()))?;
    file.set_len(0)?;
    use std::io::Write;
    writeln!(&file, "{}", std::process::id())?;
    Ok(file)
}

/// Run the daemon: listener, engine loop, FMDM publishing, shutdown.
pub async fn serve<C: Clock>(
    options: ServeOptions<C>,
    unix: UnixListener,
    shutdown: Arc<Notify>,
) -> Result<(), LifecycleError> {
    let ServeOptions { config, catalog, deps, clock, timer_check, ipc_timeout } = options;

    let identity = DaemonIdentity {
        pid: std::process::id(),
        started_at: chrono::Utc::now().to_rfc3339(),
    };
    let broadcaster = Arc::new(FmdmBroadcaster::new(identity, catalog.models.clone()));

    let (event_tx, mut event_rx) = mpsc::channel(1024);
    let (cmd_tx, mut cmd_rx) = mpsc::channel(64);

    let mut runtime = Runtime::new(config, clock, catalog, deps, event_tx)
        .map_err(|e| LifecycleError::Engine(e.to_string()))?;

    let ctx = Arc::new(ListenCtx {
        cmd_tx,
        broadcaster: Arc::clone(&broadcaster),
        shutdown: Arc::clone(&shutdown),
        ipc_timeout,
    });
    tokio::spawn(Listener::new(unix, ctx).run());

    // Recover the folder set; unchanged folders reach ACTIVE with zero
    // embed calls.
    runtime.restore().await;
    publish(&broadcaster, &mut runtime);

    info!("daemon ready");

    // NOTE: the interval must live outside the loop; recreating it per
    // iteration would reset on every event and starve the timers.
    let mut timer_tick = tokio::time::interval(timer_check);
    loop {
        tokio::select! {
            Some(cmd) = cmd_rx.recv() => {
                runtime.handle_command(cmd).await;
                publish(&broadcaster, &mut runtime);
            }

            Some(event) = event_rx.recv() => {
                runtime.handle_event(event).await;
                publish(&broadcaster, &mut runtime);
            }

            _ = timer_tick.tick() => {
                runtime.tick().await;
                publish(&broadcaster, &mut runtime);
            }

            _ = shutdown.notified() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    runtime.shutdown(&mut event_rx).await;
    info!("daemon stopped");
    Ok(())
}

/// Forward every queued engine publish to the broadcaster, in order.
fn publish<C: Clock>(broadcaster: &FmdmBroadcaster, runtime: &mut Runtime<C>) {
    for views in runtime.drain_publishes() {
        broadcaster.set_folders(views);
    }
}
