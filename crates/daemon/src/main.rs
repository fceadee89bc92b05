// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fidx daemon (fidxd)
//!
//! Background process that mirrors managed folders into per-folder vector
//! stores and broadcasts the FMDM to control clients.
//!
//! Architecture:
//! - Listener task: socket I/O, forwards commands to the engine loop
//! - Engine loop: processes commands, completion events, and timers
//!   sequentially; every state change is published via the broadcaster

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use fidx_adapters::{FileVectorStore, NotifyWatch, ProcessEmbedder};
use fidx_core::{DaemonConfig, ModelCatalog, SystemClock};
use fidx_daemon::lifecycle::{self, LifecycleError, ServeOptions};
use fidx_daemon::{env, serve};
use fidx_engine::RuntimeDeps;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("fidxd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("fidxd {}", env!("CARGO_PKG_VERSION"));
                println!("fidx daemon - keeps managed folders mirrored into vector stores");
                println!();
                println!("USAGE:");
                println!("    fidxd");
                println!();
                println!("The daemon is typically started by the `fidx` CLI and should not");
                println!("be invoked directly. It listens on a Unix socket for commands.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: fidxd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let state_dir = env::state_dir()?;
    std::fs::create_dir_all(&state_dir)?;

    let mut config = DaemonConfig::load(&state_dir.join("config.toml"))?;
    config.state_dir = state_dir;
    if let Some(cmd) = env::embedder_cmd() {
        config.embedder_cmd = cmd;
    }

    rotate_log_if_needed(&config.log_path());
    let _log_guard = setup_logging(&config)?;

    info!("starting fidxd");

    // Single instance per state directory
    let _lock = match lifecycle::acquire_lock(&config.lock_path()) {
        Ok(lock) => lock,
        Err(LifecycleError::LockFailed(path)) => {
            eprintln!("fidxd is already running (lock: {path})");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let catalog = ModelCatalog::load(&config.models_path())
        .map_err(|e| LifecycleError::Catalog(e.to_string()))?;

    // A stale socket from an unclean exit blocks bind; the lock file
    // already guarantees we are the only live daemon.
    let socket_path = config.socket_path();
    let _ = std::fs::remove_file(&socket_path);
    let unix = UnixListener::bind(&socket_path)?;

    let deps = RuntimeDeps {
        embedder: Arc::new(ProcessEmbedder::new(config.embedder_cmd.clone())),
        watcher: Arc::new(NotifyWatch::new(config.reserved_dir.clone())),
        store: Arc::new(FileVectorStore::new()),
    };

    let shutdown = Arc::new(Notify::new());
    spawn_signal_handler(Arc::clone(&shutdown))?;

    info!("listening on {}", socket_path.display());
    println!("READY");

    let options = ServeOptions {
        config,
        catalog,
        deps,
        clock: SystemClock,
        timer_check: env::timer_check_interval(),
        ipc_timeout: env::ipc_timeout(),
    };
    if let Err(e) = serve(options, unix, shutdown).await {
        error!("daemon failed: {}", e);
        return Err(e.into());
    }

    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

/// SIGTERM/SIGINT request the same graceful shutdown as the control bus.
fn spawn_signal_handler(shutdown: Arc<Notify>) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        shutdown.notify_one();
    });
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (fidxd.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Best-effort: rotation failures are silently ignored so the daemon
/// still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &DaemonConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_path = config.log_path();
    let parent = log_path.parent().ok_or(LifecycleError::NoStateDir)?;
    std::fs::create_dir_all(parent)?;

    let file_appender = tracing_appender::rolling::never(
        parent,
        log_path.file_name().ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
