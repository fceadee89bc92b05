// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform file-watch adapter.
//!
//! The platform layer only reports "something under this root changed";
//! debouncing and coalescing are engine logic so tests can drive them with
//! a fake clock. Churn from the folder's own state directory is filtered
//! here, otherwise indexing would re-trigger itself.

use fidx_core::{EngineEvent, ReservedDir};
use notify::{RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors arming a watch
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),
}

/// Keeps a watch alive; dropping it disarms the watch.
pub trait WatchGuard: Send {}

/// Arms coarse change notification for a folder root
pub trait WatchAdapter: Send + Sync + 'static {
    fn watch(
        &self,
        folder: &Path,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn WatchGuard>, WatchError>;
}

/// Real watcher backed by the `notify` crate
pub struct NotifyWatch {
    reserved: ReservedDir,
}

impl NotifyWatch {
    pub fn new(reserved: ReservedDir) -> Self {
        Self { reserved }
    }
}

impl WatchAdapter for NotifyWatch {
    fn watch(
        &self,
        folder: &Path,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn WatchGuard>, WatchError> {
        let root = folder.to_path_buf();
        let state_dir = self.reserved.state_dir_for(folder);

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let Ok(event) = res else { return };
                let relevant = event.paths.is_empty()
                    || event.paths.iter().any(|p| !p.starts_with(&state_dir));
                if relevant {
                    // Lossy send: pings coalesce in the debounce window anyway
                    let _ = event_tx.try_send(EngineEvent::WatcherPing { folder: root.clone() });
                }
            })?;
        watcher.watch(folder, RecursiveMode::Recursive)?;

        Ok(Box::new(NotifyGuard { _watcher: watcher }))
    }
}

struct NotifyGuard {
    _watcher: notify::RecommendedWatcher,
}

impl WatchGuard for NotifyGuard {}

/// Fake watcher for deterministic tests
#[cfg(any(test, feature = "test-support"))]
pub use fake_watch::FakeWatch;

#[cfg(any(test, feature = "test-support"))]
mod fake_watch {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeWatchState {
        watched: HashMap<PathBuf, mpsc::Sender<EngineEvent>>,
    }

    /// Test watcher: records armed folders and fires pings on demand.
    #[derive(Clone, Default)]
    pub struct FakeWatch {
        inner: Arc<Mutex<FakeWatchState>>,
    }

    impl FakeWatch {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_watching(&self, folder: &Path) -> bool {
            self.inner.lock().watched.contains_key(folder)
        }

        /// Deliver a raw watcher ping for a folder
        pub async fn fire(&self, folder: &Path) {
            let tx = self.inner.lock().watched.get(folder).cloned();
            if let Some(tx) = tx {
                let _ = tx
                    .send(EngineEvent::WatcherPing { folder: folder.to_path_buf() })
                    .await;
            }
        }
    }

    impl WatchAdapter for FakeWatch {
        fn watch(
            &self,
            folder: &Path,
            event_tx: mpsc::Sender<EngineEvent>,
        ) -> Result<Box<dyn WatchGuard>, WatchError> {
            self.inner.lock().watched.insert(folder.to_path_buf(), event_tx);
            Ok(Box::new(FakeGuard {
                inner: Arc::clone(&self.inner),
                folder: folder.to_path_buf(),
            }))
        }
    }

    struct FakeGuard {
        inner: Arc<Mutex<FakeWatchState>>,
        folder: PathBuf,
    }

    impl Drop for FakeGuard {
        fn drop(&mut self) {
            self.inner.lock().watched.remove(&self.folder);
        }
    }

    impl WatchGuard for FakeGuard {}
}
