// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FMDM broadcaster: the single owner of the authoritative snapshot.
//!
//! Mutations happen under an exclusive lock and produce a fresh immutable
//! snapshot pushed onto a `watch` channel: every subscriber observes the
//! same total order, slow subscribers skip straight to the latest value,
//! and the final snapshot of a sequence is never lost.

use fidx_core::{ClientInfo, ClientKind, CuratedModel, DaemonIdentity, Fmdm, FolderView};
use parking_lot::Mutex;
use tokio::sync::watch;

/// Owns the current FMDM snapshot and fans it out
pub struct FmdmBroadcaster {
    current: Mutex<Fmdm>,
    tx: watch::Sender<Fmdm>,
}

impl FmdmBroadcaster {
    pub fn new(daemon: DaemonIdentity, curated_models: Vec<CuratedModel>) -> Self {
        let initial = Fmdm::new(daemon, curated_models);
        let (tx, _) = watch::channel(initial.clone());
        Self { current: Mutex::new(initial), tx }
    }

    /// Apply a mutation and publish the resulting snapshot.
    ///
    /// Re-publishing an identical snapshot is skipped.
    pub fn update(&self, mutate: impl FnOnce(&mut Fmdm)) {
        let next = {
            let mut current = self.current.lock();
            let before = current.clone();
            mutate(&mut current);
            if *current == before {
                return;
            }
            current.clone()
        };
        let _ = self.tx.send(next);
    }

    /// Current snapshot plus a receiver for every subsequent one.
    pub fn subscribe(&self) -> (Fmdm, watch::Receiver<Fmdm>) {
        let snapshot = self.current.lock().clone();
        (snapshot, self.tx.subscribe())
    }

    pub fn snapshot(&self) -> Fmdm {
        self.current.lock().clone()
    }

    /// Replace the folder list (the engine is the only caller).
    pub fn set_folders(&self, folders: Vec<FolderView>) {
        self.update(|fmdm| fmdm.folders = folders);
    }

    pub fn client_connected(&self, kind: ClientKind) {
        self.update(|fmdm| fmdm.clients.push(ClientInfo { kind }));
    }

    pub fn client_disconnected(&self, kind: ClientKind) {
        self.update(|fmdm| {
            if let Some(index) = fmdm.clients.iter().position(|c| c.kind == kind) {
                fmdm.clients.remove(index);
            }
        });
    }
}

#[cfg(test)]
#[path = "fmdm_tests.rs"]
mod tests;
