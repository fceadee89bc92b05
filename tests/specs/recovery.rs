// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart recovery specs: the folder set and fingerprints survive a full
//! daemon restart, and recovery itself never re-embeds clean documents.

use super::prelude::*;
use fidx_core::ClientKind;

#[tokio::test]
async fn restart_restores_folders_without_reembedding() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files("docs", &[("a.txt", "alpha"), ("b.txt", "beta")]);

    let mut client = daemon.client(ClientKind::Cli).await;
    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "active").await;
    drop(client);

    let (state, data) = daemon.stop().await;

    // Second daemon generation over the same state directory.
    let daemon = SpecDaemon::start_with_dirs(state, data).await;
    let mut client = daemon.client(ClientKind::Cli).await;
    client.wait_for_state(&folder, "active").await;

    assert_eq!(
        daemon.embedder.embed_calls(),
        0,
        "recovery with no on-disk changes must perform zero embed calls"
    );
    daemon.stop().await;
}

#[tokio::test]
async fn offline_additions_are_indexed_after_restart() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files("docs", &[("a.txt", "alpha")]);

    let mut client = daemon.client(ClientKind::Cli).await;
    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "active").await;
    drop(client);

    let (state, data) = daemon.stop().await;

    // A file appears while the daemon is down.
    std::fs::write(folder.join("offline.txt"), "created offline").unwrap();

    let daemon = SpecDaemon::start_with_dirs(state, data).await;
    let mut client = daemon.client(ClientKind::Cli).await;
    client.wait_for_state(&folder, "active").await;

    assert_eq!(daemon.embedder.embed_calls(), 1, "only the new file is embedded");
    daemon.stop().await;
}

#[tokio::test]
async fn deleted_state_directory_recovers_with_a_rebuild() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files("docs", &[("a.txt", "alpha"), ("b.txt", "beta")]);

    let mut client = daemon.client(ClientKind::Cli).await;
    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "active").await;
    let baseline = daemon.embedder.embed_calls();

    std::fs::remove_dir_all(folder.join(".fidx")).unwrap();
    daemon.watch.fire(&folder).await;

    // After the debounce the rebuild re-embeds both documents; wait on the
    // embed count since intermediate states may coalesce for slow readers.
    wait_for_embed_calls(&daemon.embedder, baseline + 2).await;

    // The pre-deletion snapshot was already "active", so wait for the
    // post-rebuild one, recognizable by its warning notification.
    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    loop {
        if let Some(view) = client.fmdm.folder(&folder) {
            if view.state.to_string() == "active" && view.notification.is_some() {
                break;
            }
        }
        let _ = tokio::time::timeout_at(deadline, client.recv())
            .await
            .expect("rebuild never completed");
    }

    let view = client.fmdm.folder(&folder).unwrap();
    assert_eq!(view.progress, Some(100));
    let notification = view.notification.as_ref().expect("a rebuild warning is attached");
    assert_eq!(notification.kind, fidx_core::NotificationKind::Warning);

    assert_eq!(
        daemon.embedder.embed_calls() - baseline,
        2,
        "every document is re-embedded after losing the state directory"
    );
    assert!(folder.join(".fidx/vectors.json").exists());

    daemon.stop().await;
}
