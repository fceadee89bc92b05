// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Folder lifecycle specs over the control bus.

use super::prelude::*;
use fidx_core::ClientKind;
use fidx_wire::DaemonMessage;

#[tokio::test]
async fn folder_reaches_active_and_every_state_is_broadcast() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files(
        "docs",
        &[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")],
    );
    let mut client = daemon.client(ClientKind::Cli).await;

    assert_ok(&client.add_folder(&folder).await);
    let observed = client.wait_for_state(&folder, "active").await;

    // States arrive in lifecycle order. A slow reader may coalesce to the
    // latest snapshot, so the observed sequence is an ordered subsequence
    // of the full lifecycle, never a reordering.
    let lifecycle = ["pending", "scanning", "ready", "indexing", "active"];
    let mut cursor = 0;
    for state in &observed {
        let position = lifecycle[cursor..]
            .iter()
            .position(|s| s == state)
            .unwrap_or_else(|| panic!("state {state} out of order in {observed:?}"));
        cursor += position;
    }
    assert_eq!(observed.last().map(String::as_str), Some("active"));

    let view = client.fmdm.folder(&folder).unwrap();
    assert_eq!(view.progress, Some(100));
    assert_eq!(daemon.embedder.embed_calls(), 3);
    assert!(folder.join(".fidx/vectors.json").exists());

    daemon.stop().await;
}

#[tokio::test]
async fn add_is_idempotent_and_model_conflicts_error() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files("docs", &[("a.txt", "alpha")]);
    let mut client = daemon.client(ClientKind::Cli).await;

    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "active").await;

    // Same model: success with a note.
    match client.add_folder(&folder).await {
        DaemonMessage::Reply { ok: true, note: Some(note), .. } => {
            assert_eq!(note, "already managed");
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    // Different model: folder_already_exists.
    let id = fidx_core::RequestId::new("conflict");
    let reply = client
        .request(fidx_wire::ClientRequest::FolderAdd {
            id,
            path: folder.clone(),
            model_id: fidx_core::ModelId::new("bge-m3"),
        })
        .await;
    match reply {
        DaemonMessage::Reply { ok: false, error: Some(error), .. } => {
            assert_eq!(error.kind, fidx_core::ErrorKind::FolderAlreadyExists);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    daemon.stop().await;
}

#[tokio::test]
async fn remove_is_idempotent_and_deletes_all_private_state() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files("docs", &[("a.txt", "alpha")]);
    let state_dir = folder.join(".fidx");
    let mut client = daemon.client(ClientKind::Cli).await;

    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "active").await;
    assert!(state_dir.exists());

    assert_ok(&client.remove_folder(&folder).await);
    client.wait_for_removal(&folder).await;

    // Indistinguishable from never having been added.
    assert!(!state_dir.exists());
    assert!(client.fmdm.folders.is_empty());

    // Removing again succeeds with a note.
    match client.remove_folder(&folder).await {
        DaemonMessage::Reply { ok: true, note: Some(note), .. } => {
            assert_eq!(note, "not present");
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    daemon.stop().await;
}

#[tokio::test]
async fn concurrent_folders_all_become_active() {
    let daemon = SpecDaemon::start().await;
    let f1 = daemon.folder_with_files("f1", &[("a.txt", "one")]);
    let f2 = daemon.folder_with_files(
        "f2",
        &[("a.txt", "1"), ("b.txt", "2"), ("c.txt", "3"), ("d.txt", "4"), ("e.txt", "5")],
    );
    let mut client = daemon.client(ClientKind::Cli).await;

    assert_ok(&client.add_folder(&f1).await);
    assert_ok(&client.add_folder(&f2).await);

    client.wait_for_state(&f1, "active").await;
    client.wait_for_state(&f2, "active").await;

    assert_eq!(daemon.embedder.embed_calls(), 6);

    // Folder order in the snapshot is insertion order.
    let paths: Vec<_> = client.fmdm.folders.iter().map(|f| f.path.clone()).collect();
    similar_asserts::assert_eq!(paths, vec![f1.clone(), f2.clone()]);

    daemon.stop().await;
}

#[tokio::test]
async fn live_changes_are_picked_up_while_active() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files("docs", &[("keep.txt", "same"), ("edit.txt", "v1")]);
    let mut client = daemon.client(ClientKind::Interactive).await;

    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "active").await;
    let baseline = daemon.embedder.embed_calls();

    std::fs::write(folder.join("edit.txt"), "v2 with more words").unwrap();
    std::fs::write(folder.join("fresh.txt"), "new document").unwrap();
    daemon.watch.fire(&folder).await;

    // Debounce (100ms) elapses on the real clock; the folder rescans and
    // embeds exactly the two changed files. (Intermediate states may be
    // coalesced by a slow reader, so wait on the embed count instead.)
    wait_for_embed_calls(&daemon.embedder, baseline + 2).await;
    client.wait_for_state(&folder, "active").await;

    assert_eq!(daemon.embedder.embed_calls(), baseline + 2);
    daemon.stop().await;
}

#[tokio::test]
async fn shutdown_over_the_bus_stops_the_daemon() {
    let daemon = SpecDaemon::start().await;
    let mut client = daemon.client(ClientKind::Cli).await;

    let id = fidx_core::RequestId::new("bye");
    let reply = client.request(fidx_wire::ClientRequest::DaemonShutdown { id }).await;
    assert_ok(&reply);

    // The serve task exits on its own, without stop() prompting it.
    daemon.wait_exit().await;
}
