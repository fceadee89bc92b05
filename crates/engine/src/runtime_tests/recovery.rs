// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restart recovery and state-directory corruption.

use super::*;
use fidx_core::NotificationKind;

#[tokio::test]
async fn restart_with_no_changes_restores_active_folders_without_embedding() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha"), ("b.txt", "beta")]);
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    assert_eq!(rig.runtime.fingerprint_count(&folder), 2);

    let mut rig = rig.restart();
    rig.runtime.restore().await;
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 2);
    assert_eq!(rig.embedder.embed_calls(), 0, "recovery must not re-embed anything");
}

#[tokio::test]
async fn offline_change_is_indexed_after_restart() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha"), ("b.txt", "beta")]);
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    // Daemon down; a file appears on disk.
    let mut rig = rig.restart();
    std::fs::write(folder.join("offline.txt"), "added while down").unwrap();

    rig.runtime.restore().await;
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 3);
    assert_eq!(
        rig.embedder.embed_calls(),
        1,
        "exactly the offline-added file is embedded"
    );
}

#[tokio::test]
async fn restart_preserves_folder_insertion_order() {
    let mut rig = Rig::new();
    let first = rig.folder_with_files("first", &[]);
    let second = rig.folder_with_files("second", &[]);
    rig.add_folder(&first).await.unwrap();
    rig.add_folder(&second).await.unwrap();
    rig.settle().await;

    let mut rig = rig.restart();
    rig.runtime.restore().await;
    rig.settle().await;

    let views = rig.runtime.folder_views();
    let paths: Vec<_> = views.iter().map(|v| v.path.clone()).collect();
    assert_eq!(paths, vec![first, second]);
}

#[tokio::test]
async fn deleted_state_directory_forces_full_rebuild() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files(
        "docs",
        &[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")],
    );
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    let baseline = rig.embedder.embed_calls();

    // Blow the whole private state directory away.
    std::fs::remove_dir_all(folder.join(".fidx")).unwrap();

    rig.watch.fire(&folder).await;
    rig.advance(Duration::from_millis(100)).await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.folder_progress(&folder), Some(100));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 3);
    assert_eq!(
        rig.embedder.embed_calls() - baseline,
        3,
        "every document is treated as added"
    );

    let notification = rig.runtime.folder_notification(&folder).unwrap();
    assert_eq!(notification.kind, NotificationKind::Warning);
}

#[tokio::test]
async fn corrupt_store_on_restart_forces_rebuild() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha"), ("b.txt", "beta")]);
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    std::fs::write(folder.join(".fidx/vectors.json"), "{{{ not json").unwrap();

    let mut rig = rig.restart();
    rig.runtime.restore().await;
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 2);
    assert_eq!(rig.embedder.embed_calls(), 2, "a corrupt store re-embeds everything");
}
