// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-folder lifecycle: add, index, remove, idempotence.

use super::*;
use fidx_adapters::WorkerError;
use fidx_core::ErrorKind;

#[tokio::test]
async fn single_folder_walks_the_full_lifecycle() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files(
        "docs",
        &[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")],
    );

    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.folder_progress(&folder), Some(100));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 3);
    assert_eq!(rig.embedder.embed_calls(), 3);

    // The private state directory holds the vector store.
    assert!(folder.join(".fidx").join("vectors.json").exists());

    // Snapshots arrived in lifecycle order.
    assert_eq!(
        rig.states_for(&folder),
        vec![
            FolderState::Pending,
            FolderState::Scanning,
            FolderState::Ready,
            FolderState::Indexing,
            FolderState::Active,
        ]
    );
}

#[tokio::test]
async fn empty_folder_reaches_active_without_embedding() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("empty", &[]);

    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.embedder.embed_calls(), 0);
    assert_eq!(
        rig.states_for(&folder),
        vec![
            FolderState::Pending,
            FolderState::Scanning,
            FolderState::Ready,
            FolderState::Active,
        ]
    );
}

#[tokio::test]
async fn re_add_with_same_model_is_idempotent() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha")]);

    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    let embeds = rig.embedder.embed_calls();

    let note = rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    assert_eq!(note.as_deref(), Some("already managed"));
    assert_eq!(rig.embedder.embed_calls(), embeds, "re-add must not re-index");
}

#[tokio::test]
async fn re_add_with_different_model_errors() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha")]);

    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    let err = rig.add_folder_with_model(&folder, "bge-m3").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::FolderAlreadyExists);
}

#[tokio::test]
async fn unknown_model_is_rejected() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[]);

    let err = rig
        .add_folder_with_model(&folder, "not-a-curated-model")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ModelUnavailable);
}

#[tokio::test]
async fn relative_path_is_rejected() {
    let mut rig = Rig::new();
    let err = rig.add_folder(Path::new("relative/docs")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidPath);
}

#[tokio::test]
async fn remove_deletes_state_and_is_idempotent() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha")]);
    let state_dir = folder.join(".fidx");

    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    assert!(state_dir.exists());

    assert_eq!(rig.remove_folder(&folder).await.unwrap(), None);
    rig.settle().await;

    // Indistinguishable from never having added the folder.
    assert!(!state_dir.exists());
    assert_eq!(rig.runtime.managed_folder_count(), 0);

    let note = rig.remove_folder(&folder).await.unwrap();
    assert_eq!(note.as_deref(), Some("not present"));
}

#[tokio::test]
async fn remove_mid_indexing_cancels_cleanly() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files(
        "docs",
        &[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma"), ("d.txt", "delta")],
    );

    rig.embedder.hold_embeds();
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Indexing));

    rig.remove_folder(&folder).await.unwrap();
    rig.embedder.release_embeds();
    rig.settle().await;

    assert_eq!(rig.runtime.managed_folder_count(), 0);
    assert!(!folder.join(".fidx").exists());
}

#[tokio::test]
async fn exhausted_embed_retries_fail_the_folder_and_readd_recovers() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha")]);

    // First attempt plus every bounded retry fails.
    for _ in 0..4 {
        rig.embedder.fail_next_embed(WorkerError::Closed);
    }
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Error));
    let notification = rig.runtime.folder_notification(&folder).unwrap();
    assert_eq!(notification.kind, fidx_core::NotificationKind::Error);

    // Re-adding the same folder retries the lifecycle.
    let note = rig.add_folder(&folder).await.unwrap();
    assert_eq!(note.as_deref(), Some("retrying after error"));
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 1);
}
