// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrent folder lifecycles sharing one worker pool.

use super::*;

fn files(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|i| (format!("doc-{i}.txt"), format!("content number {i}")))
        .collect()
}

#[tokio::test]
async fn three_folders_index_concurrently_and_all_reach_active() {
    let mut rig = Rig::new();
    let sets = [files(1), files(5), files(10)];
    let folders: Vec<_> = sets
        .iter()
        .enumerate()
        .map(|(i, set)| {
            let set: Vec<(&str, &str)> =
                set.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
            rig.folder_with_files(&format!("f{i}"), &set)
        })
        .collect();

    // Park embeds so every folder is observably in INDEXING at once.
    rig.embedder.hold_embeds();
    for folder in &folders {
        rig.add_folder(folder).await.unwrap();
    }
    rig.settle().await;

    for folder in &folders {
        assert_eq!(
            rig.runtime.folder_state(folder),
            Some(FolderState::Indexing),
            "{} should be indexing",
            folder.display()
        );
    }

    rig.embedder.release_embeds();
    rig.settle().await;

    for (folder, set) in folders.iter().zip(&sets) {
        assert_eq!(rig.runtime.folder_state(folder), Some(FolderState::Active));
        assert_eq!(rig.runtime.fingerprint_count(folder), set.len());
    }
    assert_eq!(rig.embedder.embed_calls(), 16);
}

#[tokio::test]
async fn progress_is_monotone_within_an_episode() {
    let mut rig = Rig::new();
    let set = files(8);
    let set_refs: Vec<(&str, &str)> = set.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let folder = rig.folder_with_files("docs", &set_refs);

    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));

    let progress = rig.progress_for(&folder);
    assert!(!progress.is_empty());
    assert!(
        progress.windows(2).all(|w| w[0] <= w[1]),
        "progress must be non-decreasing: {progress:?}"
    );
    assert_eq!(*progress.last().unwrap(), 100);
}

#[tokio::test]
async fn parallel_episodes_interleave_progress() {
    let mut rig = Rig::new();
    let a_set = files(4);
    let b_set = files(4);
    let a_refs: Vec<(&str, &str)> = a_set.iter().map(|(x, y)| (x.as_str(), y.as_str())).collect();
    let b_refs: Vec<(&str, &str)> = b_set.iter().map(|(x, y)| (x.as_str(), y.as_str())).collect();
    let folder_a = rig.folder_with_files("fa", &a_refs);
    let folder_b = rig.folder_with_files("fb", &b_refs);

    rig.add_folder(&folder_a).await.unwrap();
    rig.add_folder(&folder_b).await.unwrap();
    rig.settle().await;

    assert_eq!(rig.runtime.folder_state(&folder_a), Some(FolderState::Active));
    assert_eq!(rig.runtime.folder_state(&folder_b), Some(FolderState::Active));

    // Round-robin dispatch: the second folder makes progress before the
    // first one finishes, rather than one folder draining first.
    let mut a_done_at = None;
    let mut b_started_at = None;
    for (i, snapshot) in rig.published.iter().enumerate() {
        if let Some(a) = snapshot.iter().find(|f| f.path == folder_a) {
            if a.state == FolderState::Active && a_done_at.is_none() {
                a_done_at = Some(i);
            }
        }
        if let Some(b) = snapshot.iter().find(|f| f.path == folder_b) {
            if b.state == FolderState::Indexing
                && b.progress.unwrap_or(0) > 0
                && b_started_at.is_none()
            {
                b_started_at = Some(i);
            }
        }
    }
    let (a_done, b_started) = (a_done_at.unwrap(), b_started_at.unwrap());
    assert!(
        b_started < a_done,
        "folder B progressed (snapshot {b_started}) only after A finished (snapshot {a_done})"
    );
}
