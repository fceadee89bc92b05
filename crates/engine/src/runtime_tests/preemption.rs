// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IMMEDIATE search requests preempting background indexing.

use super::*;

const A: Duration = Duration::from_secs(60);

fn file_set(n: usize) -> Vec<(String, String)> {
    (0..n).map(|i| (format!("doc-{i}.txt"), format!("body {i}"))).collect()
}

#[tokio::test]
async fn search_pauses_background_admission_within_one_pass() {
    let mut rig = Rig::new();
    let set = file_set(6);
    let refs: Vec<(&str, &str)> = set.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let folder = rig.folder_with_files("docs", &refs);

    rig.embedder.hold_embeds();
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Indexing));
    let in_flight_embeds = rig.embedder.embed_calls();
    assert_eq!(in_flight_embeds, 1, "one background embed in flight, rest queued");

    let reply = rig.search(&folder, "the quick query").await;
    // Admission pauses immediately, before the in-flight embed finishes.
    assert!(rig.runtime.is_background_paused());

    rig.embedder.release_embeds();
    rig.settle().await;

    // The in-flight background embed ran to completion, the query embedded
    // next, and no further background work was admitted.
    assert_eq!(reply.await.unwrap(), Ok(()));
    assert_eq!(rig.embedder.embed_calls(), in_flight_embeds + 1);
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Indexing));
    assert!(rig.runtime.is_background_paused());
}

#[tokio::test]
async fn background_resumes_a_seconds_after_last_search() {
    let mut rig = Rig::new();
    let set = file_set(4);
    let refs: Vec<(&str, &str)> = set.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let folder = rig.folder_with_files("docs", &refs);

    rig.embedder.hold_embeds();
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    let reply = rig.search(&folder, "needle").await;
    rig.embedder.release_embeds();
    rig.settle().await;
    assert_eq!(reply.await.unwrap(), Ok(()));

    // Before the window expires the folder stays paused mid-index.
    rig.advance(A / 2).await;
    assert!(rig.runtime.is_background_paused());
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Indexing));

    // At A past the completion the window closes and indexing drains.
    rig.advance(A).await;
    assert!(!rig.runtime.is_background_paused());
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 4);
}

#[tokio::test]
async fn subsequent_searches_extend_the_window() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha")]);
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;

    let first = rig.search(&folder, "one").await;
    rig.settle().await;
    assert_eq!(first.await.unwrap(), Ok(()));

    rig.advance(A / 2).await;
    assert!(rig.runtime.is_background_paused());

    // A second search half-way through pushes the expiry out.
    let second = rig.search(&folder, "two").await;
    rig.settle().await;
    assert_eq!(second.await.unwrap(), Ok(()));

    rig.advance(A / 2).await;
    assert!(
        rig.runtime.is_background_paused(),
        "window must be measured from the most recent request"
    );

    rig.advance(A).await;
    assert!(!rig.runtime.is_background_paused());
}

#[tokio::test]
async fn search_against_unknown_folder_fails_fast() {
    let mut rig = Rig::new();
    let reply = rig.search(Path::new("/nowhere"), "query").await;
    let err = reply.await.unwrap().unwrap_err();
    assert_eq!(err.kind, fidx_core::ErrorKind::UnknownFolder);
}

#[tokio::test]
async fn search_on_a_hot_worker_dispatches_without_a_load() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "alpha")]);
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    let loads = rig.embedder.loaded_models().len();

    let reply = rig.search(&folder, "needle").await;
    rig.settle().await;

    assert_eq!(reply.await.unwrap(), Ok(()));
    assert_eq!(
        rig.embedder.loaded_models().len(),
        loads,
        "the model was already resident; no load_model round-trip"
    );
}
