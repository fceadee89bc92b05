// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live modification: debounce, coalescing, incremental re-index.

use super::*;

const W: Duration = Duration::from_millis(100);

async fn active_folder(rig: &mut Rig) -> PathBuf {
    let folder = rig.folder_with_files(
        "docs",
        &[("keep.txt", "untouched"), ("change.txt", "original"), ("other.txt", "stable")],
    );
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    folder
}

#[tokio::test]
async fn live_modification_reindexes_only_changed_documents() {
    let mut rig = Rig::new();
    let folder = active_folder(&mut rig).await;
    let baseline_embeds = rig.embedder.embed_calls();
    let untouched_before = rig.runtime.fingerprint(&folder, Path::new("keep.txt")).unwrap();

    std::fs::write(folder.join("change.txt"), "edited content").unwrap();
    std::fs::write(folder.join("new.txt"), "brand new").unwrap();
    rig.watch.fire(&folder).await;
    rig.settle().await;

    // Still quiet inside the debounce window.
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));

    rig.advance(W).await;

    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 4);
    assert_eq!(
        rig.embedder.embed_calls() - baseline_embeds,
        2,
        "only the modified and the added document are re-embedded"
    );

    // The untouched document's fingerprint row did not change.
    let untouched_after = rig.runtime.fingerprint(&folder, Path::new("keep.txt")).unwrap();
    assert_eq!(untouched_after.content_hash, untouched_before.content_hash);
    assert_eq!(untouched_after.model_id, untouched_before.model_id);
    assert_eq!(untouched_after.mtime_epoch_ms, untouched_before.mtime_epoch_ms);
}

#[tokio::test]
async fn deletion_is_picked_up_by_the_next_scan() {
    let mut rig = Rig::new();
    let folder = active_folder(&mut rig).await;
    let baseline_embeds = rig.embedder.embed_calls();

    std::fs::remove_file(folder.join("other.txt")).unwrap();
    rig.watch.fire(&folder).await;
    rig.advance(W).await;

    assert_eq!(rig.runtime.fingerprint_count(&folder), 2);
    assert!(rig.runtime.fingerprint(&folder, Path::new("other.txt")).is_none());
    assert_eq!(rig.embedder.embed_calls(), baseline_embeds, "removals embed nothing");
}

#[tokio::test]
async fn a_burst_of_pings_coalesces_into_one_scan() {
    let mut rig = Rig::new();
    let folder = active_folder(&mut rig).await;

    std::fs::write(folder.join("new.txt"), "x").unwrap();
    for _ in 0..5 {
        rig.watch.fire(&folder).await;
    }
    rig.settle().await;
    rig.advance(W).await;

    // Exactly one scanning episode after the burst.
    let states = rig.states_for(&folder);
    let scans = states.iter().filter(|s| **s == FolderState::Scanning).count();
    assert_eq!(scans, 2, "initial scan plus one coalesced rescan, got {states:?}");
}

#[tokio::test]
async fn overlapping_bursts_extend_but_cap_at_five_windows() {
    let mut rig = Rig::new();
    let folder = active_folder(&mut rig).await;
    std::fs::write(folder.join("new.txt"), "x").unwrap();

    // A continuous stream of pings at W/2 cadence: the cap guarantees a
    // scan no later than 5×W after the first ping.
    for _ in 0..12 {
        rig.watch.fire(&folder).await;
        rig.settle().await;
        rig.clock.advance(W / 2);
        rig.runtime.tick().await;
    }
    rig.settle().await;

    let states = rig.states_for(&folder);
    assert!(
        states.iter().filter(|s| **s == FolderState::Scanning).count() >= 2,
        "continuous modification must still produce a scan within 5×W: {states:?}"
    );
}

#[tokio::test]
async fn ping_while_indexing_defers_the_rescan() {
    let mut rig = Rig::new();
    let folder = rig.folder_with_files("docs", &[("a.txt", "one"), ("b.txt", "two")]);

    rig.embedder.hold_embeds();
    rig.add_folder(&folder).await.unwrap();
    rig.settle().await;
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Indexing));

    // Dirt arrives while busy: remembered, not acted on.
    std::fs::write(folder.join("late.txt"), "late").unwrap();
    rig.runtime.handle_event(EngineEvent::WatcherPing { folder: folder.clone() }).await;
    rig.settle().await;

    rig.embedder.release_embeds();
    rig.settle().await;

    // Once drained the deferred rescan picks up the late file.
    assert_eq!(rig.runtime.folder_state(&folder), Some(FolderState::Active));
    assert_eq!(rig.runtime.fingerprint_count(&folder), 3);
}
