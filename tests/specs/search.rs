// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Search routing specs: IMMEDIATE priority effects over the bus.

use super::prelude::*;
use fidx_core::{ClientKind, ErrorKind};
use fidx_wire::DaemonMessage;

#[tokio::test]
async fn search_resolves_once_the_query_is_embedded() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files("docs", &[("a.txt", "alpha")]);
    let mut client = daemon.client(ClientKind::Interactive).await;

    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "active").await;
    let baseline = daemon.embedder.embed_calls();

    let reply = client.search(&folder, "where is the quarterly report").await;
    assert_ok(&reply);
    assert_eq!(daemon.embedder.embed_calls(), baseline + 1, "the query itself is embedded");

    daemon.stop().await;
}

#[tokio::test]
async fn search_against_unknown_folder_reports_unknown_folder() {
    let daemon = SpecDaemon::start().await;
    let mut client = daemon.client(ClientKind::Interactive).await;

    let reply = client.search(std::path::Path::new("/not/managed"), "anything").await;
    match reply {
        DaemonMessage::Reply { ok: false, error: Some(error), .. } => {
            assert_eq!(error.kind, ErrorKind::UnknownFolder);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    daemon.stop().await;
}

#[tokio::test]
async fn search_during_indexing_pauses_background_work() {
    let daemon = SpecDaemon::start().await;
    let files: Vec<(String, String)> =
        (0..8).map(|i| (format!("doc-{i}.txt"), format!("text {i}"))).collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let folder = daemon.folder_with_files("docs", &refs);
    let mut client = daemon.client(ClientKind::Interactive).await;

    daemon.embedder.hold_embeds();
    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "indexing").await;

    // Issue the search while background embeds are parked, then release:
    // the in-flight background embed finishes, the query runs next, and
    // admission stays paused, so the embed count freezes after the query.
    client.send(&fidx_wire::ClientRequest::SearchRequest {
        id: fidx_core::RequestId::new("s"),
        folder_path: folder.clone(),
        query: "urgent lookup".into(),
        limit: 5,
    })
    .await;
    // Give the engine loop a moment to accept the request (which pauses
    // background admission) before letting the parked embed finish.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    daemon.embedder.release_embeds();

    // Wait for the search reply (skipping snapshot pushes).
    loop {
        match client.recv().await {
            DaemonMessage::Reply { ok, .. } => {
                assert!(ok);
                break;
            }
            _ => continue,
        }
    }

    // One in-flight background embed plus the query; the agent-active
    // window (default 180s) keeps the remaining six paused.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(daemon.embedder.embed_calls(), 2);
    let view = client.fmdm.folder(&folder).unwrap();
    assert_eq!(view.state.as_str(), "indexing");

    daemon.stop().await;
}
