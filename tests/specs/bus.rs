// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level specs: handshake rules and the published snapshot shape.

use super::prelude::*;
use fidx_core::{ClientKind, RequestId};
use fidx_wire::{read_frame, write_frame, ClientRequest, DaemonMessage, ProtocolError};
use tokio::net::UnixStream;

#[tokio::test]
async fn connections_must_open_with_connection_init() {
    let daemon = SpecDaemon::start().await;

    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();
    write_frame(&mut stream, &ClientRequest::Ping { id: RequestId::new("nope") })
        .await
        .unwrap();

    let reply: DaemonMessage = read_frame(&mut stream).await.unwrap();
    assert!(matches!(reply, DaemonMessage::Error { .. }));
    let closed: Result<DaemonMessage, _> = read_frame(&mut stream).await;
    assert!(matches!(closed, Err(ProtocolError::ConnectionClosed)));

    daemon.stop().await;
}

#[tokio::test]
async fn snapshot_wire_shape_matches_the_protocol() {
    let daemon = SpecDaemon::start().await;
    let folder = daemon.folder_with_files("docs", &[("a.txt", "alpha")]);
    let mut client = daemon.client(ClientKind::Automation).await;

    assert_ok(&client.add_folder(&folder).await);
    client.wait_for_state(&folder, "active").await;

    // Re-connect and inspect the raw JSON of the initial snapshot.
    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();
    write_frame(
        &mut stream,
        &ClientRequest::ConnectionInit { client_kind: ClientKind::Automation },
    )
    .await
    .unwrap();
    let _ack: serde_json::Value = read_frame(&mut stream).await.unwrap();
    let raw: serde_json::Value = read_frame(&mut stream).await.unwrap();

    assert_eq!(raw["type"], "fmdm.update");
    let fmdm = &raw["fmdm"];
    assert!(fmdm["curatedModels"].is_array());
    assert!(fmdm["daemon"]["pid"].is_number());
    assert!(fmdm["daemon"]["startedAt"].is_string());
    assert!(fmdm["clients"].is_array());

    let folders = fmdm["folders"].as_array().unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0]["modelId"], MODEL);
    assert_eq!(folders[0]["state"], "active");

    daemon.stop().await;
}

#[tokio::test]
async fn connected_clients_appear_in_the_snapshot() {
    let daemon = SpecDaemon::start().await;
    let mut first = daemon.client(ClientKind::Interactive).await;

    // A second client of a different kind connects; the first client sees
    // it arrive in a snapshot push.
    let _second = daemon.client(ClientKind::Automation).await;

    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    loop {
        let kinds: Vec<ClientKind> = first.fmdm.clients.iter().map(|c| c.kind).collect();
        if kinds.contains(&ClientKind::Interactive) && kinds.contains(&ClientKind::Automation) {
            break;
        }
        let _ = tokio::time::timeout_at(deadline, first.recv())
            .await
            .expect("client list never updated");
    }

    daemon.stop().await;
}

#[tokio::test]
async fn ping_works_for_every_client_kind() {
    let daemon = SpecDaemon::start().await;
    for kind in [ClientKind::Interactive, ClientKind::Cli, ClientKind::Automation] {
        let mut client = daemon.client(kind).await;
        let id = RequestId::new("ping");
        let reply = client.request(ClientRequest::Ping { id }).await;
        assert_ok(&reply);
    }
    daemon.stop().await;
}

#[tokio::test]
async fn unknown_client_kind_is_rejected() {
    let daemon = SpecDaemon::start().await;

    let mut stream = UnixStream::connect(&daemon.socket).await.unwrap();
    let raw = serde_json::json!({"type": "connection.init", "clientKind": "toaster"});
    write_frame(&mut stream, &raw).await.unwrap();

    let reply: DaemonMessage = read_frame(&mut stream).await.unwrap();
    assert!(matches!(reply, DaemonMessage::Error { .. }));

    daemon.stop().await;
}
