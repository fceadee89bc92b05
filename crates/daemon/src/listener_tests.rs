// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener tests against a stub engine loop.

use super::*;
use fidx_core::{
    BusError, DaemonIdentity, ErrorKind, Folder, FolderState, FolderView, ModelId, RequestId,
};
use fidx_wire::write_frame;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

struct TestBus {
    _dir: TempDir,
    socket: PathBuf,
    ctx: Arc<ListenCtx>,
    broadcaster: Arc<FmdmBroadcaster>,
    shutdown: Arc<Notify>,
}

/// Stub engine: add succeeds, remove notes "not present", search succeeds
/// unless the folder is `/missing`.
fn spawn_stub_engine(mut cmd_rx: mpsc::Receiver<EngineCmd>) {
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                EngineCmd::AddFolder { reply, .. } => {
                    let _ = reply.send(Ok(None));
                }
                EngineCmd::RemoveFolder { reply, .. } => {
                    let _ = reply.send(Ok(Some("not present".to_string())));
                }
                EngineCmd::Search { path, reply, .. } => {
                    let result = if path == PathBuf::from("/missing") {
                        Err(BusError::new(ErrorKind::UnknownFolder, "no such folder"))
                    } else {
                        Ok(())
                    };
                    let _ = reply.send(result);
                }
            }
        }
    });
}

async fn start_bus() -> TestBus {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("fidxd.sock");
    let unix = UnixListener::bind(&socket).unwrap();

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    spawn_stub_engine(cmd_rx);

    let broadcaster = Arc::new(FmdmBroadcaster::new(
        DaemonIdentity { pid: 1234, started_at: "2026-01-01T00:00:00Z".into() },
        Vec::new(),
    ));
    let shutdown = Arc::new(Notify::new());
    let ctx = Arc::new(ListenCtx {
        cmd_tx,
        broadcaster: Arc::clone(&broadcaster),
        shutdown: Arc::clone(&shutdown),
        ipc_timeout: Duration::from_secs(2),
    });

    tokio::spawn(Listener::new(unix, Arc::clone(&ctx)).run());

    TestBus { _dir: dir, socket, ctx, broadcaster, shutdown }
}

struct Client {
    stream: UnixStream,
}

impl Client {
    async fn connect(bus: &TestBus, kind: ClientKind) -> Self {
        let mut stream = UnixStream::connect(&bus.socket).await.unwrap();
        write_frame(&mut stream, &ClientRequest::ConnectionInit { client_kind: kind })
            .await
            .unwrap();
        let ack: DaemonMessage = read_frame(&mut stream).await.unwrap();
        assert_eq!(ack, DaemonMessage::ConnectionAck);
        let mut client = Self { stream };
        // The initial snapshot arrives right after the ack.
        let first = client.recv().await;
        assert!(matches!(first, DaemonMessage::FmdmUpdate { .. }));
        client
    }

    async fn send(&mut self, request: &ClientRequest) {
        write_frame(&mut self.stream, request).await.unwrap();
    }

    async fn recv(&mut self) -> DaemonMessage {
        read_frame(&mut self.stream).await.unwrap()
    }

    /// Skip fmdm pushes until a reply arrives.
    async fn recv_reply(&mut self) -> DaemonMessage {
        loop {
            match self.recv().await {
                DaemonMessage::FmdmUpdate { .. } => continue,
                other => return other,
            }
        }
    }
}

fn folder_view(path: &str, state: FolderState) -> FolderView {
    let mut folder = Folder::new(path.into(), ModelId::new("m"), 0);
    folder.state = state;
    FolderView::from(&folder)
}

#[tokio::test]
async fn ping_round_trips() {
    let bus = start_bus().await;
    let mut client = Client::connect(&bus, ClientKind::Cli).await;

    client.send(&ClientRequest::Ping { id: RequestId::new("p1") }).await;
    let reply = client.recv_reply().await;
    assert_eq!(
        reply,
        DaemonMessage::Reply { id: RequestId::new("p1"), ok: true, error: None, note: None }
    );
}

#[tokio::test]
async fn folder_add_and_remove_are_routed_to_the_engine() {
    let bus = start_bus().await;
    let mut client = Client::connect(&bus, ClientKind::Cli).await;

    client
        .send(&ClientRequest::FolderAdd {
            id: RequestId::new("a1"),
            path: "/data/docs".into(),
            model_id: ModelId::new("m"),
        })
        .await;
    assert!(matches!(client.recv_reply().await, DaemonMessage::Reply { ok: true, .. }));

    client
        .send(&ClientRequest::FolderRemove { id: RequestId::new("r1"), path: "/other".into() })
        .await;
    match client.recv_reply().await {
        DaemonMessage::Reply { ok: true, note, .. } => {
            assert_eq!(note.as_deref(), Some("not present"));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn search_errors_surface_with_their_kind() {
    let bus = start_bus().await;
    let mut client = Client::connect(&bus, ClientKind::Interactive).await;

    client
        .send(&ClientRequest::SearchRequest {
            id: RequestId::new("s1"),
            folder_path: "/missing".into(),
            query: "anything".into(),
            limit: 5,
        })
        .await;
    match client.recv_reply().await {
        DaemonMessage::Reply { ok: false, error: Some(error), .. } => {
            assert_eq!(error.kind, ErrorKind::UnknownFolder);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn fmdm_updates_are_pushed_to_subscribers() {
    let bus = start_bus().await;
    let mut client = Client::connect(&bus, ClientKind::Interactive).await;

    bus.broadcaster.set_folders(vec![folder_view("/data/docs", FolderState::Indexing)]);

    match client.recv().await {
        DaemonMessage::FmdmUpdate { fmdm } => {
            assert_eq!(fmdm.folders.len(), 1);
            assert_eq!(fmdm.folders[0].state, FolderState::Indexing);
        }
        other => panic!("expected fmdm.update, got {other:?}"),
    }
}

#[tokio::test]
async fn first_message_must_be_connection_init() {
    let bus = start_bus().await;
    let mut stream = UnixStream::connect(&bus.socket).await.unwrap();

    write_frame(&mut stream, &ClientRequest::Ping { id: RequestId::new("p") })
        .await
        .unwrap();

    let message: DaemonMessage = read_frame(&mut stream).await.unwrap();
    assert!(matches!(message, DaemonMessage::Error { .. }));

    // And the daemon closes the connection.
    let next: Result<DaemonMessage, _> = read_frame(&mut stream).await;
    assert!(matches!(next, Err(ProtocolError::ConnectionClosed)));
}

#[tokio::test]
async fn malformed_frames_close_the_connection_but_not_the_daemon() {
    let bus = start_bus().await;
    let mut client = Client::connect(&bus, ClientKind::Automation).await;

    // A framed payload that is not valid JSON.
    let garbage = b"this is not json";
    client
        .stream
        .write_all(&(garbage.len() as u32).to_be_bytes())
        .await
        .unwrap();
    client.stream.write_all(garbage).await.unwrap();

    let message = client.recv_reply().await;
    assert!(matches!(message, DaemonMessage::Error { .. }));

    // The daemon still accepts fresh connections.
    let mut second = Client::connect(&bus, ClientKind::Cli).await;
    second.send(&ClientRequest::Ping { id: RequestId::new("p2") }).await;
    assert!(matches!(second.recv_reply().await, DaemonMessage::Reply { ok: true, .. }));
}

#[tokio::test]
async fn disconnect_unsubscribes_the_client() {
    let bus = start_bus().await;
    let client = Client::connect(&bus, ClientKind::Cli).await;
    assert_eq!(bus.broadcaster.snapshot().clients.len(), 1);

    drop(client);

    // EOF detection runs on the connection task; give it a moment.
    for _ in 0..50 {
        if bus.broadcaster.snapshot().clients.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(bus.broadcaster.snapshot().clients.is_empty());
}

#[tokio::test]
async fn daemon_shutdown_replies_then_notifies() {
    let bus = start_bus().await;
    let mut client = Client::connect(&bus, ClientKind::Cli).await;

    let notified = {
        let shutdown = Arc::clone(&bus.shutdown);
        tokio::spawn(async move { shutdown.notified().await })
    };

    client.send(&ClientRequest::DaemonShutdown { id: RequestId::new("q") }).await;
    assert!(matches!(client.recv_reply().await, DaemonMessage::Reply { ok: true, .. }));

    tokio::time::timeout(Duration::from_secs(2), notified)
        .await
        .expect("shutdown must be signalled")
        .unwrap();
    let _ = &bus.ctx;
}
