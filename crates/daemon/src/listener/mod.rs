// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the control bus.
//!
//! Accepts Unix-socket connections and serves each on its own task. A
//! connection must open with `connection.init`; after the ack the daemon
//! pushes every FMDM snapshot and answers commands by correlation id.
//! Disconnects are detected by read EOF, which unsubscribes the client.

use std::sync::Arc;
use std::time::Duration;

use fidx_core::ClientKind;
use fidx_engine::EngineCmd;
use fidx_wire::{read_frame, read_frame_timeout, write_frame_timeout, ClientRequest, DaemonMessage, ProtocolError};
use thiserror::Error;
use tokio::net::{unix::OwnedReadHalf, UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info, warn};

use crate::fmdm::FmdmBroadcaster;

/// Shared daemon context for all connections
pub struct ListenCtx {
    pub cmd_tx: mpsc::Sender<EngineCmd>,
    pub broadcaster: Arc<FmdmBroadcaster>,
    pub shutdown: Arc<Notify>,
    pub ipc_timeout: Duration,
}

/// Errors from connection handling
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Engine unavailable")]
    EngineGone,
}

/// Accept loop for the control socket
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Run until the process exits, spawning a task per connection.
    pub async fn run(self) {
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("accept error: {}", e),
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {
            debug!("client disconnected")
        }
        ConnectionError::Protocol(ProtocolError::Timeout) => warn!("connection timeout"),
        _ => error!("connection error: {}", e),
    }
}

/// Handshake, then serve the connection until it drops.
async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();

    // The first message must declare the client kind. A frame that does
    // not even parse (e.g. an unknown kind) is a protocol violation too.
    let first: ClientRequest = match read_frame_timeout(&mut reader, ctx.ipc_timeout).await {
        Ok(request) => request,
        Err(ProtocolError::Json(e)) => {
            let message = DaemonMessage::Error { message: format!("malformed message: {e}") };
            let _ = write_frame_timeout(&mut writer, &message, ctx.ipc_timeout).await;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let kind = match first {
        ClientRequest::ConnectionInit { client_kind } => client_kind,
        other => {
            warn!(?other, "connection opened without connection.init");
            let message = DaemonMessage::Error {
                message: "connection must start with connection.init".to_string(),
            };
            let _ = write_frame_timeout(&mut writer, &message, ctx.ipc_timeout).await;
            return Ok(());
        }
    };

    write_frame_timeout(&mut writer, &DaemonMessage::ConnectionAck, ctx.ipc_timeout).await?;
    info!(kind = ?kind, "control client connected");
    ctx.broadcaster.client_connected(kind);

    let result = serve_client(reader, writer, kind, ctx).await;

    ctx.broadcaster.client_disconnected(kind);
    info!(kind = ?kind, "control client disconnected");
    result
}

/// Serve one initialized client: reader loop here, a writer task owning
/// the write half, and a forwarder turning FMDM publishes into
/// `fmdm.update` messages. The split keeps frame reads cancel-safe.
async fn serve_client(
    mut reader: OwnedReadHalf,
    mut writer: tokio::net::unix::OwnedWriteHalf,
    kind: ClientKind,
    ctx: &ListenCtx,
) -> Result<(), ConnectionError> {
    let (out_tx, mut out_rx) = mpsc::channel::<DaemonMessage>(32);
    let ipc_timeout = ctx.ipc_timeout;

    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if write_frame_timeout(&mut writer, &message, ipc_timeout).await.is_err() {
                break;
            }
        }
    });

    // Initial snapshot, then every subsequent publish.
    let (snapshot, mut updates) = ctx.broadcaster.subscribe();
    if out_tx.send(DaemonMessage::FmdmUpdate { fmdm: snapshot }).await.is_err() {
        return Ok(());
    }
    let forwarder = {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let fmdm = updates.borrow_and_update().clone();
                if out_tx.send(DaemonMessage::FmdmUpdate { fmdm }).await.is_err() {
                    break;
                }
            }
        })
    };

    let result = loop {
        match read_frame::<_, ClientRequest>(&mut reader).await {
            Ok(request) => {
                debug!(kind = ?kind, request = ?request, "received request");
                match handle_request(request, ctx).await {
                    Ok(Outcome::Reply(message)) => {
                        if out_tx.send(message).await.is_err() {
                            break Ok(());
                        }
                    }
                    Ok(Outcome::ReplyThenShutdown(message)) => {
                        let _ = out_tx.send(message).await;
                        ctx.shutdown.notify_one();
                    }
                    Ok(Outcome::Violation(message)) => {
                        let _ = out_tx.send(DaemonMessage::Error { message }).await;
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                }
            }
            Err(ProtocolError::ConnectionClosed) => break Ok(()),
            Err(ProtocolError::Json(e)) => {
                // Malformed frame: protocol violation, close the connection.
                let _ = out_tx
                    .send(DaemonMessage::Error { message: format!("malformed message: {e}") })
                    .await;
                break Ok(());
            }
            Err(e) => break Err(e.into()),
        }
    };

    forwarder.abort();
    drop(out_tx);
    let _ = writer_task.await;
    result
}

enum Outcome {
    Reply(DaemonMessage),
    ReplyThenShutdown(DaemonMessage),
    Violation(String),
}

async fn handle_request(
    request: ClientRequest,
    ctx: &ListenCtx,
) -> Result<Outcome, ConnectionError> {
    match request {
        ClientRequest::Ping { id } => Ok(Outcome::Reply(DaemonMessage::ok(id))),

        ClientRequest::ConnectionInit { .. } => {
            Ok(Outcome::Violation("connection.init is only valid once".to_string()))
        }

        ClientRequest::FolderAdd { id, path, model_id } => {
            let (tx, rx) = oneshot::channel();
            ctx.cmd_tx
                .send(EngineCmd::AddFolder { path, model_id, reply: tx })
                .await
                .map_err(|_| ConnectionError::EngineGone)?;
            Ok(Outcome::Reply(folder_reply(id, rx.await)))
        }

        ClientRequest::FolderRemove { id, path } => {
            let (tx, rx) = oneshot::channel();
            ctx.cmd_tx
                .send(EngineCmd::RemoveFolder { path, reply: tx })
                .await
                .map_err(|_| ConnectionError::EngineGone)?;
            Ok(Outcome::Reply(folder_reply(id, rx.await)))
        }

        ClientRequest::SearchRequest { id, folder_path, query, limit } => {
            let (tx, rx) = oneshot::channel();
            ctx.cmd_tx
                .send(EngineCmd::Search { path: folder_path, query, limit, reply: tx })
                .await
                .map_err(|_| ConnectionError::EngineGone)?;
            let message = match rx.await {
                Ok(Ok(())) => DaemonMessage::ok(id),
                Ok(Err(error)) => DaemonMessage::err(id, error),
                Err(_) => DaemonMessage::err(
                    id,
                    fidx_core::BusError::internal("engine dropped the request"),
                ),
            };
            Ok(Outcome::Reply(message))
        }

        ClientRequest::DaemonShutdown { id } => {
            info!("shutdown requested over control bus");
            Ok(Outcome::ReplyThenShutdown(DaemonMessage::ok(id)))
        }
    }
}

fn folder_reply(
    id: fidx_core::RequestId,
    result: Result<Result<Option<String>, fidx_core::BusError>, oneshot::error::RecvError>,
) -> DaemonMessage {
    match result {
        Ok(Ok(Some(note))) => DaemonMessage::ok_with_note(id, note),
        Ok(Ok(None)) => DaemonMessage::ok(id),
        Ok(Err(error)) => DaemonMessage::err(id, error),
        Err(_) => DaemonMessage::err(
            id,
            fidx_core::BusError::internal("engine dropped the request"),
        ),
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
