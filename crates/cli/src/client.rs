// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection to the daemon over the control bus.

use anyhow::{bail, Result};
use fidx_core::{ClientKind, Fmdm};
use fidx_wire::{read_frame, write_frame, ClientRequest, DaemonMessage};
use std::path::Path;
use tokio::net::UnixStream;

pub struct Client {
    stream: UnixStream,
    /// Latest FMDM snapshot seen on this connection
    snapshot: Fmdm,
}

impl Client {
    /// Connect, perform the `connection.init` handshake, and receive the
    /// initial snapshot.
    pub async fn connect(socket: &Path, kind: ClientKind) -> Result<Self> {
        let mut stream = UnixStream::connect(socket).await?;

        write_frame(&mut stream, &ClientRequest::ConnectionInit { client_kind: kind }).await?;
        match read_frame::<_, DaemonMessage>(&mut stream).await? {
            DaemonMessage::ConnectionAck => {}
            DaemonMessage::Error { message } => bail!("daemon rejected connection: {message}"),
            other => bail!("unexpected handshake reply: {other:?}"),
        }

        let snapshot = match read_frame::<_, DaemonMessage>(&mut stream).await? {
            DaemonMessage::FmdmUpdate { fmdm } => fmdm,
            other => bail!("expected initial snapshot, got {other:?}"),
        };

        Ok(Self { stream, snapshot })
    }

    pub fn snapshot(&self) -> &Fmdm {
        &self.snapshot
    }

    /// Send one request and wait for its reply, folding interleaved
    /// `fmdm.update` pushes into the cached snapshot.
    pub async fn request(&mut self, request: ClientRequest) -> Result<DaemonMessage> {
        write_frame(&mut self.stream, &request).await?;
        loop {
            match read_frame::<_, DaemonMessage>(&mut self.stream).await? {
                DaemonMessage::FmdmUpdate { fmdm } => self.snapshot = fmdm,
                reply => return Ok(reply),
            }
        }
    }

    /// Print every snapshot as it is published, until interrupted.
    pub async fn watch(&mut self) -> Result<()> {
        crate::render::watch_line(&self.snapshot);
        loop {
            match read_frame::<_, DaemonMessage>(&mut self.stream).await? {
                DaemonMessage::FmdmUpdate { fmdm } => {
                    self.snapshot = fmdm;
                    crate::render::watch_line(&self.snapshot);
                }
                DaemonMessage::Error { message } => bail!("protocol error: {message}"),
                _ => {}
            }
        }
    }
}
