// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real worker processes: spawn, stdio mux, exit reporting.
//!
//! One reader task owns stdout and resolves waiters by correlation id;
//! request submission is serialized on the stdin handle. Stderr is drained
//! to the log. Parsing never mixes with policy — the engine decides what a
//! failure means.

use super::protocol::{
    EmbedPayload, LoadModelPayload, RequestEnvelope, ResponseEnvelope, WorkerRequest,
};
use super::{EmbedderAdapter, WorkerError, WorkerHandle};
use async_trait::async_trait;
use fidx_core::{EngineEvent, ModelId, WorkerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>;

/// Spawns worker processes from a configured command line
pub struct ProcessEmbedder {
    cmd: Vec<String>,
}

impl ProcessEmbedder {
    /// `cmd` is the full command line (program + args) for one worker.
    pub fn new(cmd: Vec<String>) -> Self {
        Self { cmd }
    }
}

#[async_trait]
impl EmbedderAdapter for ProcessEmbedder {
    async fn spawn(
        &self,
        worker: WorkerId,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<Arc<dyn WorkerHandle>, WorkerError> {
        let program = self
            .cmd
            .first()
            .ok_or_else(|| WorkerError::Spawn("embedder command is empty".to_string()))?;

        let mut child = Command::new(program)
            .args(&self.cmd[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Spawn("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Spawn("no stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| WorkerError::Spawn("no stderr pipe".to_string()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let kill_token = CancellationToken::new();

        // Reader task: the only consumer of stdout. Resolves waiters by id;
        // dropping the pending map's senders on EOF fails them all with
        // `Closed`.
        {
            let pending = Arc::clone(&pending);
            let worker = worker.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            let line = line.trim().to_string();
                            if line.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<ResponseEnvelope>(&line) {
                                Ok(resp) => {
                                    let waiter = pending.lock().remove(&resp.id);
                                    match waiter {
                                        Some(tx) => {
                                            let _ = tx.send(resp);
                                        }
                                        None => {
                                            debug!(%worker, id = %resp.id, "response for unknown or expired request");
                                        }
                                    }
                                }
                                Err(e) => {
                                    warn!(%worker, error = %e, "unparseable worker response line");
                                }
                            }
                        }
                        Ok(None) | Err(_) => break,
                    }
                }
                // EOF: fail everything still in flight
                pending.lock().clear();
            });
        }

        // Stderr task: diagnostics only
        {
            let worker = worker.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "fidx::embedder", %worker, "{}", line);
                }
            });
        }

        // Waiter task: owns the child, reports its exit to the engine.
        {
            let worker = worker.clone();
            let kill_token = kill_token.clone();
            tokio::spawn(async move {
                let code = wait_or_kill(&mut child, &kill_token).await;
                debug!(%worker, ?code, "worker process exited");
                let _ = event_tx.send(EngineEvent::WorkerExited { worker, code }).await;
            });
        }

        Ok(Arc::new(ProcessWorker {
            worker,
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            kill_token,
        }))
    }
}

async fn wait_or_kill(child: &mut Child, kill_token: &CancellationToken) -> Option<i32> {
    tokio::select! {
        status = child.wait() => return status.ok().and_then(|s| s.code()),
        _ = kill_token.cancelled() => {}
    }
    // Kill requested: the wait future above is dropped, so the child can
    // be signalled and reaped here.
    let _ = child.start_kill();
    child.wait().await.ok().and_then(|s| s.code())
}

struct ProcessWorker {
    worker: WorkerId,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    kill_token: CancellationToken,
}

impl ProcessWorker {
    async fn request(
        &self,
        body: WorkerRequest,
        deadline: Duration,
    ) -> Result<ResponseEnvelope, WorkerError> {
        let id = nanoid::nanoid!(12);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        let envelope = RequestEnvelope { id: id.clone(), body };
        let mut line = serde_json::to_vec(&envelope)
            .map_err(|e| WorkerError::Protocol(e.to_string()))?;
        line.push(b'\n');

        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(&line).await {
                self.pending.lock().remove(&id);
                return Err(WorkerError::Io(e));
            }
            if let Err(e) = stdin.flush().await {
                self.pending.lock().remove(&id);
                return Err(WorkerError::Io(e));
            }
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(resp)) => {
                if resp.ok {
                    Ok(resp)
                } else {
                    let err = resp.error.unwrap_or_else(|| super::protocol::WorkerWireError {
                        kind: "unknown".to_string(),
                        message: "worker reported failure without detail".to_string(),
                    });
                    Err(WorkerError::Remote { kind: err.kind, message: err.message })
                }
            }
            // Sender dropped: reader hit EOF, the process is gone
            Ok(Err(_)) => Err(WorkerError::Closed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(WorkerError::Deadline)
            }
        }
    }
}

#[async_trait]
impl WorkerHandle for ProcessWorker {
    async fn load_model(
        &self,
        model_id: &ModelId,
        deadline: Duration,
    ) -> Result<usize, WorkerError> {
        let resp = self
            .request(WorkerRequest::LoadModel { model_id: model_id.clone() }, deadline)
            .await?;
        let payload: LoadModelPayload = serde_json::from_value(
            resp.payload
                .ok_or_else(|| WorkerError::Protocol("load_model reply missing payload".into()))?,
        )
        .map_err(|e| WorkerError::Protocol(e.to_string()))?;
        Ok(payload.dimensions)
    }

    async fn embed(
        &self,
        texts: Vec<String>,
        deadline: Duration,
    ) -> Result<Vec<Vec<f32>>, WorkerError> {
        let resp = self.request(WorkerRequest::Embed { texts }, deadline).await?;
        let payload: EmbedPayload = serde_json::from_value(
            resp.payload
                .ok_or_else(|| WorkerError::Protocol("embed reply missing payload".into()))?,
        )
        .map_err(|e| WorkerError::Protocol(e.to_string()))?;
        Ok(payload.vectors)
    }

    async fn health(&self, deadline: Duration) -> Result<(), WorkerError> {
        self.request(WorkerRequest::Health {}, deadline).await?;
        Ok(())
    }

    async fn shutdown(&self, deadline: Duration) -> Result<(), WorkerError> {
        self.request(WorkerRequest::Shutdown {}, deadline).await?;
        Ok(())
    }

    fn kill(&self) {
        debug!(worker = %self.worker, "killing worker process");
        self.kill_token.cancel();
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
