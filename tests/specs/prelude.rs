// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the specs: an in-process daemon plus a bus client.

use fidx_adapters::{FakeEmbedder, FakeWatch, FileVectorStore};
use fidx_core::{
    ClientKind, DaemonConfig, Fmdm, ModelCatalog, ModelId, RequestId, SchedulerConfig,
    SystemClock, WatcherConfig, WorkerConfig,
};
use fidx_daemon::{serve, ServeOptions};
use fidx_engine::RuntimeDeps;
use fidx_wire::{read_frame, write_frame, ClientRequest, DaemonMessage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const MODEL: &str = "minilm-l6-v2";
pub const SPEC_WAIT: Duration = Duration::from_secs(10);

pub struct SpecDaemon {
    pub socket: PathBuf,
    pub shutdown: Arc<Notify>,
    pub embedder: FakeEmbedder,
    pub watch: FakeWatch,
    pub state: Arc<TempDir>,
    pub data: Arc<TempDir>,
    task: JoinHandle<()>,
}

fn spec_config(state_dir: PathBuf) -> DaemonConfig {
    DaemonConfig {
        state_dir,
        watcher: WatcherConfig { debounce_ms: 100 },
        worker: WorkerConfig {
            shutdown_grace_period_seconds: 2,
            restart_delay_ms: 50,
            health_probe_ms: 3_600_000,
            ..WorkerConfig::default()
        },
        scheduler: SchedulerConfig::default(),
        ..DaemonConfig::default()
    }
}

impl SpecDaemon {
    pub async fn start() -> Self {
        let state = Arc::new(TempDir::new().unwrap());
        let data = Arc::new(TempDir::new().unwrap());
        Self::start_with_dirs(state, data).await
    }

    pub async fn start_with_dirs(state: Arc<TempDir>, data: Arc<TempDir>) -> Self {
        let socket = state.path().join("fidxd.sock");
        let _ = std::fs::remove_file(&socket);
        let unix = UnixListener::bind(&socket).unwrap();

        let embedder = FakeEmbedder::new();
        let watch = FakeWatch::new();
        let shutdown = Arc::new(Notify::new());

        let options = ServeOptions {
            config: spec_config(state.path().to_path_buf()),
            catalog: ModelCatalog::builtin(),
            deps: RuntimeDeps {
                embedder: Arc::new(embedder.clone()),
                watcher: Arc::new(watch.clone()),
                store: Arc::new(FileVectorStore::new()),
            },
            clock: SystemClock,
            timer_check: Duration::from_millis(20),
            ipc_timeout: Duration::from_secs(2),
        };

        let task = {
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                serve(options, unix, shutdown).await.expect("daemon failed");
            })
        };

        SpecDaemon { socket, shutdown, embedder, watch, state, data, task }
    }

    /// Stop the daemon and wait for a clean exit.
    pub async fn stop(self) -> (Arc<TempDir>, Arc<TempDir>) {
        self.shutdown.notify_one();
        tokio::time::timeout(SPEC_WAIT, self.task)
            .await
            .expect("daemon did not stop in time")
            .unwrap();
        (self.state, self.data)
    }

    /// Wait for the daemon to exit on its own (e.g. after a bus-level
    /// shutdown request).
    pub async fn wait_exit(self) {
        let SpecDaemon { task, state, data, .. } = self;
        tokio::time::timeout(SPEC_WAIT, task)
            .await
            .expect("daemon did not exit")
            .unwrap();
        drop(state);
        drop(data);
    }

    pub async fn client(&self, kind: ClientKind) -> SpecClient {
        SpecClient::connect(&self.socket, kind).await
    }

    /// Create a folder with files under the data directory.
    pub fn folder_with_files(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let folder = self.data.path().join(name);
        std::fs::create_dir_all(&folder).unwrap();
        for (relpath, content) in files {
            let path = folder.join(relpath);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        folder
    }
}

pub struct SpecClient {
    stream: UnixStream,
    /// Latest snapshot seen on this connection
    pub fmdm: Fmdm,
    next_id: u64,
}

impl SpecClient {
    pub async fn connect(socket: &Path, kind: ClientKind) -> Self {
        let mut stream = UnixStream::connect(socket).await.unwrap();
        write_frame(&mut stream, &ClientRequest::ConnectionInit { client_kind: kind })
            .await
            .unwrap();
        let ack: DaemonMessage = read_frame(&mut stream).await.unwrap();
        assert_eq!(ack, DaemonMessage::ConnectionAck, "handshake must be acknowledged");
        let fmdm = match read_frame::<_, DaemonMessage>(&mut stream).await.unwrap() {
            DaemonMessage::FmdmUpdate { fmdm } => fmdm,
            other => panic!("expected initial snapshot, got {other:?}"),
        };
        Self { stream, fmdm, next_id: 0 }
    }

    fn request_id(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId::new(format!("spec-{}", self.next_id))
    }

    pub async fn send(&mut self, request: &ClientRequest) {
        write_frame(&mut self.stream, request).await.unwrap();
    }

    pub async fn recv(&mut self) -> DaemonMessage {
        let message = read_frame::<_, DaemonMessage>(&mut self.stream).await.unwrap();
        if let DaemonMessage::FmdmUpdate { fmdm } = &message {
            self.fmdm = fmdm.clone();
        }
        message
    }

    /// Send a request and wait for its reply, folding snapshot pushes.
    pub async fn request(&mut self, request: ClientRequest) -> DaemonMessage {
        self.send(&request).await;
        loop {
            match self.recv().await {
                DaemonMessage::FmdmUpdate { .. } => continue,
                reply => return reply,
            }
        }
    }

    pub async fn add_folder(&mut self, path: &Path) -> DaemonMessage {
        let id = self.request_id();
        self.request(ClientRequest::FolderAdd {
            id,
            path: path.to_path_buf(),
            model_id: ModelId::new(MODEL),
        })
        .await
    }

    pub async fn remove_folder(&mut self, path: &Path) -> DaemonMessage {
        let id = self.request_id();
        self.request(ClientRequest::FolderRemove { id, path: path.to_path_buf() }).await
    }

    pub async fn search(&mut self, path: &Path, query: &str) -> DaemonMessage {
        let id = self.request_id();
        self.request(ClientRequest::SearchRequest {
            id,
            folder_path: path.to_path_buf(),
            query: query.to_string(),
            limit: 10,
        })
        .await
    }

    /// Consume snapshot pushes until the folder reaches `state`.
    ///
    /// Returns every distinct state observed for the folder on the way,
    /// including states already present in the latest snapshot.
    pub async fn wait_for_state(&mut self, folder: &Path, state: &str) -> Vec<String> {
        let mut observed: Vec<String> = Vec::new();
        let mut current = self.fmdm.clone();
        let deadline = tokio::time::Instant::now() + SPEC_WAIT;

        loop {
            if let Some(view) = current.folders.iter().find(|f| f.path == folder) {
                let name = view.state.to_string();
                if observed.last() != Some(&name) {
                    observed.push(name.clone());
                }
                if name == state {
                    return observed;
                }
            }

            let message = match tokio::time::timeout_at(deadline, self.recv()).await {
                Ok(message) => message,
                Err(_) => panic!("folder never reached {state}; observed {observed:?}"),
            };
            if let DaemonMessage::FmdmUpdate { fmdm } = message {
                current = fmdm;
            }
        }
    }

    /// Wait until the folder is absent from the snapshot.
    pub async fn wait_for_removal(&mut self, folder: &Path) {
        if self.fmdm.folder(folder).is_none() {
            return;
        }
        let deadline = tokio::time::Instant::now() + SPEC_WAIT;
        loop {
            let message = tokio::time::timeout_at(deadline, self.recv())
                .await
                .expect("folder was never removed from the FMDM");
            if let DaemonMessage::FmdmUpdate { fmdm } = message {
                if fmdm.folder(folder).is_none() {
                    return;
                }
            }
        }
    }
}

pub fn assert_ok(reply: &DaemonMessage) {
    match reply {
        DaemonMessage::Reply { ok: true, .. } => {}
        other => panic!("expected ok reply, got {other:?}"),
    }
}

/// Poll until the fake embedder has served at least `target` embed calls.
pub async fn wait_for_embed_calls(embedder: &FakeEmbedder, target: usize) {
    let deadline = tokio::time::Instant::now() + SPEC_WAIT;
    while embedder.embed_calls() < target {
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "embed calls never reached {target} (got {})",
                embedder.embed_calls()
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
