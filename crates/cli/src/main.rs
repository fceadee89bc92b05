// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fidx: control client for the fidx daemon.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod env;
mod render;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fidx_core::{ClientKind, ModelId, RequestId};
use fidx_wire::{ClientRequest, DaemonMessage};

use crate::client::Client;

#[derive(Parser)]
#[command(name = "fidx", version, about = "Semantic folder indexing daemon client")]
struct Cli {
    /// Daemon socket path (default: <state dir>/fidxd.sock)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start managing a folder
    Add {
        path: PathBuf,
        /// Embedding model to use for this folder
        #[arg(long, default_value = "minilm-l6-v2")]
        model: String,
    },

    /// Stop managing a folder and delete its index
    Remove { path: PathBuf },

    /// List managed folders
    List,

    /// Show daemon status
    Status,

    /// Stream FMDM snapshots as they are published
    Watch,

    /// Route a semantic search against a managed folder
    Search {
        path: PathBuf,
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Check daemon liveness
    Ping,

    /// Gracefully stop the daemon
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = match cli.socket {
        Some(path) => path,
        None => env::socket_path()?,
    };

    let mut client = Client::connect(&socket, ClientKind::Cli)
        .await
        .with_context(|| format!("could not reach fidxd at {}", socket.display()))?;

    match cli.command {
        Command::Add { path, model } => {
            let path = absolutize(&path)?;
            let reply = client
                .request(ClientRequest::FolderAdd {
                    id: RequestId::generate(),
                    path: path.clone(),
                    model_id: ModelId::new(model),
                })
                .await?;
            expect_ok(reply, || format!("added {}", path.display()))
        }

        Command::Remove { path } => {
            let path = absolutize(&path)?;
            let reply = client
                .request(ClientRequest::FolderRemove {
                    id: RequestId::generate(),
                    path: path.clone(),
                })
                .await?;
            expect_ok(reply, || format!("removed {}", path.display()))
        }

        Command::List => {
            render::list(&client.snapshot());
            Ok(())
        }

        Command::Status => {
            render::status(&client.snapshot());
            Ok(())
        }

        Command::Watch => client.watch().await,

        Command::Search { path, query, limit } => {
            let path = absolutize(&path)?;
            let reply = client
                .request(ClientRequest::SearchRequest {
                    id: RequestId::generate(),
                    folder_path: path,
                    query,
                    limit,
                })
                .await?;
            expect_ok(reply, || "search routed".to_string())
        }

        Command::Ping => {
            let reply = client.request(ClientRequest::Ping { id: RequestId::generate() }).await?;
            expect_ok(reply, || "pong".to_string())
        }

        Command::Shutdown => {
            let reply = client
                .request(ClientRequest::DaemonShutdown { id: RequestId::generate() })
                .await?;
            expect_ok(reply, || "daemon is shutting down".to_string())
        }
    }
}

/// Resolve a user-supplied path to the absolute form the daemon keys by.
fn absolutize(path: &std::path::Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

fn expect_ok(reply: DaemonMessage, success: impl FnOnce() -> String) -> Result<()> {
    match reply {
        DaemonMessage::Reply { ok: true, note, .. } => {
            match note {
                Some(note) => println!("{} ({note})", success()),
                None => println!("{}", success()),
            }
            Ok(())
        }
        DaemonMessage::Reply { ok: false, error, .. } => match error {
            Some(error) => bail!("{}: {}", format!("{:?}", error.kind), error.message),
            None => bail!("request failed"),
        },
        DaemonMessage::Error { message } => bail!("protocol error: {message}"),
        other => bail!("unexpected reply: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn absolutize_keeps_absolute_paths() {
        let abs = absolutize(std::path::Path::new("/data/docs")).unwrap();
        assert_eq!(abs, PathBuf::from("/data/docs"));
    }

    #[test]
    fn absolutize_anchors_relative_paths() {
        let resolved = absolutize(std::path::Path::new("docs")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("docs"));
    }
}
