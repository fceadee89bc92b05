// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::ModelCatalog;

fn identity() -> DaemonIdentity {
    DaemonIdentity { pid: 4242, started_at: "2026-01-01T00:00:00Z".to_string() }
}

#[test]
fn snapshot_serializes_camel_case() {
    let mut fmdm = Fmdm::new(identity(), ModelCatalog::builtin().models);
    let mut folder = Folder::new("/data/docs".into(), ModelId::new("minilm-l6-v2"), 1);
    folder.state = FolderState::Indexing;
    folder.progress = 30;
    fmdm.folders.push(FolderView::from(&folder));
    fmdm.clients.push(ClientInfo { kind: ClientKind::Cli });

    let value: serde_json::Value = serde_json::to_value(&fmdm).unwrap();
    assert!(value.get("curatedModels").is_some());
    assert_eq!(value["daemon"]["startedAt"], "2026-01-01T00:00:00Z");
    assert_eq!(value["folders"][0]["modelId"], "minilm-l6-v2");
    assert_eq!(value["folders"][0]["state"], "indexing");
    assert_eq!(value["folders"][0]["progress"], 30);
    assert_eq!(value["clients"][0]["kind"], "cli");
}

#[test]
fn progress_is_omitted_outside_scan_and_index() {
    let folder = Folder::new("/data/docs".into(), ModelId::new("m"), 1);
    let view = FolderView::from(&folder);
    assert_eq!(view.progress, None);

    let value = serde_json::to_value(&view).unwrap();
    assert!(value.get("progress").is_none());
}

#[test]
fn progress_is_published_while_active() {
    let mut folder = Folder::new("/data/docs".into(), ModelId::new("m"), 1);
    folder.state = FolderState::Active;
    folder.progress = 100;
    assert_eq!(FolderView::from(&folder).progress, Some(100));
}

#[test]
fn folder_lookup_by_path() {
    let mut fmdm = Fmdm::new(identity(), Vec::new());
    let folder = Folder::new("/data/a".into(), ModelId::new("m"), 1);
    fmdm.folders.push(FolderView::from(&folder));

    assert!(fmdm.folder(std::path::Path::new("/data/a")).is_some());
    assert!(fmdm.folder(std::path::Path::new("/data/b")).is_none());
}

#[test]
fn snapshot_round_trips_through_json() {
    let mut fmdm = Fmdm::new(identity(), ModelCatalog::builtin().models);
    fmdm.clients.push(ClientInfo { kind: ClientKind::Interactive });
    let json = serde_json::to_string(&fmdm).unwrap();
    let back: Fmdm = serde_json::from_str(&json).unwrap();
    assert_eq!(back, fmdm);
}
