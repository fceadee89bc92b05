// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable output for FMDM snapshots.

use fidx_core::{Fmdm, FolderView};

pub fn list(fmdm: &Fmdm) {
    if fmdm.folders.is_empty() {
        println!("no folders are managed");
        return;
    }
    for folder in &fmdm.folders {
        println!("{}", folder_line(folder));
    }
}

pub fn status(fmdm: &Fmdm) {
    println!("fidxd pid {} (started {})", fmdm.daemon.pid, fmdm.daemon.started_at);
    println!("folders: {}", fmdm.folders.len());
    for folder in &fmdm.folders {
        println!("  {}", folder_line(folder));
    }
    println!("clients: {}", fmdm.clients.len());
    println!("curated models:");
    for model in &fmdm.curated_models {
        let installed = if model.installed { "installed" } else { "not installed" };
        match model.dimensions {
            Some(dims) => println!("  {} ({installed}, {dims}d)", model.id),
            None => println!("  {} ({installed})", model.id),
        }
    }
}

pub fn watch_line(fmdm: &Fmdm) {
    let states: Vec<String> = fmdm.folders.iter().map(folder_line).collect();
    if states.is_empty() {
        println!("[fmdm] no folders");
    } else {
        println!("[fmdm] {}", states.join(" | "));
    }
}

fn folder_line(folder: &FolderView) -> String {
    let mut line = format!("{} [{}] {}", folder.path.display(), folder.model_id, folder.state);
    if let Some(progress) = folder.progress {
        line.push_str(&format!(" {progress}%"));
    }
    if let Some(notification) = &folder.notification {
        line.push_str(&format!(" ({:?}: {})", notification.kind, notification.message));
    }
    line
}
