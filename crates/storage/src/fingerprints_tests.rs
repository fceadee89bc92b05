// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fidx_core::ModelId;
use tempfile::TempDir;

fn fp(relpath: &str, hash: &str) -> DocumentFingerprint {
    DocumentFingerprint {
        relpath: relpath.into(),
        content_hash: hash.to_string(),
        size: hash.len() as u64,
        mtime_epoch_ms: 1000,
        model_id: ModelId::new("m1"),
    }
}

#[test]
fn commit_then_reopen_restores_entries() {
    let dir = TempDir::new().unwrap();

    {
        let mut table = FingerprintTable::open(dir.path()).unwrap();
        table.commit(fp("a.txt", "h1")).unwrap();
        table.commit(fp("b/c.txt", "h2")).unwrap();
    }

    let table = FingerprintTable::open(dir.path()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(Path::new("a.txt")).unwrap().content_hash, "h1");
    assert_eq!(table.get(Path::new("b/c.txt")).unwrap().content_hash, "h2");
}

#[test]
fn upsert_keeps_latest_record() {
    let dir = TempDir::new().unwrap();

    {
        let mut table = FingerprintTable::open(dir.path()).unwrap();
        table.commit(fp("a.txt", "old")).unwrap();
        table.commit(fp("a.txt", "new")).unwrap();
    }

    let table = FingerprintTable::open(dir.path()).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(Path::new("a.txt")).unwrap().content_hash, "new");
}

#[test]
fn forget_removes_across_reopen_and_is_idempotent() {
    let dir = TempDir::new().unwrap();

    {
        let mut table = FingerprintTable::open(dir.path()).unwrap();
        table.commit(fp("a.txt", "h1")).unwrap();
        table.forget(Path::new("a.txt")).unwrap();
        table.forget(Path::new("a.txt")).unwrap();
        table.forget(Path::new("never-existed.txt")).unwrap();
    }

    let table = FingerprintTable::open(dir.path()).unwrap();
    assert!(table.is_empty());
}

#[test]
fn torn_final_line_is_dropped_and_previous_record_wins() {
    let dir = TempDir::new().unwrap();

    {
        let mut table = FingerprintTable::open(dir.path()).unwrap();
        table.commit(fp("a.txt", "h1")).unwrap();
    }

    // Simulate a crash mid-append: half a JSON record at the tail.
    let log = dir.path().join(FINGERPRINTS_FILE);
    let mut file = OpenOptions::new().append(true).open(&log).unwrap();
    file.write_all(b"{\"op\":\"put\",\"finger").unwrap();
    drop(file);

    let table = FingerprintTable::open(dir.path()).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(Path::new("a.txt")).unwrap().content_hash, "h1");

    // The damaged log was rotated aside and rewritten clean.
    assert!(log.with_extension("jsonl.bak").exists());
    let reopened = FingerprintTable::open(dir.path()).unwrap();
    assert_eq!(reopened.len(), 1);
}

#[test]
fn compaction_shrinks_log_and_preserves_state() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join(FINGERPRINTS_FILE);

    let mut table = FingerprintTable::open(dir.path()).unwrap();
    // Rewrite one document enough times to trip compaction.
    for i in 0..40 {
        table.commit(fp("a.txt", &format!("h{i}"))).unwrap();
    }
    table.commit(fp("b.txt", "hb")).unwrap();
    drop(table);

    let lines = std::fs::read_to_string(&log).unwrap().lines().count();
    assert!(lines < 40, "log should have been compacted, found {lines} lines");

    let table = FingerprintTable::open(dir.path()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(Path::new("a.txt")).unwrap().content_hash, "h39");
}

#[test]
fn verify_store_agreement() {
    let dir = TempDir::new().unwrap();
    let mut table = FingerprintTable::open(dir.path()).unwrap();
    table.commit(fp("a.txt", "h1")).unwrap();

    let matching: HashSet<PathBuf> = [PathBuf::from("a.txt")].into();
    assert_eq!(table.verify_store(Some(&matching)), RegistryHealth::Ok);

    let disagreeing: HashSet<PathBuf> = [PathBuf::from("other.txt")].into();
    assert!(matches!(
        table.verify_store(Some(&disagreeing)),
        RegistryHealth::NeedsRebuild { .. }
    ));
}

#[test]
fn verify_store_missing_store() {
    let dir = TempDir::new().unwrap();
    let mut table = FingerprintTable::open(dir.path()).unwrap();

    // Fresh folder: nothing indexed yet, missing store is fine.
    assert_eq!(table.verify_store(None), RegistryHealth::Ok);

    table.commit(fp("a.txt", "h1")).unwrap();
    assert!(matches!(
        table.verify_store(None),
        RegistryHealth::NeedsRebuild { .. }
    ));
}

#[test]
fn clear_drops_everything_across_reopen() {
    let dir = TempDir::new().unwrap();
    let mut table = FingerprintTable::open(dir.path()).unwrap();
    table.commit(fp("a.txt", "h1")).unwrap();
    table.commit(fp("b.txt", "h2")).unwrap();

    table.clear().unwrap();
    assert!(table.is_empty());

    // Commits after a clear still work and survive reopen.
    table.commit(fp("c.txt", "h3")).unwrap();
    drop(table);

    let table = FingerprintTable::open(dir.path()).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.get(Path::new("c.txt")).is_some());
}

#[test]
fn snapshot_is_detached_from_table() {
    let dir = TempDir::new().unwrap();
    let mut table = FingerprintTable::open(dir.path()).unwrap();
    table.commit(fp("a.txt", "h1")).unwrap();

    let snapshot = table.snapshot();
    table.forget(Path::new("a.txt")).unwrap();

    assert!(snapshot.contains_key(Path::new("a.txt")));
    assert!(table.is_empty());
}
