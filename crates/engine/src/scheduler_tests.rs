// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn config() -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_tasks: 4,
        folder_queue_limit: 8,
        background_retry_limit: 3,
    }
}

fn task(scheduler: &mut Scheduler, folder: &str, kind: TaskKind, priority: Priority) -> u64 {
    let id = scheduler.next_task_id();
    scheduler.enqueue(Task {
        id,
        folder: folder.into(),
        kind,
        model_id: ModelId::new("m1"),
        priority,
        enqueued_at_ms: 0,
        cancel: CancellationToken::new(),
        attempts: 0,
    });
    id
}

fn embed(relpath: &str) -> TaskKind {
    TaskKind::EmbedDocument { relpath: relpath.into() }
}

fn run_all(_: &Task) -> CanDispatch {
    CanDispatch::Run
}

#[test]
fn immediate_dispatches_before_queued_background() {
    let mut scheduler = Scheduler::new(config());
    task(&mut scheduler, "/f1", embed("a"), Priority::Background);
    let search = task(
        &mut scheduler,
        "/f1",
        TaskKind::EmbedQuery { text: "q".into() },
        Priority::Immediate,
    );

    let popped = scheduler.pop_next(run_all).unwrap();
    assert_eq!(popped.id, search);
}

#[test]
fn fifo_within_a_band() {
    let mut scheduler = Scheduler::new(config());
    let first = task(&mut scheduler, "/f1", TaskKind::Scan, Priority::Interactive);
    let second = task(&mut scheduler, "/f2", TaskKind::Scan, Priority::Interactive);

    assert_eq!(scheduler.pop_next(run_all).unwrap().id, first);
    assert_eq!(scheduler.pop_next(run_all).unwrap().id, second);
}

#[test]
fn scan_excludes_embeds_for_same_folder() {
    let mut scheduler = Scheduler::new(config());
    let scan = task(&mut scheduler, "/f1", TaskKind::Scan, Priority::Interactive);
    task(&mut scheduler, "/f1", embed("a"), Priority::Background);

    let popped = scheduler.pop_next(run_all).unwrap();
    assert_eq!(popped.id, scan);

    // While the scan is in flight the folder's embed stays queued.
    assert!(scheduler.pop_next(run_all).is_none());

    scheduler.complete(scan);
    assert!(scheduler.pop_next(run_all).is_some());
}

#[test]
fn embeds_block_scan_for_same_folder() {
    let mut scheduler = Scheduler::new(config());
    let embed_id = task(&mut scheduler, "/f1", embed("a"), Priority::Background);
    assert_eq!(scheduler.pop_next(run_all).unwrap().id, embed_id);

    task(&mut scheduler, "/f1", TaskKind::Scan, Priority::Background);
    assert!(scheduler.pop_next(run_all).is_none());

    scheduler.complete(embed_id);
    assert!(scheduler.pop_next(run_all).is_some());
}

#[test]
fn query_embeds_are_exempt_from_folder_slots() {
    let mut scheduler = Scheduler::new(config());
    let scan = task(&mut scheduler, "/f1", TaskKind::Scan, Priority::Interactive);
    assert_eq!(scheduler.pop_next(run_all).unwrap().id, scan);

    let query = task(
        &mut scheduler,
        "/f1",
        TaskKind::EmbedQuery { text: "q".into() },
        Priority::Immediate,
    );
    assert_eq!(scheduler.pop_next(run_all).unwrap().id, query);
}

#[test]
fn background_round_robins_across_folders() {
    let mut scheduler = Scheduler::new(config());
    task(&mut scheduler, "/f1", embed("a1"), Priority::Background);
    task(&mut scheduler, "/f1", embed("a2"), Priority::Background);
    task(&mut scheduler, "/f2", embed("b1"), Priority::Background);
    task(&mut scheduler, "/f2", embed("b2"), Priority::Background);

    let mut order = Vec::new();
    while let Some(popped) = scheduler.pop_next(run_all) {
        order.push(popped.folder.clone());
        scheduler.complete(popped.id);
    }

    assert_eq!(
        order,
        vec![
            PathBuf::from("/f1"),
            PathBuf::from("/f2"),
            PathBuf::from("/f1"),
            PathBuf::from("/f2"),
        ]
    );
}

#[test]
fn max_concurrent_bounds_dispatch() {
    let mut scheduler = Scheduler::new(SchedulerConfig {
        max_concurrent_tasks: 2,
        ..config()
    });
    for i in 0..4 {
        task(&mut scheduler, &format!("/f{i}"), TaskKind::Scan, Priority::Background);
    }

    let first = scheduler.pop_next(run_all).unwrap();
    let _second = scheduler.pop_next(run_all).unwrap();
    assert!(scheduler.pop_next(run_all).is_none());

    scheduler.complete(first.id);
    assert!(scheduler.pop_next(run_all).is_some());
}

#[test]
fn paused_background_admits_writes_but_not_new_work() {
    let mut scheduler = Scheduler::new(config());
    scheduler.set_background_paused(true);

    task(&mut scheduler, "/f1", embed("a"), Priority::Background);
    task(&mut scheduler, "/f1", TaskKind::Scan, Priority::Background);
    let write = task(
        &mut scheduler,
        "/f2",
        TaskKind::WriteResults {
            doc: EmbeddedDocument {
                relpath: "a".into(),
                vectors: vec![],
                content_hash: "h".into(),
                size: 0,
                mtime_epoch_ms: 0,
                model_id: ModelId::new("m1"),
            },
        },
        Priority::Background,
    );

    // Only the write (a continuation of in-flight document work) dispatches.
    let popped = scheduler.pop_next(run_all).unwrap();
    assert_eq!(popped.id, write);
    scheduler.complete(write);
    assert!(scheduler.pop_next(run_all).is_none());

    scheduler.set_background_paused(false);
    assert!(scheduler.pop_next(run_all).is_some());
}

#[test]
fn blocked_higher_band_reserves_the_worker() {
    let mut scheduler = Scheduler::new(config());
    let query = task(
        &mut scheduler,
        "/f1",
        TaskKind::EmbedQuery { text: "q".into() },
        Priority::Immediate,
    );
    task(&mut scheduler, "/f2", embed("b"), Priority::Background);

    // The immediate task needs a model load; the background embed must not
    // steal the worker meanwhile.
    let popped = scheduler.pop_next(|t| {
        if t.id == query {
            CanDispatch::NeedsModel
        } else {
            CanDispatch::Run
        }
    });
    assert!(popped.is_none());
}

#[test]
fn blocked_worker_still_allows_non_worker_tasks() {
    let mut scheduler = Scheduler::new(config());
    let query = task(
        &mut scheduler,
        "/f1",
        TaskKind::EmbedQuery { text: "q".into() },
        Priority::Immediate,
    );
    let scan = task(&mut scheduler, "/f2", TaskKind::Scan, Priority::Background);

    let popped = scheduler.pop_next(|t| {
        if t.id == query {
            CanDispatch::NeedsModel
        } else {
            CanDispatch::Run
        }
    });
    assert_eq!(popped.unwrap().id, scan);
}

#[test]
fn cancel_folder_drops_pending_and_cancels_in_flight() {
    let mut scheduler = Scheduler::new(config());
    let running = task(&mut scheduler, "/f1", embed("a"), Priority::Background);
    let popped = scheduler.pop_next(run_all).unwrap();
    assert_eq!(popped.id, running);

    task(&mut scheduler, "/f1", embed("b"), Priority::Background);
    task(&mut scheduler, "/f1", embed("c"), Priority::Background);
    task(&mut scheduler, "/f2", embed("x"), Priority::Background);

    let dropped = scheduler.cancel_folder(Path::new("/f1"));
    assert_eq!(dropped.len(), 2);
    assert!(dropped.iter().all(|t| t.cancel.is_cancelled()));

    // The in-flight task's token is cancelled: discard on completion.
    assert!(popped.cancel.is_cancelled());

    // Other folders are untouched.
    assert_eq!(scheduler.pending_count(), 1);
}

#[test]
fn folder_capacity_reflects_queue_limit() {
    let mut scheduler = Scheduler::new(SchedulerConfig {
        folder_queue_limit: 2,
        ..config()
    });
    assert!(scheduler.has_folder_capacity(Path::new("/f1")));
    task(&mut scheduler, "/f1", embed("a"), Priority::Background);
    task(&mut scheduler, "/f1", embed("b"), Priority::Background);
    assert!(!scheduler.has_folder_capacity(Path::new("/f1")));
    assert!(scheduler.has_folder_capacity(Path::new("/f2")));
}

#[test]
fn commits_are_serialized_per_folder() {
    let mut scheduler = Scheduler::new(config());
    let write = |relpath: &str| TaskKind::WriteResults {
        doc: EmbeddedDocument {
            relpath: relpath.into(),
            vectors: vec![],
            content_hash: "h".into(),
            size: 0,
            mtime_epoch_ms: 0,
            model_id: ModelId::new("m1"),
        },
    };

    let first = task(&mut scheduler, "/f1", write("a"), Priority::Background);
    task(&mut scheduler, "/f1", write("b"), Priority::Background);
    let other_folder = task(&mut scheduler, "/f2", write("c"), Priority::Background);

    assert_eq!(scheduler.pop_next(run_all).unwrap().id, first);
    // Same folder: the second commit waits; another folder's proceeds.
    assert_eq!(scheduler.pop_next(run_all).unwrap().id, other_folder);
    assert!(scheduler.pop_next(run_all).is_none());

    scheduler.complete(first);
    assert!(scheduler.pop_next(run_all).is_some());
}

#[test]
fn immediate_in_flight_is_tracked() {
    let mut scheduler = Scheduler::new(config());
    let query = task(
        &mut scheduler,
        "/f1",
        TaskKind::EmbedQuery { text: "q".into() },
        Priority::Immediate,
    );
    assert!(!scheduler.immediate_in_flight());

    scheduler.pop_next(run_all).unwrap();
    assert!(scheduler.immediate_in_flight());

    scheduler.complete(query);
    assert!(!scheduler.immediate_in_flight());
}
