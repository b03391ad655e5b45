use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use buffered_storage::{
    config::Configuration,
    scheduler::{CommitReason, DEFAULT_SAVE_THRESHOLD},
    storage::{Storage, StorageSpec},
};
use log::LevelFilter;

mod common;

use crate::common::{
    logging::setup_logger,
    mem_store::{MemStore, MemView},
    wait::{wait_until, TIMEOUT},
};

type CommitRecord = (CommitReason, usize, usize);

// Start a storage whose commits are reported, as (reason, committed, pending), on the returned
// receiver.
fn start_storage(
    store: MemStore,
    save_threshold: usize,
) -> (Storage<MemStore, MemView>, mpsc::Receiver<CommitRecord>) {
    let (commit_sender, commit_receiver) = mpsc::channel();
    let storage = StorageSpec::builder()
        .primary(store)
        .secondary(MemView::new())
        .configuration(
            Configuration::builder()
                .save_threshold(save_threshold)
                .log_events(true)
                .build(),
        )
        .on_commit(move |commit_event| {
            let _ = commit_sender.send((
                commit_event.reason,
                commit_event.committed,
                commit_event.pending,
            ));
        })
        .build()
        .start();
    (storage, commit_receiver)
}

// Schedule a work unit that blocks the storage context until the returned sender is used, so that
// everything scheduled afterwards is pending at the same time.
fn hold_storage(storage: &Storage<MemStore, MemView>) -> mpsc::Sender<()> {
    let (release, released) = mpsc::channel::<()>();
    storage.schedule(move |_| {
        let _ = released.recv();
    });
    release
}

#[test]
fn a_burst_of_writes_is_committed_once_it_ends() {
    setup_logger(LevelFilter::Trace);

    let store = MemStore::new();
    let (storage, commits) = start_storage(store.clone(), DEFAULT_SAVE_THRESHOLD);

    let release = hold_storage(&storage);
    for i in 0..3 {
        storage.schedule(move |store| store.set(&format!("friend-{}", i), "online"));
    }
    assert_eq!(storage.pending_requests(), 4);
    release.send(()).unwrap();

    assert!(wait_until(TIMEOUT, || storage.pending_requests() == 0));
    assert_eq!(storage.current_dirty_count().unwrap(), 0);
    assert_eq!(store.commit_attempts(), 1);
    assert_eq!(storage.commit_count(), 1);
    assert_eq!(store.committed("friend-2").as_deref(), Some("online"));

    let (reason, committed, pending) = commits.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(reason, CommitReason::Idle);
    assert_eq!(committed, 3);
    assert_eq!(pending, 0);
    assert!(commits.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn reaching_the_threshold_commits_before_the_burst_ends() {
    setup_logger(LevelFilter::Trace);

    let store = MemStore::new();
    let (storage, commits) = start_storage(store.clone(), 2);

    let release = hold_storage(&storage);
    for i in 0..5 {
        storage.schedule(move |store| store.set(&format!("friend-{}", i), "online"));
    }
    release.send(()).unwrap();

    let first = commits.recv_timeout(TIMEOUT).unwrap();
    let second = commits.recv_timeout(TIMEOUT).unwrap();
    let third = commits.recv_timeout(TIMEOUT).unwrap();

    // The second and fourth writes reach the threshold while writes are still pending.
    assert_eq!(first, (CommitReason::Threshold, 2, 3));
    assert_eq!(second, (CommitReason::Threshold, 2, 1));
    // The fifth write leaves one dirty object behind when the burst ends.
    assert_eq!(third, (CommitReason::Idle, 1, 0));

    assert!(wait_until(TIMEOUT, || storage.pending_requests() == 0));
    assert_eq!(store.commit_attempts(), 3);
    assert_eq!(storage.current_dirty_count().unwrap(), 0);
}

#[test]
fn reads_alone_never_commit() {
    setup_logger(LevelFilter::Trace);

    let store = MemStore::new();
    let (storage, commits) = start_storage(store.clone(), DEFAULT_SAVE_THRESHOLD);

    let seen = Arc::new(AtomicUsize::new(0));
    for _ in 0..20 {
        let seen = Arc::clone(&seen);
        storage.schedule(move |store| {
            if store.get("friend").is_none() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
    }
    let value = storage.execute(|store| store.get("friend")).unwrap();

    assert_eq!(value, None);
    assert_eq!(seen.load(Ordering::SeqCst), 20);
    assert_eq!(storage.pending_requests(), 0);
    assert_eq!(store.commit_attempts(), 0);
    assert!(commits.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn execute_commits_before_returning_when_it_ends_the_burst() {
    setup_logger(LevelFilter::Trace);

    let store = MemStore::new();
    let (storage, _commits) = start_storage(store.clone(), DEFAULT_SAVE_THRESHOLD);

    let previous = storage
        .execute(|store| {
            let previous = store.get("status");
            store.set("status", "away");
            previous
        })
        .unwrap();

    assert_eq!(previous, None);
    assert_eq!(store.committed("status").as_deref(), Some("away"));
    assert_eq!(store.commit_attempts(), 1);
    assert_eq!(storage.pending_requests(), 0);
}

#[test]
fn lowering_the_threshold_takes_effect_on_the_next_work_unit() {
    setup_logger(LevelFilter::Trace);

    let store = MemStore::new();
    let (storage, commits) = start_storage(store.clone(), DEFAULT_SAVE_THRESHOLD);
    assert_eq!(storage.save_threshold(), DEFAULT_SAVE_THRESHOLD);

    let release = hold_storage(&storage);
    storage.schedule(|store| store.set("a", "1"));
    storage.schedule(|store| store.set("b", "2"));
    storage.set_save_threshold(1);
    assert_eq!(storage.save_threshold(), 1);
    release.send(()).unwrap();

    assert_eq!(
        commits.recv_timeout(TIMEOUT).unwrap(),
        (CommitReason::Threshold, 1, 1)
    );
    assert_eq!(
        commits.recv_timeout(TIMEOUT).unwrap(),
        (CommitReason::Threshold, 1, 0)
    );
}

#[test]
fn work_units_never_overlap() {
    setup_logger(LevelFilter::Debug);

    let store = MemStore::new();
    let (storage, _commits) = start_storage(store.clone(), 16);
    let storage = Arc::new(storage);

    let in_work_unit = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let storage = Arc::clone(&storage);
            let in_work_unit = Arc::clone(&in_work_unit);
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                for i in 0..50 {
                    let in_work_unit = Arc::clone(&in_work_unit);
                    let overlaps = Arc::clone(&overlaps);
                    storage.schedule(move |store| {
                        if in_work_unit.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        store.set(&format!("{}-{}", producer, i), "online");
                        thread::yield_now();
                        in_work_unit.store(false, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(wait_until(TIMEOUT, || storage.pending_requests() == 0));
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(storage.current_dirty_count().unwrap(), 0);
    assert_eq!(store.committed("3-49").as_deref(), Some("online"));
    assert!(storage.commit_count() >= 1);
}
