/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Decides, after each work unit, whether the storage should commit now or wait.
//!
//! Committing is slow, so the storage prefers to wait until a burst of requests has ended: as long as
//! other work units are still pending, the next one to finish will look at the question again. When
//! the last pending work unit finishes and there is anything dirty, the storage commits.
//!
//! Waiting is bounded by the [save threshold](SaveThreshold): once the number of dirty objects reaches
//! it, the storage commits right after the work unit that reached it, before the next queued work
//! unit runs, no matter how many work units are still pending.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Default maximum number of dirty objects tolerated before a commit is forced.
pub const DEFAULT_SAVE_THRESHOLD: usize = 500;

/// What the storage should do after a work unit completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveDecision {
    /// There is nothing to commit.
    Clean,
    /// There are dirty objects, but other work units are pending; let them finish first.
    Defer,
    /// Commit now.
    Commit(CommitReason),
}

/// Why a commit happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitReason {
    /// The last pending work unit finished with dirty objects left behind.
    Idle,
    /// The number of dirty objects reached the save threshold.
    Threshold,
    /// A caller asked for a commit explicitly.
    Forced,
    /// A running work unit saved its changes so far.
    Save,
}

impl CommitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitReason::Idle => "Idle",
            CommitReason::Threshold => "Threshold",
            CommitReason::Forced => "Forced",
            CommitReason::Save => "Save",
        }
    }
}

/// Decide what to do given the number of work units still `pending` (not counting the one that just
/// finished), the number of `dirty` objects, and the save `threshold`.
pub fn decide(pending: usize, dirty: usize, threshold: usize) -> SaveDecision {
    if dirty == 0 {
        SaveDecision::Clean
    } else if dirty >= threshold {
        SaveDecision::Commit(CommitReason::Threshold)
    } else if pending == 0 {
        SaveDecision::Commit(CommitReason::Idle)
    } else {
        SaveDecision::Defer
    }
}

/// The save threshold, readable from the storage context and writable from anywhere.
#[derive(Debug)]
pub(crate) struct SaveThreshold(AtomicUsize);

impl SaveThreshold {
    pub(crate) fn new(threshold: usize) -> SaveThreshold {
        SaveThreshold(AtomicUsize::new(threshold))
    }

    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, threshold: usize) {
        self.0.store(threshold, Ordering::Release)
    }
}

impl Default for SaveThreshold {
    fn default() -> Self {
        SaveThreshold::new(DEFAULT_SAVE_THRESHOLD)
    }
}
