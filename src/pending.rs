/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Count of work units that have been submitted to the storage context but have not finished.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub(crate) struct PendingRequests(AtomicUsize);

impl PendingRequests {
    pub(crate) fn new() -> PendingRequests {
        PendingRequests(AtomicUsize::new(0))
    }

    /// Record a submission. Returns the new count.
    pub(crate) fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Record a completion. Returns the new count.
    ///
    /// # Panics
    ///
    /// If there is no outstanding submission to complete.
    pub(crate) fn decrement(&self) -> usize {
        match self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => panic!("pending request counter decremented below zero"),
        }
    }

    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}
