/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Traits for pluggable persistence.
//!
//! The storage engine does not know how entities are modelled or how they reach durable storage.
//! It merely requires that whatever the library user provides as a persistence mechanism exposes:
//! 1. A [primary context](PrimaryContext) that buffers mutations in memory, knows how many objects
//!    are dirty, and can commit them as a batch.
//! 2. A [secondary context](SecondaryContext) that serves reads on a different thread and can merge
//!    the change sets produced by the primary's commits.
//!
//! The primary context is only ever touched on the storage's serialized execution context, and the
//! secondary context only on the foreground execution context, so neither needs to be `Sync`.

use crate::errors::{CommitError, PropagationError};

pub trait PrimaryContext: Send + 'static {
    /// Describes what a successful commit changed, so that it can be replayed onto the secondary.
    type ChangeSet: Send + 'static;

    /// Number of objects that have been mutated in memory but not yet committed.
    fn dirty_count(&self) -> usize;

    /// Make all outstanding changes durable.
    ///
    /// On failure, implementations must leave the outstanding changes in place (the dirty count
    /// must not change), so that a later commit can retry them.
    fn commit(&mut self) -> Result<Self::ChangeSet, CommitError>;

    /// Called on the storage context right before [`commit`](Self::commit). Does nothing by default.
    fn will_commit(&mut self) {}

    /// Called on the storage context right after a successful [`commit`](Self::commit). Does
    /// nothing by default.
    fn did_commit(&mut self) {}
}

pub trait SecondaryContext<C>: Send + 'static {
    /// Merge a committed change set into this context, keeping unrelated state intact.
    fn merge_changes(&mut self, changes: &C) -> Result<(), PropagationError>;

    /// Called on the foreground context right after a successful merge. Does nothing by default.
    fn did_merge_changes(&mut self) {}
}
