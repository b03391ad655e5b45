/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state shared between a [`Storage`](crate::storage::Storage) handle and the jobs it submits,
//! and the commit pipeline that runs on it.
//!
//! # The commit pipeline
//!
//! Once the [scheduler](crate::scheduler) decides to commit, or a work unit calls
//! [`WorkUnit::save`], the following steps run on the storage context, without any other work unit
//! running in between:
//! 1. The pre-commit hooks, then [`PrimaryContext::will_commit`].
//! 2. [`PrimaryContext::commit`]. If it fails, the pipeline stops here: a
//!    [`CommitFailed`](crate::events::CommitFailedEvent) event is published, the error is returned to
//!    whoever triggered the commit, and the dirty objects stay in the primary context to be retried by
//!    the next commit.
//! 3. [`PrimaryContext::did_commit`], then the post-commit hooks.
//!
//! The returned change set is then handed over to the foreground context, which:
//! 4. Merges it into the secondary context. A failed merge is reported through a
//!    [`PropagationFailed`](crate::events::PropagationFailedEvent) event; the commit is not undone.
//! 5. Fires the [broadcast bus](crate::bus), whether or not the merge succeeded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::SystemTime;

use crate::bus::BroadcastBus;
use crate::errors::{CommitError, StorageError};
use crate::events::*;
use crate::executor::ExecutionContext;
use crate::hooks::CommitHooks;
use crate::pending::PendingRequests;
use crate::pluggables::{PrimaryContext, SecondaryContext};
use crate::scheduler::{self, CommitReason, SaveDecision, SaveThreshold};
use crate::storage::WorkUnit;

pub(crate) struct StorageCore<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> {
    pub(crate) context: ExecutionContext,
    pub(crate) foreground: ExecutionContext,
    // Only locked on `context`.
    primary: Mutex<P>,
    // Only locked on `foreground`.
    secondary: Mutex<S>,
    pub(crate) pending: PendingRequests,
    pub(crate) threshold: SaveThreshold,
    pub(crate) hooks: CommitHooks,
    pub(crate) bus: BroadcastBus,
    commits: AtomicU64,
    event_publisher: Option<Sender<Event>>,
}

impl<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> StorageCore<P, S> {
    pub(crate) fn new(
        context: ExecutionContext,
        foreground: ExecutionContext,
        primary: P,
        secondary: S,
        save_threshold: usize,
        event_publisher: Option<Sender<Event>>,
    ) -> StorageCore<P, S> {
        StorageCore {
            context,
            foreground,
            primary: Mutex::new(primary),
            secondary: Mutex::new(secondary),
            pending: PendingRequests::new(),
            threshold: SaveThreshold::new(save_threshold),
            hooks: CommitHooks::new(),
            bus: BroadcastBus::new(),
            commits: AtomicU64::new(0),
            event_publisher,
        }
    }

    pub(crate) fn primary(&self) -> MutexGuard<'_, P> {
        self.primary.lock().unwrap()
    }

    pub(crate) fn secondary(&self) -> MutexGuard<'_, S> {
        self.secondary.lock().unwrap()
    }

    /// Read the dirty count while already on the storage context. Fails if a work unit currently
    /// holds the primary context, i.e. if called from inside one.
    pub(crate) fn dirty_count_in_context(&self) -> Result<usize, StorageError> {
        match self.primary.try_lock() {
            Ok(primary) => Ok(primary.dirty_count()),
            Err(TryLockError::WouldBlock) => Err(self.reentrancy()),
            Err(TryLockError::Poisoned(_)) => Err(StorageError::ContextTerminated {
                context: self.context.label().to_string(),
            }),
        }
    }

    pub(crate) fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    pub(crate) fn reentrancy(&self) -> StorageError {
        log::error!(
            "Blocking storage request made from within the storage context {} ({})",
            self.context.label(),
            self.context.id()
        );
        StorageError::Reentrancy {
            context: self.context.label().to_string(),
        }
    }

    /// Run a work unit on the storage context, then mark it finished and let the scheduler decide
    /// whether to commit. Must be called on the storage context, once per submission counted in
    /// `pending`.
    pub(crate) fn run_work_unit<T>(
        self: &Arc<Self>,
        work: impl FnOnce(&mut WorkUnit<'_, P, S>) -> T,
    ) -> Result<T, StorageError> {
        let value = {
            let mut primary = self.primary();
            let mut unit = WorkUnit::new(self, &mut *primary);
            work(&mut unit)
        };
        let pending = self.pending.decrement();
        self.maybe_commit(pending)?;
        Ok(value)
    }

    fn maybe_commit(self: &Arc<Self>, pending: usize) -> Result<(), CommitError> {
        let dirty = self.primary().dirty_count();
        let threshold = self.threshold.get();

        match scheduler::decide(pending, dirty, threshold) {
            SaveDecision::Clean => Ok(()),
            SaveDecision::Defer => {
                log::trace!(
                    "Deferring commit of {} dirty objects, {} work units pending",
                    dirty,
                    pending
                );
                Ok(())
            }
            SaveDecision::Commit(reason) => {
                if reason == CommitReason::Threshold && pending > 0 {
                    Event::publish(
                        &self.event_publisher,
                        Event::ThresholdReached(ThresholdReachedEvent {
                            timestamp: SystemTime::now(),
                            dirty,
                            threshold,
                            pending,
                        }),
                    );
                }
                self.commit(reason, pending)
            }
        }
    }

    /// Commit if anything is dirty, regardless of pending work units. Must be called on the storage
    /// context.
    pub(crate) fn commit_if_dirty(self: &Arc<Self>, reason: CommitReason) -> Result<(), CommitError> {
        if self.primary().dirty_count() == 0 {
            return Ok(());
        }
        self.commit(reason, self.pending.get())
    }

    fn commit(self: &Arc<Self>, reason: CommitReason, pending: usize) -> Result<(), CommitError> {
        debug_assert!(self.context.is_current());

        self.hooks.run_pre_commit();
        let (dirty, result) = commit_primary(&mut *self.primary());
        self.finish_commit(reason, pending, dirty, result)
    }

    /// Commit on behalf of a running work unit, which already holds the primary context. Must be
    /// called on the storage context.
    pub(crate) fn commit_held(
        self: &Arc<Self>,
        primary: &mut P,
        reason: CommitReason,
    ) -> Result<(), CommitError> {
        debug_assert!(self.context.is_current());

        if primary.dirty_count() == 0 {
            return Ok(());
        }

        self.hooks.run_pre_commit();
        let (dirty, result) = commit_primary(primary);
        self.finish_commit(reason, self.pending.get(), dirty, result)
    }

    fn finish_commit(
        self: &Arc<Self>,
        reason: CommitReason,
        pending: usize,
        dirty: usize,
        result: Result<P::ChangeSet, CommitError>,
    ) -> Result<(), CommitError> {
        let changes = match result {
            Ok(changes) => changes,
            Err(error) => {
                log::debug!(
                    "Commit of {} dirty objects ({}) failed: {}",
                    dirty,
                    reason.as_str(),
                    error
                );
                Event::publish(
                    &self.event_publisher,
                    Event::CommitFailed(CommitFailedEvent {
                        timestamp: SystemTime::now(),
                        reason,
                        dirty,
                        error: error.clone(),
                    }),
                );
                return Err(error);
            }
        };

        self.commits.fetch_add(1, Ordering::AcqRel);
        log::debug!("Committed {} dirty objects ({})", dirty, reason.as_str());

        self.hooks.run_post_commit();

        Event::publish(
            &self.event_publisher,
            Event::Commit(CommitEvent {
                timestamp: SystemTime::now(),
                reason,
                committed: dirty,
                pending,
            }),
        );

        self.propagate(changes);
        Ok(())
    }

    fn propagate(self: &Arc<Self>, changes: P::ChangeSet) {
        let core = Arc::clone(self);
        if let Err(err) = self
            .foreground
            .run_async(move || core.merge_into_secondary(changes))
        {
            log::error!("Committed changes were not propagated: {}", err);
        }
    }

    // Runs on the foreground context.
    fn merge_into_secondary(&self, changes: P::ChangeSet) {
        let merged = {
            let mut secondary = self.secondary();
            let merged = secondary.merge_changes(&changes);
            if merged.is_ok() {
                secondary.did_merge_changes();
            }
            merged
        };

        let notifications = self.bus.fire();

        match merged {
            Ok(()) => Event::publish(
                &self.event_publisher,
                Event::Propagate(PropagateEvent {
                    timestamp: SystemTime::now(),
                    notifications,
                }),
            ),
            Err(error) => {
                log::debug!("Merge into the secondary context failed: {}", error);
                Event::publish(
                    &self.event_publisher,
                    Event::PropagationFailed(PropagationFailedEvent {
                        timestamp: SystemTime::now(),
                        error,
                        notifications,
                    }),
                )
            }
        }
    }
}

// Returns the number of objects that were dirty going in, and the outcome of the commit.
fn commit_primary<P: PrimaryContext>(primary: &mut P) -> (usize, Result<P::ChangeSet, CommitError>) {
    primary.will_commit();
    let dirty = primary.dirty_count();
    let result = primary.commit();
    if result.is_ok() {
        primary.did_commit();
    }
    (dirty, result)
}
