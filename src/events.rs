/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events emitted by the storage for event handling and logging.
//! Note: an event for a given action indicates that the action has been completed (or, for the
//! failure events, that it has been abandoned).

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::errors::{CommitError, PropagationError};
use crate::scheduler::CommitReason;

pub enum Event {
    // Events on the storage context.
    Commit(CommitEvent),
    CommitFailed(CommitFailedEvent),
    ThresholdReached(ThresholdReachedEvent),
    // Events on the foreground context.
    Propagate(PropagateEvent),
    PropagationFailed(PropagationFailedEvent),
}

impl Event {
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            // Fails only once the event bus has been shut down.
            let _ = event_publisher.send(event);
        }
    }
}

/// The primary context committed its outstanding changes.
pub struct CommitEvent {
    pub timestamp: SystemTime,
    pub reason: CommitReason,
    /// How many objects were dirty right before the commit.
    pub committed: usize,
    /// How many work units were still pending when the commit started.
    pub pending: usize,
}

/// The primary context rejected a commit. The outstanding changes are still in memory.
pub struct CommitFailedEvent {
    pub timestamp: SystemTime,
    pub reason: CommitReason,
    pub dirty: usize,
    pub error: CommitError,
}

/// A work unit left at least as many dirty objects behind as the save threshold allows, forcing a
/// commit while other work units were still pending.
pub struct ThresholdReachedEvent {
    pub timestamp: SystemTime,
    pub dirty: usize,
    pub threshold: usize,
    pub pending: usize,
}

/// A committed change set was merged into the secondary context, and the post-commit notifications
/// were fired.
pub struct PropagateEvent {
    pub timestamp: SystemTime,
    pub notifications: usize,
}

/// A committed change set could not be merged into the secondary context. The post-commit
/// notifications were fired regardless.
pub struct PropagationFailedEvent {
    pub timestamp: SystemTime,
    pub error: PropagationError,
    pub notifications: usize,
}
