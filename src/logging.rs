/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the storage's
//! [configuration](crate::config::Configuration).
//!
//! The storage logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [Commit](crate::events::CommitEvent) is printed:
//!
//! ```text
//! Commit, 1701329264, Idle, 12, 0
//! ```
//!
//! In the snippet:
//! - The third value is why the commit happened.
//! - The fourth value is the number of objects committed.
//! - The fifth value is the number of work units that were still pending.

use std::time::SystemTime;

use crate::events::*;

// Names of each event in PascalCase for printing:
pub const COMMIT: &str = "Commit";
pub const COMMIT_FAILED: &str = "CommitFailed";
pub const THRESHOLD_REACHED: &str = "ThresholdReached";
pub const PROPAGATE: &str = "Propagate";
pub const PROPAGATION_FAILED: &str = "PropagationFailed";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for CommitEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_event: &CommitEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT,
                secs_since_unix_epoch(commit_event.timestamp),
                commit_event.reason.as_str(),
                commit_event.committed,
                commit_event.pending
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitFailedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_failed_event: &CommitFailedEvent| {
            log::warn!(
                "{}, {}, {}, {}, {}",
                COMMIT_FAILED,
                secs_since_unix_epoch(commit_failed_event.timestamp),
                commit_failed_event.reason.as_str(),
                commit_failed_event.dirty,
                commit_failed_event.error
            )
        };
        Box::new(logger)
    }
}

impl Logger for ThresholdReachedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |threshold_reached_event: &ThresholdReachedEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                THRESHOLD_REACHED,
                secs_since_unix_epoch(threshold_reached_event.timestamp),
                threshold_reached_event.dirty,
                threshold_reached_event.threshold,
                threshold_reached_event.pending
            )
        };
        Box::new(logger)
    }
}

impl Logger for PropagateEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propagate_event: &PropagateEvent| {
            log::info!(
                "{}, {}, {}",
                PROPAGATE,
                secs_since_unix_epoch(propagate_event.timestamp),
                propagate_event.notifications
            )
        };
        Box::new(logger)
    }
}

impl Logger for PropagationFailedEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propagation_failed_event: &PropagationFailedEvent| {
            log::warn!(
                "{}, {}, {}, {}",
                PROPAGATION_FAILED,
                secs_since_unix_epoch(propagation_failed_event.timestamp),
                propagation_failed_event.notifications,
                propagation_failed_event.error
            )
        };
        Box::new(logger)
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
