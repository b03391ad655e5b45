/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Error types returned by the storage engine and by the pluggable persistence contexts.

use thiserror::Error;

/// Errors returned by the public operations of [`Storage`](crate::storage::Storage) and
/// [`ExecutionContext`](crate::executor::ExecutionContext).
///
/// A [`Reentrancy`](StorageError::Reentrancy) error is a programming error: the caller would have
/// deadlocked waiting on itself.
#[derive(Debug, Error)]
#[must_use = "a storage error signals a lost request or a misuse of the storage context"]
pub enum StorageError {
    /// A blocking submission was made from inside the execution context it targets. This is a
    /// programming error: the call would otherwise wait on itself forever.
    #[error("blocking submission to execution context `{context}` from within that context")]
    Reentrancy { context: String },

    /// The worker thread of the execution context has exited, either because it was shut down or
    /// because a previously submitted work unit panicked.
    #[error("execution context `{context}` is no longer running")]
    ContextTerminated { context: String },

    /// The commit triggered by (or requested through) this call was rejected by the primary context.
    /// The uncommitted changes remain in the primary context.
    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),
}

/// Returned by [`PrimaryContext::commit`](crate::pluggables::PrimaryContext::commit) when the
/// outstanding changes could not be made durable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("validation rejected the outstanding changes: {0}")]
    Validation(String),

    #[error("i/o error while committing: {0}")]
    Io(String),
}

/// Returned by [`SecondaryContext::merge_changes`](crate::pluggables::SecondaryContext::merge_changes)
/// when a committed change set could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to merge committed changes into the secondary context: {reason}")]
pub struct PropagationError {
    pub reason: String,
}

impl PropagationError {
    pub fn new(reason: impl Into<String>) -> PropagationError {
        PropagationError {
            reason: reason.into(),
        }
    }
}
