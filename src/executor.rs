/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Serialized execution contexts.
//!
//! An [`ExecutionContext`] is a single logical thread of execution: a dedicated worker thread that
//! drains a FIFO queue of jobs, one at a time. The storage engine runs every work unit and every
//! commit on one such context, and propagates committed changes on another (the "foreground"
//! context). Callers may create further contexts to receive post-commit notifications on.
//!
//! ## Context identity
//!
//! Every context carries a [`ContextId`]. Its worker thread records that id in a thread-local slot
//! before it starts draining the queue, so code can ask whether it is currently running inside a
//! given context ([`ExecutionContext::is_current`]). [`ExecutionContext::run_sync`] uses this to
//! reject blocking submissions made from inside the target context, which would otherwise wait on
//! themselves forever.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::errors::StorageError;

pub(crate) type Job = Box<dyn FnOnce() + Send>;

/// Identifies an [`ExecutionContext`]. Unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<ContextId>> = const { Cell::new(None) };
}

/// A handle to a serialized execution context. Cloning the handle does not create a new context:
/// all clones submit to the same worker thread.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    id: ContextId,
    label: String,
    // `None` once the context has been shut down.
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionContext {
    /// Start a new worker thread named `label` and return a handle to it.
    pub fn spawn(label: impl Into<String>) -> ExecutionContext {
        let label = label.into();
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        let (jobs, job_receiver) = mpsc::channel::<Job>();

        let worker = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                CURRENT_CONTEXT.with(|current| current.set(Some(id)));
                while let Ok(job) = job_receiver.recv() {
                    job()
                }
                CURRENT_CONTEXT.with(|current| current.set(None));
            })
            .expect("failed to spawn an execution context worker thread");

        log::debug!("Started execution context {} ({})", label, id);

        ExecutionContext {
            inner: Arc::new(ContextInner {
                id,
                label,
                jobs: Mutex::new(Some(jobs)),
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    /// The id of the context the calling thread is running in, if any.
    pub fn current() -> Option<ContextId> {
        CURRENT_CONTEXT.with(|current| current.get())
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the calling thread is this context's worker thread.
    pub fn is_current(&self) -> bool {
        Self::current() == Some(self.inner.id)
    }

    /// Enqueue `job` and return immediately. Jobs run in submission order.
    pub fn run_async(&self, job: impl FnOnce() + Send + 'static) -> Result<(), StorageError> {
        let jobs = self.inner.jobs.lock().unwrap();
        match jobs.as_ref() {
            Some(jobs) => jobs.send(Box::new(job)).map_err(|_| self.terminated()),
            None => Err(self.terminated()),
        }
    }

    /// Run `job` on this context and block until it returns its result.
    ///
    /// Fails with [`StorageError::Reentrancy`] if called from inside this context.
    pub fn run_sync<T: Send + 'static>(
        &self,
        job: impl FnOnce() -> T + Send + 'static,
    ) -> Result<T, StorageError> {
        if self.is_current() {
            log::error!(
                "Blocking submission to execution context {} ({}) from within itself",
                self.inner.label,
                self.inner.id
            );
            return Err(StorageError::Reentrancy {
                context: self.inner.label.clone(),
            });
        }

        let (result_sender, result_receiver) = mpsc::sync_channel(1);
        self.run_async(move || {
            // The caller only goes away if it panicked; nothing to report to then.
            let _ = result_sender.send(job());
        })?;

        result_receiver.recv().map_err(|_| self.terminated())
    }

    /// Stop accepting jobs, let the queued ones finish, and wait for the worker thread to exit.
    ///
    /// If called from inside this context, the worker is left to exit on its own once the current
    /// job returns.
    pub fn shutdown(&self) {
        drop(self.inner.jobs.lock().unwrap().take());

        if self.is_current() {
            return;
        }

        if let Some(worker) = self.inner.worker.lock().unwrap().take() {
            if worker.join().is_err() {
                log::error!(
                    "Execution context {} ({}) exited after a job panicked",
                    self.inner.label,
                    self.inner.id
                );
            }
        }
    }

    fn terminated(&self) -> StorageError {
        log::error!(
            "Execution context {} ({}) is no longer running",
            self.inner.label,
            self.inner.id
        );
        StorageError::ContextTerminated {
            context: self.inner.label.clone(),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .finish()
    }
}
