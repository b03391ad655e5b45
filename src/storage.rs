/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build, run, and submit work to a storage.
//!
//! A [`Storage`] owns a user-provided [primary context](crate::pluggables::PrimaryContext) and lets
//! any number of threads read and write it, while making sure that:
//! 1. Every read and write runs on one [serialized execution context](crate::executor), so the primary
//!    context only ever sees one work unit at a time.
//! 2. Changes are committed in batches, at moments chosen by the [scheduler](crate::scheduler): when a
//!    burst of requests has ended, or when too many objects are dirty.
//! 3. After each commit, the committed changes are merged into a
//!    [secondary context](crate::pluggables::SecondaryContext) on the foreground context, and then
//!    every registered post-commit notification is run on the context it asked for.
//!
//! ## Starting a storage
//!
//! Here is an example that demonstrates how to build and start a storage using the builder pattern:
//!
//! ```ignore
//! let storage =
//!     StorageSpec::builder()
//!     .primary(primary)
//!     .secondary(secondary)
//!     .configuration(configuration)
//!     .on_commit_failed(commit_failed_handler)
//!     .build()
//!     .start()
//! ```
//!
//! ### Required setters
//!
//! - `.primary(...)`
//! - `.secondary(...)`
//!
//! ### Optional setters
//!
//! - `.configuration(...)`: defaults to [`Configuration::default`].
//! - `.foreground(...)`: the execution context the secondary context lives on. If not set, the
//!   storage spawns and owns one.
//! - Handlers for the [events](crate::events) the storage emits: `.on_commit(...)`,
//!   `.on_commit_failed(...)`, `.on_threshold_reached(...)`, `.on_propagate(...)`,
//!   `.on_propagation_failed(...)`.
//!
//! ## Submitting work
//!
//! Work units are closures that receive a [`WorkUnit`], which dereferences to the primary context.
//! [`Storage::execute`] runs one and waits for it; [`Storage::schedule`] queues one and returns
//! immediately. Work units must not submit blocking requests to the same storage: those fail with
//! [`StorageError::Reentrancy`](crate::errors::StorageError::Reentrancy).
//!
//! A work unit that dirties many objects can bound the buffered state by saving as it goes:
//!
//! ```ignore
//! storage.execute(|unit| {
//!     for (key, value) in roster {
//!         unit.set(key, value);
//!         if unit.dirty_count() >= unit.save_threshold() {
//!             unit.save()?;
//!         }
//!     }
//!     Ok(())
//! })
//! ```
//!
//! Code should not commit the primary context directly; doing so bypasses the hooks, the
//! propagation to the secondary context, and the notifications.

use std::ops::{Deref, DerefMut};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use typed_builder::TypedBuilder;

use crate::config::Configuration;
use crate::errors::StorageError;
use crate::event_bus::*;
use crate::events::*;
use crate::executor::ExecutionContext;
use crate::pipeline::StorageCore;
use crate::pluggables::{PrimaryContext, SecondaryContext};
use crate::scheduler::CommitReason;

/// Stores all the parameters and trait implementations required to start a [Storage].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [StorageSpec]. On the builder call the following methods to construct a valid [StorageSpec].

    Required:
    - `.primary(...)`
    - `.secondary(...)`

    Optional:
    - `.configuration(...)`
    - `.foreground(...)`
    - `.on_commit(...)`
    - `.on_commit_failed(...)`
    - `.on_threshold_reached(...)`
    - `.on_propagate(...)`
    - `.on_propagation_failed(...)`
"))]
pub struct StorageSpec<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> {
    // Required parameters
    #[builder(setter(doc = "Set the primary context that work units read and write. The argument must implement the [PrimaryContext](crate::pluggables::PrimaryContext) trait. Required."))]
    primary: P,
    #[builder(setter(doc = "Set the secondary context that committed changes are merged into. The argument must implement the [SecondaryContext](crate::pluggables::SecondaryContext) trait. Required."))]
    secondary: S,
    // Optional parameters
    #[builder(default, setter(doc = "Set the [configuration](Configuration) of the storage. Optional."))]
    configuration: Configuration,
    #[builder(default, setter(strip_option, doc = "Set the execution context the secondary context lives on. Optional, a dedicated one is spawned if not set."))]
    foreground: Option<ExecutionContext>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitEvent>),
    doc = "Register a handler closure to be invoked after the primary context commits. Optional."))]
    on_commit: Option<HandlerPtr<CommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitFailedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitFailedEvent>),
    doc = "Register a handler closure to be invoked after the primary context rejects a commit. Optional."))]
    on_commit_failed: Option<HandlerPtr<CommitFailedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ThresholdReachedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ThresholdReachedEvent>),
    doc = "Register a handler closure to be invoked after the save threshold forces a commit during a burst of work units. Optional."))]
    on_threshold_reached: Option<HandlerPtr<ThresholdReachedEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PropagateEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PropagateEvent>),
    doc = "Register a handler closure to be invoked after committed changes are merged into the secondary context. Optional."))]
    on_propagate: Option<HandlerPtr<PropagateEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PropagationFailedEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PropagationFailedEvent>),
    doc = "Register a handler closure to be invoked after committed changes fail to merge into the secondary context. Optional."))]
    on_propagation_failed: Option<HandlerPtr<PropagationFailedEvent>>,
}

impl<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> StorageSpec<P, S> {
    /// Starts all threads and channels associated with running a storage, and returns the handles to
    /// them in a [Storage] struct.
    pub fn start(self) -> Storage<P, S> {
        let Configuration {
            save_threshold,
            storage_label,
            log_events,
        } = self.configuration;

        let event_handlers = EventHandlers::new(
            log_events,
            self.on_commit,
            self.on_commit_failed,
            self.on_threshold_reached,
            self.on_propagate,
            self.on_propagation_failed,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
                let event_bus = start_event_bus(
                    event_handlers,
                    event_subscriber,
                    event_bus_shutdown_receiver,
                );
                (Some(event_bus), Some(event_bus_shutdown))
            }
            None => (None, None),
        };

        let (foreground, owns_foreground) = match self.foreground {
            Some(foreground) => (foreground, false),
            None => (
                ExecutionContext::spawn(format!("{}-foreground", storage_label)),
                true,
            ),
        };
        let context = ExecutionContext::spawn(storage_label);

        let core = StorageCore::new(
            context,
            foreground,
            self.primary,
            self.secondary,
            save_threshold,
            event_publisher,
        );

        Storage {
            core: Arc::new(core),
            owns_foreground,
            event_bus,
            event_bus_shutdown,
        }
    }
}

/// A handle to a running storage. When this value is dropped, queued work units are run to
/// completion (committing as usual), and then all background threads are shut down.
pub struct Storage<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> {
    core: Arc<StorageCore<P, S>>,
    owns_foreground: bool,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> Storage<P, S> {
    /// Run `work` on the storage context and wait for it to finish.
    ///
    /// If this work unit is the last pending one, or leaves the primary context with at least as many
    /// dirty objects as the save threshold, the resulting commit also runs before this call returns.
    /// If that commit fails, the error is returned instead of the work unit's result; the changes stay
    /// in the primary context.
    ///
    /// Fails with [`StorageError::Reentrancy`] if called from inside the storage context.
    pub fn execute<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WorkUnit<'_, P, S>) -> T + Send + 'static,
    {
        if self.core.context.is_current() {
            return Err(self.core.reentrancy());
        }

        let (result_sender, result_receiver) = mpsc::sync_channel(1);
        self.submit(move |core| {
            // The caller only goes away if it panicked; nothing to report to then.
            let _ = result_sender.send(core.run_work_unit(work));
        })?;

        result_receiver
            .recv()
            .map_err(|_| StorageError::ContextTerminated {
                context: self.core.context.label().to_string(),
            })?
    }

    /// Queue `work` on the storage context and return immediately. Work units run in the order they
    /// were scheduled.
    ///
    /// Failures of commits triggered after this work unit are reported through the
    /// [`CommitFailed`](crate::events::CommitFailedEvent) event.
    pub fn schedule<F>(&self, work: F)
    where
        F: FnOnce(&mut WorkUnit<'_, P, S>) + Send + 'static,
    {
        let submitted = self.submit(move |core| {
            if let Err(err) = core.run_work_unit(work) {
                log::warn!("Scheduled work unit completed, but {}", err);
            }
        });

        if let Err(err) = submitted {
            log::error!("Dropped a scheduled work unit: {}", err);
        }
    }

    // Counts the submission as pending before it is queued, so that the scheduler never sees the
    // counter drop to zero while a submission is on its way.
    fn submit(
        &self,
        job: impl FnOnce(&Arc<StorageCore<P, S>>) + Send + 'static,
    ) -> Result<(), StorageError> {
        self.core.pending.increment();

        let core = Arc::clone(&self.core);
        let submitted = self.core.context.run_async(move || job(&core));
        if submitted.is_err() {
            self.core.pending.decrement();
        }
        submitted
    }

    /// Register `hook` to run on the storage context right before every commit.
    pub fn register_pre_commit_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.core.hooks.add_pre_commit(Arc::new(hook))
    }

    /// Register `hook` to run on the storage context right after every successful commit.
    pub fn register_post_commit_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.core.hooks.add_post_commit(Arc::new(hook))
    }

    /// Register `callback` to run once on `target`, after the next successful commit has been merged
    /// into the secondary context.
    ///
    /// Registering does not trigger a commit.
    pub fn register_post_commit_notification(
        &self,
        callback: impl FnOnce() + Send + 'static,
        target: &ExecutionContext,
    ) {
        self.core.bus.register(callback, target)
    }

    /// Drop every post-commit notification that has not run yet.
    pub fn clear_post_commit_notifications(&self) {
        self.core.bus.clear()
    }

    pub fn save_threshold(&self) -> usize {
        self.core.threshold.get()
    }

    /// Change the maximum number of dirty objects tolerated before a commit is forced. Takes effect
    /// from the next completed work unit on.
    pub fn set_save_threshold(&self, threshold: usize) {
        self.core.threshold.set(threshold)
    }

    /// The number of objects in the primary context that are dirty.
    ///
    /// May be called from the storage context, but not from inside a work unit.
    pub fn current_dirty_count(&self) -> Result<usize, StorageError> {
        if self.core.context.is_current() {
            return self.core.dirty_count_in_context();
        }

        let core = Arc::clone(&self.core);
        self.core
            .context
            .run_sync(move || core.primary().dirty_count())
    }

    /// Commit the primary context now, if anything is dirty, regardless of pending work units. Waits
    /// for the commit (but not for the propagation to the secondary context) to finish.
    ///
    /// It should rarely be necessary to call this: work units trigger commits on their own at
    /// appropriate times.
    pub fn force_commit_now(&self) -> Result<(), StorageError> {
        if self.core.context.is_current() {
            return Err(self.core.reentrancy());
        }

        let core = Arc::clone(&self.core);
        self.core
            .context
            .run_sync(move || core.commit_if_dirty(CommitReason::Forced))??;
        Ok(())
    }

    /// Run `read` against the secondary context on the foreground context, and wait for its result.
    pub fn read_secondary<T, F>(&self, read: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> T + Send + 'static,
    {
        if self.core.foreground.is_current() {
            return Ok(read(&self.core.secondary()));
        }

        let core = Arc::clone(&self.core);
        self.core
            .foreground
            .run_sync(move || read(&core.secondary()))
    }

    /// The number of work units submitted but not yet finished.
    pub fn pending_requests(&self) -> usize {
        self.core.pending.get()
    }

    /// The number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.core.commit_count()
    }

    /// The execution context work units and commits run on.
    pub fn storage_context(&self) -> &ExecutionContext {
        &self.core.context
    }

    /// The execution context the secondary context lives on.
    pub fn foreground_context(&self) -> &ExecutionContext {
        &self.core.foreground
    }
}

/// The view of the storage a running work unit gets. Dereferences to the primary context.
pub struct WorkUnit<'a, P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> {
    core: &'a Arc<StorageCore<P, S>>,
    primary: &'a mut P,
}

impl<'a, P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> WorkUnit<'a, P, S> {
    pub(crate) fn new(
        core: &'a Arc<StorageCore<P, S>>,
        primary: &'a mut P,
    ) -> WorkUnit<'a, P, S> {
        WorkUnit { core, primary }
    }

    /// Commit everything this work unit (and the ones before it) left dirty, right now, through the
    /// full pipeline: hooks, propagation to the secondary context, and notifications. Does nothing
    /// if nothing is dirty.
    ///
    /// Hooks run while this work unit holds the primary context, so they must not call
    /// [`Storage::current_dirty_count`].
    pub fn save(&mut self) -> Result<(), StorageError> {
        self.core
            .commit_held(&mut *self.primary, CommitReason::Save)
            .map_err(StorageError::from)
    }

    /// The current save threshold, for work units that save as they go.
    pub fn save_threshold(&self) -> usize {
        self.core.threshold.get()
    }
}

impl<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> Deref for WorkUnit<'_, P, S> {
    type Target = P;

    fn deref(&self) -> &P {
        &*self.primary
    }
}

impl<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> DerefMut for WorkUnit<'_, P, S> {
    fn deref_mut(&mut self) -> &mut P {
        &mut *self.primary
    }
}

impl<P: PrimaryContext, S: SecondaryContext<P::ChangeSet>> Drop for Storage<P, S> {
    fn drop(&mut self) {
        // The storage context goes first: draining it may still commit and hand changes over to the
        // foreground context, which may in turn publish events.
        self.core.context.shutdown();

        if self.owns_foreground {
            self.core.foreground.shutdown();
        }

        if let Some(shutdown) = self.event_bus_shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            if event_bus.join().is_err() {
                log::error!("An event handler panicked");
            }
        }
    }
}
