/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The event bus thread, which hands [events](crate::events) published by the storage and foreground
//! contexts to user-registered handlers and, if enabled, to the default [loggers](crate::logging).
//!
//! Handlers run on the event bus thread, never on the storage context, so a slow handler cannot hold
//! up work units or commits.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

// How long the event bus thread waits for an event before checking for the shutdown signal again.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) struct EventHandlers {
    pub(crate) commit_handlers: Vec<HandlerPtr<CommitEvent>>,
    pub(crate) commit_failed_handlers: Vec<HandlerPtr<CommitFailedEvent>>,
    pub(crate) threshold_reached_handlers: Vec<HandlerPtr<ThresholdReachedEvent>>,
    pub(crate) propagate_handlers: Vec<HandlerPtr<PropagateEvent>>,
    pub(crate) propagation_failed_handlers: Vec<HandlerPtr<PropagationFailedEvent>>,
}

impl EventHandlers {
    pub(crate) fn new(
        log_events: bool,
        commit_handler: Option<HandlerPtr<CommitEvent>>,
        commit_failed_handler: Option<HandlerPtr<CommitFailedEvent>>,
        threshold_reached_handler: Option<HandlerPtr<ThresholdReachedEvent>>,
        propagate_handler: Option<HandlerPtr<PropagateEvent>>,
        propagation_failed_handler: Option<HandlerPtr<PropagationFailedEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            commit_handlers: handlers(log_events, commit_handler),
            commit_failed_handlers: handlers(log_events, commit_failed_handler),
            threshold_reached_handlers: handlers(log_events, threshold_reached_handler),
            propagate_handlers: handlers(log_events, propagate_handler),
            propagation_failed_handlers: handlers(log_events, propagation_failed_handler),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.commit_handlers.is_empty()
            && self.commit_failed_handlers.is_empty()
            && self.threshold_reached_handlers.is_empty()
            && self.propagate_handlers.is_empty()
            && self.propagation_failed_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::Commit(commit_event) => self
                .commit_handlers
                .iter()
                .for_each(|handler| handler(&commit_event)),

            Event::CommitFailed(commit_failed_event) => self
                .commit_failed_handlers
                .iter()
                .for_each(|handler| handler(&commit_failed_event)),

            Event::ThresholdReached(threshold_reached_event) => self
                .threshold_reached_handlers
                .iter()
                .for_each(|handler| handler(&threshold_reached_event)),

            Event::Propagate(propagate_event) => self
                .propagate_handlers
                .iter()
                .for_each(|handler| handler(&propagate_event)),

            Event::PropagationFailed(propagation_failed_event) => self
                .propagation_failed_handlers
                .iter()
                .for_each(|handler| handler(&propagation_failed_event)),
        }
    }
}

// The default logger (if enabled) comes first, then the user's handler.
fn handlers<T: Logger>(log_events: bool, handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    handlers.extend(handler);
    handlers
}

pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                // Deliver whatever was published before shutdown was requested.
                while let Ok(event) = event_subscriber.try_recv() {
                    event_handlers.fire_handlers(event)
                }
                return;
            }
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(SHUTDOWN_POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
