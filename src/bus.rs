/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! One-shot, multi-target callback fan-out.
//!
//! A [`BroadcastBus`] holds a list of [registrations](Registration), each pairing a callback with the
//! [execution context](ExecutionContext) it must run on. [Firing](BroadcastBus::fire) the bus takes the
//! whole list out under the lock, leaving an empty one behind, and only then submits each callback to
//! its target context. Every registration made before the swap is therefore invoked exactly once, and
//! every registration made after it waits for the next fire.
//!
//! Callbacks are submitted in registration order. Callbacks that share a target context run in that
//! order; callbacks on different target contexts may run in any order relative to each other.

use std::sync::Mutex;

use crate::executor::ExecutionContext;

pub(crate) type Callback = Box<dyn FnOnce() + Send>;

/// A callback and the context it must run on.
pub struct Registration {
    callback: Callback,
    target: ExecutionContext,
}

#[derive(Default)]
pub struct BroadcastBus {
    registrations: Mutex<Vec<Registration>>,
}

impl BroadcastBus {
    pub fn new() -> BroadcastBus {
        BroadcastBus {
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Register `callback` to be run on `target` the next time the bus fires.
    pub fn register(&self, callback: impl FnOnce() + Send + 'static, target: &ExecutionContext) {
        self.registrations.lock().unwrap().push(Registration {
            callback: Box::new(callback),
            target: target.clone(),
        });
    }

    /// Drop every pending registration without invoking it.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.registrations.lock().unwrap());
        log::trace!("Cleared {} pending notifications", dropped.len());
    }

    /// Submit every pending registration to its target context and start over with an empty list.
    /// Returns the number of callbacks submitted.
    pub fn fire(&self) -> usize {
        let registrations = std::mem::take(&mut *self.registrations.lock().unwrap());
        let fired = registrations.len();

        for Registration { callback, target } in registrations {
            if let Err(err) = target.run_async(callback) {
                log::warn!("Dropped a post-commit notification: {}", err);
            }
        }

        fired
    }

    pub fn len(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
