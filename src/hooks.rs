/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Closures run on the storage context around every commit.
//!
//! Hooks let code prepare for, or react to, a commit without forcing one. They stay registered for
//! the lifetime of the storage and run, in registration order, around every commit attempt:
//! pre-commit hooks before the primary context is asked to commit, post-commit hooks only after it
//! committed successfully.

use std::sync::{Arc, Mutex};

pub(crate) type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct CommitHooks {
    pre_commit: Mutex<Vec<Hook>>,
    post_commit: Mutex<Vec<Hook>>,
}

impl CommitHooks {
    pub(crate) fn new() -> CommitHooks {
        CommitHooks::default()
    }

    pub(crate) fn add_pre_commit(&self, hook: Hook) {
        self.pre_commit.lock().unwrap().push(hook);
    }

    pub(crate) fn add_post_commit(&self, hook: Hook) {
        self.post_commit.lock().unwrap().push(hook);
    }

    pub(crate) fn run_pre_commit(&self) {
        Self::run(&self.pre_commit)
    }

    pub(crate) fn run_post_commit(&self) {
        Self::run(&self.post_commit)
    }

    // The list is copied out first so that a hook may register further hooks.
    fn run(hooks: &Mutex<Vec<Hook>>) {
        let hooks: Vec<Hook> = hooks.lock().unwrap().clone();
        for hook in hooks {
            hook()
        }
    }
}
