//! A simple, volatile, in-memory implementation of [`PrimaryContext`] and [`SecondaryContext`].
//!
//! Both contexts are cheap handles around shared state, so a test can keep a clone to inspect the
//! state (and inject failures) after moving the original into a storage.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use buffered_storage::{
    errors::{CommitError, PropagationError},
    executor::{ContextId, ExecutionContext},
    pluggables::{PrimaryContext, SecondaryContext},
};

/// Shared, ordered record of what happened around commits. Hooks registered by tests append to the
/// same journal as the contexts do.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

pub(crate) fn new_journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn record(journal: &Journal, entry: impl Into<String>) {
    journal.lock().unwrap().push(entry.into());
}

/// The change set produced by a [`MemStore`] commit.
#[derive(Clone, Debug, Default)]
pub(crate) struct MemChanges {
    pub(crate) insertions: HashMap<String, String>,
    pub(crate) deletions: HashSet<String>,
}

/// An in-memory implementation of [`PrimaryContext`].
#[derive(Clone)]
pub(crate) struct MemStore(Arc<Mutex<MemStoreState>>);

pub(crate) struct MemStoreState {
    committed: HashMap<String, String>,
    insertions: HashMap<String, String>,
    deletions: HashSet<String>,
    commit_attempts: usize,
    fail_commits: bool,
    journal: Journal,
}

impl MemStore {
    /// Create a new, empty `MemStore`.
    pub(crate) fn new() -> MemStore {
        MemStore::with_journal(new_journal())
    }

    pub(crate) fn with_journal(journal: Journal) -> MemStore {
        MemStore(Arc::new(Mutex::new(MemStoreState {
            committed: HashMap::new(),
            insertions: HashMap::new(),
            deletions: HashSet::new(),
            commit_attempts: 0,
            fail_commits: false,
            journal,
        })))
    }

    pub(crate) fn set(&mut self, key: &str, value: &str) {
        let mut state = self.state();
        let _ = state.deletions.remove(key);
        state.insertions.insert(key.to_string(), value.to_string());
    }

    pub(crate) fn delete(&mut self, key: &str) {
        let mut state = self.state();
        let _ = state.insertions.remove(key);
        state.deletions.insert(key.to_string());
    }

    /// Read through the uncommitted changes.
    pub(crate) fn get(&self, key: &str) -> Option<String> {
        let state = self.state();
        if state.deletions.contains(key) {
            return None;
        }
        state
            .insertions
            .get(key)
            .or_else(|| state.committed.get(key))
            .cloned()
    }

    pub(crate) fn committed(&self, key: &str) -> Option<String> {
        self.state().committed.get(key).cloned()
    }

    pub(crate) fn commit_attempts(&self) -> usize {
        self.state().commit_attempts
    }

    pub(crate) fn uncommitted(&self) -> usize {
        let state = self.state();
        state.insertions.len() + state.deletions.len()
    }

    /// Make every following commit fail with a simulated I/O error, until reset.
    pub(crate) fn fail_commits(&self, fail: bool) {
        self.state().fail_commits = fail;
    }

    fn state(&self) -> MutexGuard<'_, MemStoreState> {
        self.0.lock().unwrap()
    }
}

impl PrimaryContext for MemStore {
    type ChangeSet = MemChanges;

    fn dirty_count(&self) -> usize {
        self.uncommitted()
    }

    fn commit(&mut self) -> Result<MemChanges, CommitError> {
        let mut state = self.state();
        state.commit_attempts += 1;
        record(&state.journal, "commit");

        if state.fail_commits {
            return Err(CommitError::Io(String::from("simulated i/o error")));
        }

        let changes = MemChanges {
            insertions: std::mem::take(&mut state.insertions),
            deletions: std::mem::take(&mut state.deletions),
        };
        for (key, value) in &changes.insertions {
            state.committed.insert(key.clone(), value.clone());
        }
        for key in &changes.deletions {
            state.committed.remove(key);
        }
        Ok(changes)
    }

    fn will_commit(&mut self) {
        record(&self.state().journal, "will_commit");
    }

    fn did_commit(&mut self) {
        record(&self.state().journal, "did_commit");
    }
}

/// An in-memory implementation of [`SecondaryContext`] for [`MemChanges`].
#[derive(Clone)]
pub(crate) struct MemView(Arc<Mutex<MemViewState>>);

pub(crate) struct MemViewState {
    entries: HashMap<String, String>,
    merges: usize,
    did_merge_calls: usize,
    fail_merges: bool,
    merge_contexts: Vec<Option<ContextId>>,
}

impl MemView {
    pub(crate) fn new() -> MemView {
        MemView(Arc::new(Mutex::new(MemViewState {
            entries: HashMap::new(),
            merges: 0,
            did_merge_calls: 0,
            fail_merges: false,
            merge_contexts: Vec::new(),
        })))
    }

    /// A view that already holds `entries`, as if loaded from durable storage.
    pub(crate) fn with_entries(entries: &[(&str, &str)]) -> MemView {
        let view = MemView::new();
        view.state().entries.extend(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        );
        view
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        self.state().entries.get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub(crate) fn merges(&self) -> usize {
        self.state().merges
    }

    pub(crate) fn did_merge_calls(&self) -> usize {
        self.state().did_merge_calls
    }

    /// The execution context each merge ran on.
    pub(crate) fn merge_contexts(&self) -> Vec<Option<ContextId>> {
        self.state().merge_contexts.clone()
    }

    pub(crate) fn fail_merges(&self, fail: bool) {
        self.state().fail_merges = fail;
    }

    fn state(&self) -> MutexGuard<'_, MemViewState> {
        self.0.lock().unwrap()
    }
}

impl SecondaryContext<MemChanges> for MemView {
    fn merge_changes(&mut self, changes: &MemChanges) -> Result<(), PropagationError> {
        let mut state = self.state();
        state.merge_contexts.push(ExecutionContext::current());

        if state.fail_merges {
            return Err(PropagationError::new("simulated merge conflict"));
        }

        for (key, value) in &changes.insertions {
            state.entries.insert(key.clone(), value.clone());
        }
        for key in &changes.deletions {
            state.entries.remove(key);
        }
        state.merges += 1;
        Ok(())
    }

    fn did_merge_changes(&mut self) {
        self.state().did_merge_calls += 1;
    }
}
