use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use crate::store::{SetOptions, UniformStore};

const DEFAULT_HISTORY_LIMIT: usize = 256;

/// One committed edit of a single uniform.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoEntry {
    pub name: String,
    pub previous: Vec<f32>,
    pub next: Vec<f32>,
}

/// Receives committed edits once their debounce window closes.
pub trait UndoSink: Send + Sync {
    fn record(&self, entry: UndoEntry);
}

/// Per-name commit window.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UndoState {
    Idle,
    PendingCommit { baseline: Vec<f32>, deadline: Instant },
}

/// Tracks open undo windows; edits within a window collapse into one entry
/// whose `previous` is the value before the first edit.
#[derive(Debug, Default)]
pub(crate) struct UndoWindows {
    states: HashMap<String, UndoState>,
}

impl UndoWindows {
    pub(crate) fn observe(&mut self, name: &str, previous: &[f32], deadline: Instant) {
        let state = self
            .states
            .entry(name.to_string())
            .or_insert(UndoState::Idle);
        *state = match std::mem::replace(state, UndoState::Idle) {
            UndoState::Idle => UndoState::PendingCommit {
                baseline: previous.to_vec(),
                deadline,
            },
            UndoState::PendingCommit { baseline, .. } => {
                UndoState::PendingCommit { baseline, deadline }
            }
        };
    }

    /// Closes every window whose deadline is at or before `now` (all of them
    /// when `now` is `None`), returning `(name, baseline)` pairs.
    pub(crate) fn take_due(&mut self, now: Option<Instant>) -> Vec<(String, Vec<f32>)> {
        let due: Vec<String> = self
            .states
            .iter()
            .filter(|(_, state)| match state {
                UndoState::PendingCommit { deadline, .. } => {
                    now.map_or(true, |now| *deadline <= now)
                }
                UndoState::Idle => false,
            })
            .map(|(name, _)| name.clone())
            .collect();
        due.into_iter()
            .filter_map(|name| match self.states.remove(&name) {
                Some(UndoState::PendingCommit { baseline, .. }) => Some((name, baseline)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.states
            .values()
            .filter_map(|state| match state {
                UndoState::PendingCommit { deadline, .. } => Some(*deadline),
                UndoState::Idle => None,
            })
            .min()
    }

    pub(crate) fn clear(&mut self) {
        self.states.clear();
    }
}

#[derive(Debug, Default)]
struct History {
    undo: Vec<UndoEntry>,
    redo: Vec<UndoEntry>,
}

/// Bounded undo/redo stacks fed by the store's debounced commits.
#[derive(Debug)]
pub struct UndoHistory {
    inner: Mutex<History>,
    limit: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl UndoHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Mutex::new(History::default()),
            limit: limit.max(1),
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.inner.lock().undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.inner.lock().redo.is_empty()
    }

    /// Reverts the most recent committed edit. Open windows are committed
    /// first so a quick edit-then-undo reverts that edit.
    pub fn undo(&self, store: &UniformStore) -> Option<UndoEntry> {
        store.commit_pending_undo();
        let entry = self.inner.lock().undo.pop()?;
        store.set_values(&entry.name, &entry.previous, SetOptions::REPLAY);
        tracing::debug!(name = %entry.name, "undo");
        self.inner.lock().redo.push(entry.clone());
        Some(entry)
    }

    pub fn redo(&self, store: &UniformStore) -> Option<UndoEntry> {
        store.commit_pending_undo();
        let entry = self.inner.lock().redo.pop()?;
        store.set_values(&entry.name, &entry.next, SetOptions::REPLAY);
        tracing::debug!(name = %entry.name, "redo");
        self.inner.lock().undo.push(entry.clone());
        Some(entry)
    }
}

impl UndoSink for UndoHistory {
    fn record(&self, entry: UndoEntry) {
        let mut history = self.inner.lock();
        history.redo.clear();
        history.undo.push(entry);
        if history.undo.len() > self.limit {
            let overflow = history.undo.len() - self.limit;
            history.undo.drain(..overflow);
        }
    }
}
