//! Shared state-transition history.

use crate::value::Value;
use parking_lot::Mutex;
use serde::Serialize;

/// One recorded state transition.
///
/// Snapshots are independent deep clones taken when the entry was
/// appended; later store writes never touch them.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub action: String,
    pub begin_state: Option<Value>,
    pub end_state: Option<Value>,
}

/// Append-only transition log shared by every service of one core.
///
/// Entries are appended, never reordered or removed, except by an explicit
/// [`HistoryLog::reset`].
#[derive(Default)]
pub struct HistoryLog {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: HistoryEntry) {
        self.entries.lock().push(entry);
    }

    /// Snapshot of all entries in append order.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    pub fn last(&self) -> Option<HistoryEntry> {
        self.entries.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Truncate the log to empty.
    pub fn reset(&self) {
        self.entries.lock().clear();
    }
}
