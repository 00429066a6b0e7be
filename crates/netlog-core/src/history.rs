//! Unfiltered and displayed history stores

use std::collections::VecDeque;

use parking_lot::{Mutex, MutexGuard};

use netlog_types::ArcConnectionEntry;

/// Merged history: everything recent, plus the projection currently shown
///
/// Lock order for any operation touching both is `unfiltered` then
/// `displayed`, after the ingestion buffer if that is involved too.
#[derive(Default)]
pub struct HistoryStore {
    unfiltered: Mutex<VecDeque<ArcConnectionEntry>>,
    displayed: Mutex<VecDeque<ArcConnectionEntry>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock_unfiltered(&self) -> MutexGuard<'_, VecDeque<ArcConnectionEntry>> {
        self.unfiltered.lock()
    }

    pub(crate) fn lock_displayed(&self) -> MutexGuard<'_, VecDeque<ArcConnectionEntry>> {
        self.displayed.lock()
    }

    /// All merged entries, oldest first
    pub fn unfiltered(&self) -> Vec<ArcConnectionEntry> {
        self.unfiltered.lock().iter().cloned().collect()
    }

    /// Entries currently shown, oldest first
    pub fn displayed(&self) -> Vec<ArcConnectionEntry> {
        self.displayed.lock().iter().cloned().collect()
    }

    /// Single displayed entry (for detail views)
    pub fn displayed_entry(&self, index: usize) -> Option<ArcConnectionEntry> {
        self.displayed.lock().get(index).cloned()
    }

    /// Entries in a displayed range (for virtual scrolling)
    pub fn displayed_range(&self, start: usize, count: usize) -> Vec<ArcConnectionEntry> {
        self.displayed
            .lock()
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect()
    }

    pub fn unfiltered_len(&self) -> usize {
        self.unfiltered.lock().len()
    }

    pub fn displayed_len(&self) -> usize {
        self.displayed.lock().len()
    }
}
