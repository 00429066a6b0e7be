//! Bounded ingestion buffer fed by the capture source

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};

use netlog_types::ArcConnectionEntry;

/// Bounded staging queue between the producer and the merge cycle
///
/// `append` and `drain_all` are mutually exclusive, so a drain never
/// observes a half-finished append and vice versa.
pub struct IngestionBuffer {
    /// Pending entries, oldest first
    entries: Mutex<VecDeque<ArcConnectionEntry>>,

    /// Maximum length, shared with the history stores
    capacity: AtomicUsize,
}

impl IngestionBuffer {
    /// Create a new buffer with the given capacity
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: AtomicUsize::new(capacity.get()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    pub(crate) fn set_capacity(&self, capacity: NonZeroUsize) {
        self.capacity.store(capacity.get(), Ordering::Release);
    }

    /// Push an entry at the tail, evicting from the head when over capacity
    pub fn append(&self, entry: ArcConnectionEntry) {
        let capacity = self.capacity();
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        evict_oldest(&mut *entries, capacity);
    }

    /// Atomically take every buffered entry, leaving the buffer empty
    pub fn drain_all(&self) -> Vec<ArcConnectionEntry> {
        let capacity = self.capacity();
        let mut entries = self.entries.lock();
        take_bounded(&mut *entries, capacity)
    }

    /// Lock the queue for a multi-collection operation
    pub(crate) fn lock(&self) -> MutexGuard<'_, VecDeque<ArcConnectionEntry>> {
        self.entries.lock()
    }

    /// Copy of the pending entries, oldest first
    pub fn snapshot(&self) -> Vec<ArcConnectionEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Drop entries from the front until at most `capacity` remain
///
/// Returns the number of evicted entries.
pub(crate) fn evict_oldest<T>(entries: &mut VecDeque<T>, capacity: usize) -> usize {
    let excess = entries.len().saturating_sub(capacity);
    entries.drain(..excess);
    excess
}

/// Trim to `capacity` then move everything out
pub(crate) fn take_bounded<T>(entries: &mut VecDeque<T>, capacity: usize) -> Vec<T> {
    evict_oldest(entries, capacity);
    entries.drain(..).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bound, entry};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_append_evicts_oldest() {
        let buffer = IngestionBuffer::new(bound(3));
        for port in 1..=5 {
            buffer.append(entry(1, "app", port, 80));
        }

        let ports: Vec<_> = buffer.snapshot().iter().map(|e| e.src_port).collect();
        assert_eq!(ports, vec![3, 4, 5]);
    }

    #[test]
    fn test_drain_all_empties_buffer() {
        let buffer = IngestionBuffer::new(bound(10));
        buffer.append(entry(1, "a", 1, 80));
        buffer.append(entry(1, "a", 2, 80));

        let drained = buffer.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].src_port, 1);
        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_drain_applies_lowered_capacity() {
        let buffer = IngestionBuffer::new(bound(10));
        for port in 1..=6 {
            buffer.append(entry(1, "a", port, 80));
        }
        buffer.set_capacity(bound(2));

        let ports: Vec<_> = buffer.drain_all().iter().map(|e| e.src_port).collect();
        assert_eq!(ports, vec![5, 6]);
    }

    #[test]
    fn test_evict_oldest_counts() {
        let mut queue: VecDeque<u32> = (0..10).collect();
        assert_eq!(evict_oldest(&mut queue, 4), 6);
        assert_eq!(queue, VecDeque::from(vec![6, 7, 8, 9]));
        assert_eq!(evict_oldest(&mut queue, 4), 0);
    }

    #[test]
    fn test_concurrent_append_and_drain_loses_nothing() {
        const PRODUCERS: u16 = 4;
        const PER_PRODUCER: u16 = 2_000;

        // Large enough that nothing is evicted
        let buffer = Arc::new(IngestionBuffer::new(bound(
            usize::from(PRODUCERS) * usize::from(PER_PRODUCER),
        )));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        buffer.append(entry(i32::from(p), "producer", p, i));
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        while producers.iter().any(|h| !h.is_finished()) {
            drained.extend(buffer.drain_all());
            thread::yield_now();
        }
        for handle in producers {
            handle.join().unwrap();
        }
        drained.extend(buffer.drain_all());

        let seen: HashSet<_> = drained.iter().map(|e| (e.src_port, e.dst_port)).collect();
        assert_eq!(drained.len(), usize::from(PRODUCERS) * usize::from(PER_PRODUCER));
        assert_eq!(seen.len(), drained.len());
    }
}
