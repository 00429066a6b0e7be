//! Connection log facade: ingestion, merge cycles and the displayed view

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use netlog_types::{ArcConnectionEntry, ConnectionEntry, RawEvent};

use crate::buffer::{IngestionBuffer, evict_oldest, take_bounded};
use crate::directory::IdentityDirectory;
use crate::filter::{FilterEngine, FilterRules};
use crate::history::HistoryStore;
use crate::resolver::{NameResolver, ResolveOptions};

/// Pending notifications kept per subscriber before it starts lagging
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// "Data changed" notification; subscribers re-read `displayed()`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataChanged;

/// Buffered, bounded, filterable connection history
///
/// Cloning is cheap and every clone shares the same state, so one clone can
/// feed events from a capture thread while another drives the merge task.
///
/// Collection locks are always taken in the order buffer, unfiltered,
/// displayed. Any operation that writes `displayed` holds the unfiltered
/// lock until `displayed` is final, which also serializes filter passes.
#[derive(Clone)]
pub struct ConnectionLog {
    buffer: Arc<IngestionBuffer>,
    history: Arc<HistoryStore>,

    /// Active rule set, read once per pass under the unfiltered lock
    rules: Arc<RwLock<FilterRules>>,

    resolve: Arc<RwLock<ResolveOptions>>,

    directory: Arc<dyn IdentityDirectory>,
    resolver: Arc<dyn NameResolver>,

    changed: broadcast::Sender<DataChanged>,
}

impl ConnectionLog {
    pub fn new(
        max_entries: NonZeroUsize,
        directory: Arc<dyn IdentityDirectory>,
        resolver: Arc<dyn NameResolver>,
    ) -> Self {
        let (changed, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            buffer: Arc::new(IngestionBuffer::new(max_entries)),
            history: Arc::new(HistoryStore::new()),
            rules: Arc::new(RwLock::new(FilterRules::default())),
            resolve: Arc::new(RwLock::new(ResolveOptions::default())),
            directory,
            resolver,
            changed,
        }
    }

    pub fn with_filter(self, rules: FilterRules) -> Self {
        *self.rules.write() = rules;
        self
    }

    pub fn with_resolve_options(self, options: ResolveOptions) -> Self {
        *self.resolve.write() = options;
        self
    }

    /// Subscribe to "data changed" notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.changed.subscribe()
    }

    // ------------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------------

    /// Attribute a raw capture event to its owner and stage it
    ///
    /// Events whose uid is unknown to the directory are dropped. Returns
    /// whether the event was buffered.
    pub fn on_new_log_entry(&self, event: RawEvent) -> bool {
        let Some(owner) = self.directory.lookup(&event.uid.to_string()) else {
            debug!(uid = event.uid, "no identity for uid, dropping event");
            return false;
        };

        let entry = ConnectionEntry::new(owner, event);
        trace!(
            uid = entry.uid,
            iface_in = entry.in_iface.as_deref(),
            iface_out = entry.out_iface.as_deref(),
            "new entry {}:{} --> {}:{} [{}]",
            entry.src_addr,
            entry.src_port,
            entry.dst_addr,
            entry.dst_port,
            entry.len
        );
        self.append(Arc::new(entry));
        true
    }

    /// Stage an already-attributed entry
    pub fn append(&self, entry: ArcConnectionEntry) {
        self.buffer.append(entry);
    }

    // ------------------------------------------------------------------------
    // Merge / filter side
    // ------------------------------------------------------------------------

    /// Move everything buffered into the history and notify
    ///
    /// Returns the number of entries drained from the buffer.
    pub fn merge(&self) -> usize {
        let max = self.buffer.capacity();

        let added = {
            let mut buffer = self.buffer.lock();
            let mut unfiltered = self.history.lock_unfiltered();
            let mut displayed = self.history.lock_displayed();
            let (rules, options) = self.pass_settings();

            let drained = take_bounded(&mut *buffer, max);
            // The producer only needs the buffer
            drop(buffer);

            unfiltered.extend(drained.iter().cloned());
            displayed.extend(drained.iter().cloned());
            evict_oldest(&mut *unfiltered, max);
            evict_oldest(&mut *displayed, max);

            if rules.is_active() {
                let engine = FilterEngine::new(self.resolver.as_ref(), options);
                *displayed = VecDeque::from(engine.evaluate(unfiltered.make_contiguous(), &rules));
            }

            drained.len()
        };

        debug!(added, "merged buffered entries");
        self.notify();
        added
    }

    /// Replace the active rule set and re-run the filter
    pub fn set_filter(&self, rules: FilterRules) {
        *self.rules.write() = rules;
        self.refilter();
    }

    /// Change resolution toggles and re-run the filter
    pub fn set_resolve_options(&self, options: ResolveOptions) {
        *self.resolve.write() = options;
        self.refilter();
    }

    /// Recompute `displayed` from `unfiltered` with the current rules
    pub fn refilter(&self) {
        {
            let mut unfiltered = self.history.lock_unfiltered();
            let mut displayed = self.history.lock_displayed();
            let (rules, options) = self.pass_settings();

            let engine = FilterEngine::new(self.resolver.as_ref(), options);
            *displayed = VecDeque::from(engine.evaluate(unfiltered.make_contiguous(), &rules));
            debug!(displayed = displayed.len(), "filter re-run");
        }

        self.notify();
    }

    /// Change the shared bound and prune every collection down to it
    pub fn set_max_entries(&self, max_entries: NonZeroUsize) {
        self.buffer.set_capacity(max_entries);
        self.prune();
    }

    /// Enforce the current bound on all three collections, oldest first
    pub fn prune(&self) {
        let max = self.buffer.capacity();

        let evicted = {
            let mut buffer = self.buffer.lock();
            let mut unfiltered = self.history.lock_unfiltered();
            let mut displayed = self.history.lock_displayed();

            let (rules, options) = self.pass_settings();

            let evicted = evict_oldest(&mut *buffer, max) + evict_oldest(&mut *unfiltered, max);
            if rules.is_active() {
                // Filtered entries may predate the new oldest unfiltered entry
                let engine = FilterEngine::new(self.resolver.as_ref(), options);
                *displayed = VecDeque::from(engine.evaluate(unfiltered.make_contiguous(), &rules));
            } else {
                evict_oldest(&mut *displayed, max);
            }
            evicted
        };

        debug!(max, evicted, "pruned log entries");
        self.notify();
    }

    /// Empty the buffer and both history stores atomically
    pub fn clear(&self) {
        {
            let mut buffer = self.buffer.lock();
            let mut unfiltered = self.history.lock_unfiltered();
            let mut displayed = self.history.lock_displayed();

            buffer.clear();
            unfiltered.clear();
            displayed.clear();
        }

        debug!("cleared log entries");
        self.notify();
    }

    /// Rules and resolve toggles for a pass
    ///
    /// Must be called with the unfiltered lock held, so a concurrent
    /// `set_filter` either lands before this pass or re-runs after it.
    fn pass_settings(&self) -> (FilterRules, ResolveOptions) {
        (self.rules.read().clone(), *self.resolve.read())
    }

    fn notify(&self) {
        // No subscribers is fine
        let _ = self.changed.send(DataChanged);
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    pub fn filter(&self) -> FilterRules {
        self.rules.read().clone()
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        *self.resolve.read()
    }

    pub fn resolver(&self) -> &dyn NameResolver {
        self.resolver.as_ref()
    }

    pub fn max_entries(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn buffered(&self) -> Vec<ArcConnectionEntry> {
        self.buffer.snapshot()
    }

    pub fn buffer_is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn unfiltered(&self) -> Vec<ArcConnectionEntry> {
        self.history.unfiltered()
    }

    pub fn displayed(&self) -> Vec<ArcConnectionEntry> {
        self.history.displayed()
    }

    pub fn displayed_entry(&self, index: usize) -> Option<ArcConnectionEntry> {
        self.history.displayed_entry(index)
    }

    pub fn displayed_range(&self, start: usize, count: usize) -> Vec<ArcConnectionEntry> {
        self.history.displayed_range(start, count)
    }

    pub fn displayed_len(&self) -> usize {
        self.history.displayed_len()
    }
}
