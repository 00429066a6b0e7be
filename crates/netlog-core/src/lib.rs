//! Connection log processing for netlog
//!
//! This crate provides the ingestion buffer, merged history, periodic merge
//! task and include/exclude filtering for network connection events.

mod buffer;
mod cache;
mod config;
mod connection_log;
mod directory;
mod filter;
mod history;
mod resolver;
mod scheduler;

#[cfg(test)]
mod test_support;

pub use buffer::IngestionBuffer;
pub use cache::PassCache;
pub use config::{
    AppSettings, ConfigError, DEFAULT_MAX_LOG_ENTRIES, DEFAULT_MERGE_INTERVAL_MS, FilterSettings,
    Settings,
};
pub use connection_log::{ConnectionLog, DataChanged};
pub use directory::{AppDirectory, IdentityDirectory};
pub use filter::{Criteria, FieldToggles, FilterEngine, FilterRules};
pub use history::HistoryStore;
pub use resolver::{NameResolver, ResolveOptions, TableResolver};
pub use scheduler::MergeScheduler;

// Re-export types used in our public API
pub use netlog_types::{ArcConnectionEntry, ConnectionEntry, IconHandle, OwnerIdentity, RawEvent};
