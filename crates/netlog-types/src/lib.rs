//! Shared types for netlog
//!
//! This crate contains data structures used across multiple netlog crates.

use chrono::{DateTime, Local, TimeZone};
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

// ============================================================================
// Owner Identity Types
// ============================================================================

/// Opaque handle to an owner's icon, resolved by the presentation layer
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IconHandle(pub String);

/// Identity of the process/application owning a connection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub uid: i32,
    pub name: String,
    pub icon: Option<IconHandle>,
}

impl OwnerIdentity {
    pub fn new(uid: i32, name: String) -> Self {
        Self {
            uid,
            name,
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: IconHandle) -> Self {
        self.icon = Some(icon);
        self
    }
}

// ============================================================================
// Connection Event Types
// ============================================================================

/// A raw connection event as reported by the capture source
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RawEvent {
    pub uid: i32,

    /// Inbound interface name
    #[serde(default, rename = "in")]
    pub in_iface: Option<String>,

    /// Outbound interface name
    #[serde(default, rename = "out")]
    pub out_iface: Option<String>,

    pub src: String,
    pub spt: u16,
    pub dst: String,
    pub dpt: u16,
    pub len: u32,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl RawEvent {
    /// Parse a single JSON object line
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// A single observed connection, attributed to its owner
///
/// Immutable once built. The lower-cased name and the stringified uid are
/// derived lazily and written at most once.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub uid: i32,
    pub name: String,
    pub icon: Option<IconHandle>,
    pub in_iface: Option<String>,
    pub out_iface: Option<String>,
    pub src_addr: String,
    pub src_port: u16,
    pub dst_addr: String,
    pub dst_port: u16,
    pub len: u32,
    pub timestamp: i64,

    uid_string: OnceLock<String>,
    name_lowercase: OnceLock<String>,
}

/// Shared entry handle; buffer, history and snapshots all point at one allocation
pub type ArcConnectionEntry = Arc<ConnectionEntry>;

impl ConnectionEntry {
    /// Build an entry from a raw event and its resolved owner
    pub fn new(owner: OwnerIdentity, event: RawEvent) -> Self {
        Self {
            uid: owner.uid,
            name: owner.name,
            icon: owner.icon,
            in_iface: event.in_iface,
            out_iface: event.out_iface,
            src_addr: event.src,
            src_port: event.spt,
            dst_addr: event.dst,
            dst_port: event.dpt,
            len: event.len,
            timestamp: event.timestamp,
            uid_string: OnceLock::new(),
            name_lowercase: OnceLock::new(),
        }
    }

    /// Owner uid rendered as a string (computed once)
    pub fn uid_str(&self) -> &str {
        self.uid_string.get_or_init(|| self.uid.to_string())
    }

    /// Owner name lower-cased for case-insensitive matching (computed once)
    pub fn name_lowercase(&self) -> &str {
        self.name_lowercase.get_or_init(|| self.name.to_lowercase())
    }

    /// Interface the connection was seen on: inbound if present, else outbound
    pub fn interface(&self) -> Option<&str> {
        match self.in_iface.as_deref() {
            Some(iface) if !iface.is_empty() => Some(iface),
            _ => self.out_iface.as_deref(),
        }
    }

    /// Local wall-clock time of the event
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.timestamp).single()
    }

    /// Timestamp formatted for display, empty if out of range
    pub fn formatted_timestamp(&self) -> String {
        self.local_time()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> RawEvent {
        RawEvent {
            uid: 10042,
            in_iface: None,
            out_iface: Some("wlan0".to_string()),
            src: "192.168.1.20".to_string(),
            spt: 40112,
            dst: "93.184.216.34".to_string(),
            dpt: 443,
            len: 60,
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_derived_fields_are_idempotent() {
        let owner = OwnerIdentity::new(10042, "Com.Example.Browser".to_string());
        let entry = ConnectionEntry::new(owner, event());

        let first = entry.name_lowercase().to_string();
        let second = entry.name_lowercase().to_string();
        assert_eq!(first, "com.example.browser");
        assert_eq!(first, second);
        assert_eq!(entry.uid_str(), "10042");
        assert_eq!(entry.uid_str(), "10042");

        // Source fields are untouched
        assert_eq!(entry.name, "Com.Example.Browser");
        assert_eq!(entry.uid, 10042);
    }

    #[test]
    fn test_parse_json_event() {
        let line = r#"{"uid":1000,"in":"eth0","src":"10.0.0.1","spt":53,"dst":"10.0.0.2","dpt":5353,"len":120,"timestamp":5}"#;
        let event = RawEvent::from_json_line(line).unwrap();
        assert_eq!(event.uid, 1000);
        assert_eq!(event.in_iface.as_deref(), Some("eth0"));
        assert!(event.out_iface.is_none());
        assert_eq!(event.dpt, 5353);
    }

    #[test]
    fn test_interface_prefers_inbound() {
        let owner = OwnerIdentity::new(1, "a".to_string());
        let mut raw = event();
        assert_eq!(
            ConnectionEntry::new(owner.clone(), raw.clone()).interface(),
            Some("wlan0")
        );

        raw.in_iface = Some("eth0".to_string());
        assert_eq!(ConnectionEntry::new(owner.clone(), raw.clone()).interface(), Some("eth0"));

        raw.in_iface = Some(String::new());
        assert_eq!(ConnectionEntry::new(owner, raw).interface(), Some("wlan0"));
    }
}
