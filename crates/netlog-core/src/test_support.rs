use std::num::NonZeroUsize;
use std::sync::Arc;

use netlog_types::{ArcConnectionEntry, ConnectionEntry, OwnerIdentity, RawEvent};

pub(crate) fn bound(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

pub(crate) fn raw(uid: i32, src: &str, spt: u16, dst: &str, dpt: u16) -> RawEvent {
    RawEvent {
        uid,
        in_iface: None,
        out_iface: Some("wlan0".to_string()),
        src: src.to_string(),
        spt,
        dst: dst.to_string(),
        dpt,
        len: 64,
        timestamp: 1_700_000_000_000,
    }
}

pub(crate) fn entry(uid: i32, name: &str, spt: u16, dpt: u16) -> ArcConnectionEntry {
    entry_with_addrs(uid, name, "192.168.1.20", spt, "10.0.0.1", dpt)
}

pub(crate) fn entry_with_addrs(
    uid: i32,
    name: &str,
    src: &str,
    spt: u16,
    dst: &str,
    dpt: u16,
) -> ArcConnectionEntry {
    let owner = OwnerIdentity::new(uid, name.to_string());
    Arc::new(ConnectionEntry::new(owner, raw(uid, src, spt, dst, dpt)))
}

pub(crate) fn ports(entries: &[ArcConnectionEntry]) -> Vec<u16> {
    entries.iter().map(|e| e.src_port).collect()
}
