//! Plain-text rendering of displayed rows

use std::io::{self, Write};

use netlog_core::{ConnectionEntry, ConnectionLog, NameResolver, ResolveOptions};

/// Host to show for an address: resolved name when enabled and known
fn host(resolver: &dyn NameResolver, options: ResolveOptions, addr: &str) -> String {
    if options.resolve_hosts {
        if let Some(name) = resolver.resolve_address(addr) {
            return name;
        }
    }
    addr.to_string()
}

/// Port to show: service name when enabled
fn port(resolver: &dyn NameResolver, options: ResolveOptions, port: u16) -> String {
    if options.resolve_ports {
        resolver.resolve_service(&port.to_string())
    } else {
        port.to_string()
    }
}

/// Format one entry as a single line
pub fn format_row(
    entry: &ConnectionEntry,
    resolver: &dyn NameResolver,
    options: ResolveOptions,
) -> String {
    format!(
        "({}) {}  {}  SRC: {}:{}  DST: {}:{}  LEN: {}  {}",
        entry.uid,
        entry.name,
        entry.interface().unwrap_or("-"),
        host(resolver, options, &entry.src_addr),
        port(resolver, options, entry.src_port),
        host(resolver, options, &entry.dst_addr),
        port(resolver, options, entry.dst_port),
        entry.len,
        entry.formatted_timestamp(),
    )
}

/// Write a header plus the last `tail` displayed rows
pub fn render<W: Write>(out: &mut W, log: &ConnectionLog, tail: usize) -> io::Result<()> {
    let shown = log.displayed_len();
    let start = shown.saturating_sub(tail);
    let options = log.resolve_options();

    writeln!(
        out,
        "--- {} shown / {} total ---",
        shown,
        log.unfiltered().len()
    )?;
    for entry in log.displayed_range(start, tail) {
        writeln!(out, "{}", format_row(&entry, log.resolver(), options))?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlog_core::{OwnerIdentity, RawEvent, TableResolver};

    fn sample() -> ConnectionEntry {
        let owner = OwnerIdentity::new(10042, "com.example.browser".to_string());
        let event = RawEvent {
            uid: 10042,
            in_iface: None,
            out_iface: Some("wlan0".to_string()),
            src: "192.168.1.20".to_string(),
            spt: 40112,
            dst: "93.184.216.34".to_string(),
            dpt: 443,
            len: 60,
            timestamp: 0,
        };
        ConnectionEntry::new(owner, event)
    }

    #[test]
    fn test_format_raw_row() {
        let resolver = TableResolver::default();
        let row = format_row(&sample(), &resolver, ResolveOptions::default());
        assert!(row.starts_with("(10042) com.example.browser  wlan0  "));
        assert!(row.contains("SRC: 192.168.1.20:40112"));
        assert!(row.contains("DST: 93.184.216.34:443"));
        assert!(row.contains("LEN: 60"));
    }

    #[test]
    fn test_format_resolved_row() {
        let resolver = TableResolver::default();
        resolver.set_host("93.184.216.34", "example.com");
        resolver.set_service("443", "https");

        let options = ResolveOptions {
            resolve_hosts: true,
            resolve_ports: true,
        };
        let row = format_row(&sample(), &resolver, options);
        assert!(row.contains("DST: example.com:https"));
        // Unknown host falls back to the raw address
        assert!(row.contains("SRC: 192.168.1.20:40112"));
    }
}
