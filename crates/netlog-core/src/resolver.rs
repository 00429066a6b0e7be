use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Deserialize;

/// Maps raw addresses and ports to human-readable names
///
/// Results are advisory and may change over the run (e.g. as a DNS cache
/// fills), so callers must not store them as authoritative.
pub trait NameResolver: Send + Sync {
    /// Host name for an address, `None` when nothing is known
    fn resolve_address(&self, addr: &str) -> Option<String>;

    /// Service name for a port; falls back to the port itself on a miss
    fn resolve_service(&self, port: &str) -> String;
}

/// Global resolution switches shared by filtering and display
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ResolveOptions {
    #[serde(default)]
    pub resolve_hosts: bool,
    #[serde(default)]
    pub resolve_ports: bool,
}

/// Resolver backed by mutable lookup tables
#[derive(Default)]
pub struct TableResolver {
    hosts: RwLock<HashMap<String, String>>,
    services: RwLock<HashMap<String, String>>,
}

impl TableResolver {
    pub fn new(hosts: HashMap<String, String>, services: HashMap<String, String>) -> Self {
        Self {
            hosts: RwLock::new(hosts),
            services: RwLock::new(services),
        }
    }

    pub fn set_host(&self, addr: impl Into<String>, name: impl Into<String>) {
        self.hosts.write().insert(addr.into(), name.into());
    }

    pub fn set_service(&self, port: impl Into<String>, name: impl Into<String>) {
        self.services.write().insert(port.into(), name.into());
    }

    pub fn forget_host(&self, addr: &str) {
        self.hosts.write().remove(addr);
    }
}

impl NameResolver for TableResolver {
    fn resolve_address(&self, addr: &str) -> Option<String> {
        self.hosts.read().get(addr).cloned()
    }

    fn resolve_service(&self, port: &str) -> String {
        self.services
            .read()
            .get(port)
            .cloned()
            .unwrap_or_else(|| port.to_string())
    }
}
