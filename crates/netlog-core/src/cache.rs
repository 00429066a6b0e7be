use std::collections::HashMap;
use std::sync::Arc;

use crate::resolver::{NameResolver, ResolveOptions};

/// Resolution memo scoped to a single filter pass
///
/// Each raw address or port is resolved and lower-cased at most once per
/// pass. Dropped at the end of the pass so later passes see fresh results.
pub struct PassCache<'a> {
    resolver: &'a dyn NameResolver,
    options: ResolveOptions,
    hosts: HashMap<String, Arc<str>>,
    services: HashMap<u16, Arc<str>>,
    empty: Arc<str>,
}

impl<'a> PassCache<'a> {
    pub fn new(resolver: &'a dyn NameResolver, options: ResolveOptions) -> Self {
        Self {
            resolver,
            options,
            hosts: HashMap::new(),
            services: HashMap::new(),
            empty: Arc::from(""),
        }
    }

    /// Lower-cased host name for `addr`, empty when disabled or unknown
    pub fn host(&mut self, addr: &str) -> Arc<str> {
        if !self.options.resolve_hosts {
            return Arc::clone(&self.empty);
        }
        if let Some(name) = self.hosts.get(addr) {
            return Arc::clone(name);
        }

        let name: Arc<str> = self
            .resolver
            .resolve_address(addr)
            .map(|n| n.to_lowercase())
            .unwrap_or_default()
            .into();
        self.hosts.insert(addr.to_string(), Arc::clone(&name));
        name
    }

    /// Lower-cased service name for `port`, empty when disabled
    pub fn service(&mut self, port: u16) -> Arc<str> {
        if !self.options.resolve_ports {
            return Arc::clone(&self.empty);
        }
        if let Some(name) = self.services.get(&port) {
            return Arc::clone(name);
        }

        let name: Arc<str> = self
            .resolver
            .resolve_service(&port.to_string())
            .to_lowercase()
            .into();
        self.services.insert(port, Arc::clone(&name));
        name
    }

    /// Number of distinct lookups made so far in this pass
    pub fn lookups(&self) -> usize {
        self.hosts.len() + self.services.len()
    }
}
