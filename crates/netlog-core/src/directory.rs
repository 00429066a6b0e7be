use std::collections::HashMap;

use parking_lot::RwLock;

use netlog_types::OwnerIdentity;

/// Read-only lookup from a uid (as a string key) to the owning application
pub trait IdentityDirectory: Send + Sync {
    fn lookup(&self, uid: &str) -> Option<OwnerIdentity>;
}

/// In-memory identity directory keyed by uid string
#[derive(Default)]
pub struct AppDirectory {
    apps: RwLock<HashMap<String, OwnerIdentity>>,
}

impl AppDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an application identity
    pub fn insert(&self, identity: OwnerIdentity) {
        self.apps.write().insert(identity.uid.to_string(), identity);
    }

    /// Forget an application, e.g. after uninstall
    pub fn remove(&self, uid: i32) -> Option<OwnerIdentity> {
        self.apps.write().remove(&uid.to_string())
    }

    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}

impl FromIterator<OwnerIdentity> for AppDirectory {
    fn from_iter<I: IntoIterator<Item = OwnerIdentity>>(iter: I) -> Self {
        let apps = iter
            .into_iter()
            .map(|identity| (identity.uid.to_string(), identity))
            .collect();
        Self {
            apps: RwLock::new(apps),
        }
    }
}

impl IdentityDirectory for AppDirectory {
    fn lookup(&self, uid: &str) -> Option<OwnerIdentity> {
        self.apps.read().get(uid).cloned()
    }
}
