//! Include/exclude filtering of connection entries

use serde::Deserialize;
use tracing::debug;

use netlog_types::{ArcConnectionEntry, ConnectionEntry};

use crate::cache::PassCache;
use crate::resolver::{NameResolver, ResolveOptions};

/// Which entry fields a criteria group's tokens are tested against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldToggles {
    pub name: bool,
    pub uid: bool,
    pub address: bool,
    pub port: bool,
}

impl FieldToggles {
    pub const ALL: Self = Self {
        name: true,
        uid: true,
        address: true,
        port: true,
    };

    pub const NONE: Self = Self {
        name: false,
        uid: false,
        address: false,
        port: false,
    };

    pub fn name_only() -> Self {
        Self {
            name: true,
            ..Self::NONE
        }
    }

    pub fn port_only() -> Self {
        Self {
            port: true,
            ..Self::NONE
        }
    }

    pub fn address_only() -> Self {
        Self {
            address: true,
            ..Self::NONE
        }
    }
}

impl Default for FieldToggles {
    fn default() -> Self {
        Self::ALL
    }
}

/// One side (include or exclude) of a filter: tokens plus field switches
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Criteria {
    /// Lower-cased, non-empty tokens
    tokens: Vec<String>,

    fields: FieldToggles,
}

impl Criteria {
    /// Build from individual tokens; tokens are trimmed and lower-cased
    pub fn new<I, S>(tokens: I, fields: FieldToggles) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { tokens, fields }
    }

    /// Parse comma-separated filter text, e.g. `"firefox, 443"`
    pub fn parse(text: &str, fields: FieldToggles) -> Self {
        Self::new(text.split(','), fields)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn fields(&self) -> FieldToggles {
        self.fields
    }

    /// Check if there is nothing to match against
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// True if any token matches any enabled field
    pub fn matches(&self, entry: &ConnectionEntry, cache: &mut PassCache<'_>) -> bool {
        let fields = self.fields;

        let hosts = fields
            .address
            .then(|| (cache.host(&entry.src_addr), cache.host(&entry.dst_addr)));

        let ports = fields.port.then(|| {
            (
                entry.src_port.to_string(),
                cache.service(entry.src_port),
                entry.dst_port.to_string(),
                cache.service(entry.dst_port),
            )
        });

        self.tokens.iter().any(|token| {
            let token = token.as_str();

            (fields.name && entry.name_lowercase().contains(token))
                || (fields.uid && entry.uid_str() == token)
                || hosts.as_ref().is_some_and(|(src, dst)| {
                    entry.src_addr.contains(token)
                        || src.contains(token)
                        || entry.dst_addr.contains(token)
                        || dst.contains(token)
                })
                || ports
                    .as_ref()
                    .is_some_and(|(src_raw, src, dst_raw, dst)| {
                        src_raw == token
                            || &**src == token
                            || dst_raw == token
                            || &**dst == token
                    })
        })
    }
}

/// Include/exclude rule set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterRules {
    pub include: Criteria,
    pub exclude: Criteria,
}

impl FilterRules {
    pub fn new(include: Criteria, exclude: Criteria) -> Self {
        Self { include, exclude }
    }

    /// Only include criteria
    pub fn including(include: Criteria) -> Self {
        Self {
            include,
            ..Self::default()
        }
    }

    /// Only exclude criteria
    pub fn excluding(exclude: Criteria) -> Self {
        Self {
            exclude,
            ..Self::default()
        }
    }

    /// Whether evaluating these rules can change anything
    pub fn is_active(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }
}

/// Evaluates rule sets against history snapshots
pub struct FilterEngine<'a> {
    resolver: &'a dyn NameResolver,
    options: ResolveOptions,
}

impl<'a> FilterEngine<'a> {
    pub fn new(resolver: &'a dyn NameResolver, options: ResolveOptions) -> Self {
        Self { resolver, options }
    }

    /// Project `snapshot` through `rules`, preserving order
    ///
    /// Exclusion is applied after inclusion, so an entry matching both is
    /// dropped.
    pub fn evaluate(
        &self,
        snapshot: &[ArcConnectionEntry],
        rules: &FilterRules,
    ) -> Vec<ArcConnectionEntry> {
        if !rules.is_active() {
            return snapshot.to_vec();
        }

        let mut cache = PassCache::new(self.resolver, self.options);

        let mut passed: Vec<ArcConnectionEntry> = if rules.include.is_empty() {
            snapshot.to_vec()
        } else {
            snapshot
                .iter()
                .filter(|entry| rules.include.matches(entry, &mut cache))
                .cloned()
                .collect()
        };

        if !rules.exclude.is_empty() {
            passed.retain(|entry| !rules.exclude.matches(entry, &mut cache));
        }

        debug!(
            total = snapshot.len(),
            kept = passed.len(),
            lookups = cache.lookups(),
            "filter pass complete"
        );
        passed
    }
}
