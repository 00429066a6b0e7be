//! Settings for the connection log
//!
//! Loaded from TOML. Raw numbers are validated into the types the core
//! takes, so a bad bound fails here rather than inside the pipeline.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use netlog_types::{IconHandle, OwnerIdentity};

use crate::directory::AppDirectory;
use crate::filter::{Criteria, FieldToggles, FilterRules};
use crate::resolver::{ResolveOptions, TableResolver};

/// Default bound on buffered and historical entries
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 10_000;

/// Default merge period
pub const DEFAULT_MERGE_INTERVAL_MS: u64 = 1_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("max_log_entries must be greater than zero")]
    ZeroMaxEntries,

    #[error("merge_interval_ms must be greater than zero")]
    ZeroMergeInterval,
}

/// Filter text and field switches as the user entered them
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Comma-separated include tokens
    pub include: String,

    /// Comma-separated exclude tokens
    pub exclude: String,

    pub include_fields: FieldToggles,
    pub exclude_fields: FieldToggles,
}

impl FilterSettings {
    pub fn rules(&self) -> FilterRules {
        FilterRules::new(
            Criteria::parse(&self.include, self.include_fields),
            Criteria::parse(&self.exclude, self.exclude_fields),
        )
    }
}

/// A known application for the identity directory
#[derive(Clone, Debug, Deserialize)]
pub struct AppSettings {
    pub uid: i32,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl From<AppSettings> for OwnerIdentity {
    fn from(app: AppSettings) -> Self {
        let identity = OwnerIdentity::new(app.uid, app.name);
        match app.icon {
            Some(icon) => identity.with_icon(IconHandle(icon)),
            None => identity,
        }
    }
}

/// Top-level settings file
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_log_entries: usize,
    pub merge_interval_ms: u64,
    pub resolve_hosts: bool,
    pub resolve_ports: bool,
    pub filter: FilterSettings,
    pub apps: Vec<AppSettings>,

    /// Address -> host name
    pub hosts: HashMap<String, String>,

    /// Port -> service name
    pub services: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            merge_interval_ms: DEFAULT_MERGE_INTERVAL_MS,
            resolve_hosts: false,
            resolve_ports: false,
            filter: FilterSettings::default(),
            apps: Vec::new(),
            hosts: HashMap::new(),
            services: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load and validate settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every precondition the core relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.max_entries()?;
        self.merge_interval()?;
        Ok(())
    }

    pub fn max_entries(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.max_log_entries).ok_or(ConfigError::ZeroMaxEntries)
    }

    pub fn merge_interval(&self) -> Result<Duration, ConfigError> {
        match self.merge_interval_ms {
            0 => Err(ConfigError::ZeroMergeInterval),
            ms => Ok(Duration::from_millis(ms)),
        }
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            resolve_hosts: self.resolve_hosts,
            resolve_ports: self.resolve_ports,
        }
    }

    pub fn filter_rules(&self) -> FilterRules {
        self.filter.rules()
    }

    /// Identity directory seeded from `[[apps]]`
    pub fn directory(&self) -> AppDirectory {
        self.apps.iter().cloned().map(OwnerIdentity::from).collect()
    }

    /// Resolver seeded from `[hosts]` and `[services]`
    pub fn resolver(&self) -> TableResolver {
        TableResolver::new(self.hosts.clone(), self.services.clone())
    }
}
