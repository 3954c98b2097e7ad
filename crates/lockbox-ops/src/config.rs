use std::path::{Path, PathBuf};
use std::time::Duration;

use lockbox_store::{JournalConfig, ManagerConfig};
use lockbox_types::{StoreDescriptor, StoreSettings};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lock namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "_objectStoreConnector";

/// How key-level operations interact with store-level ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Key operations take only their key lock. `clear`, listing and sweeps
    /// may interleave with them.
    #[default]
    KeyLockOnly,
    /// Key operations take the store lock, then the key lock, so they are
    /// mutually exclusive with `clear`, listing and sweeps.
    StoreSerialized,
}

/// Top-level configuration of an [`ObjectStoreConnector`](crate::ObjectStoreConnector).
///
/// ```toml
/// owning_context = "billing-app"
/// parent_context = "billing"
/// data_dir = "/var/lib/lockbox"
///
/// [[stores]]
/// name = "sessions"
/// persistent = false
/// entry_ttl = 30
/// entry_ttl_unit = "MINUTES"
///
/// [[stores]]
/// private = true
/// max_entries = 1000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Prefix of every lock identifier (default: `_objectStoreConnector`).
    pub namespace: String,
    /// Directory for persistent store journals (default: `.lockbox`).
    pub data_dir: PathBuf,
    /// Context stores are registered in and looked up from.
    pub owning_context: Option<String>,
    /// Parent of `owning_context`, checked for name collisions and lookups.
    pub parent_context: Option<String>,
    /// Whether the default partition is journal-backed (default: `false`).
    pub default_partition_persistent: bool,
    /// Reap idle lock handles once this many exist (default: never).
    pub lock_reclaim_threshold: Option<usize>,
    /// Give up on a store or key lock after this many milliseconds and fail
    /// with `StoreNotAvailable` (default: wait forever).
    pub lock_timeout_ms: Option<u64>,
    pub consistency: ConsistencyMode,
    pub journal: JournalConfig,
    /// Stores started together with the connector.
    pub stores: Vec<StoreDefinitionConfig>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        let manager = ManagerConfig::default();
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data_dir: manager.data_dir,
            owning_context: None,
            parent_context: None,
            default_partition_persistent: manager.default_partition_persistent,
            lock_reclaim_threshold: None,
            lock_timeout_ms: None,
            consistency: ConsistencyMode::default(),
            journal: manager.journal,
            stores: Vec::new(),
        }
    }
}

impl ConnectorConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// How long lock acquisition may wait, if bounded.
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".into()));
        }
        for store in &self.stores {
            store.validate()?;
        }
        Ok(())
    }

    /// Settings for the local store manager.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            data_dir: self.data_dir.clone(),
            default_partition_persistent: self.default_partition_persistent,
            journal: self.journal.clone(),
        }
    }
}

/// One store declared in the config file.
///
/// A top-level store must be named. A `private` store may omit its name and
/// then runs under a generated alias.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDefinitionConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(flatten)]
    pub settings: StoreSettings,
}

impl StoreDefinitionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.private && self.name.is_none() {
            return Err(ConfigError::Invalid(
                "a store that is not private needs a name".into(),
            ));
        }
        self.settings.validate().map_err(|e| {
            ConfigError::Invalid(format!(
                "store '{}': {e}",
                self.name.as_deref().unwrap_or("<private>")
            ))
        })
    }

    /// The descriptor for this declaration. Contexts are left unset so the
    /// connector's apply.
    pub fn to_descriptor(&self) -> Result<StoreDescriptor, ConfigError> {
        self.validate()?;
        match (&self.name, self.private) {
            (name, true) => Ok(StoreDescriptor::inline(name.clone(), self.settings.clone())),
            (Some(name), false) => Ok(StoreDescriptor::top_level(name.clone(), self.settings.clone())),
            (None, false) => Err(ConfigError::Invalid(
                "a store that is not private needs a name".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_types::{NameResolution, TimeUnit};

    #[test]
    fn defaults() {
        let c = ConnectorConfig::default();
        assert_eq!(c.namespace, "_objectStoreConnector");
        assert_eq!(c.data_dir, PathBuf::from(".lockbox"));
        assert!(!c.default_partition_persistent);
        assert_eq!(c.consistency, ConsistencyMode::KeyLockOnly);
        assert!(c.lock_reclaim_threshold.is_none());
        assert!(c.lock_timeout().is_none());
        assert!(c.stores.is_empty());
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(ConnectorConfig::from_toml("").unwrap(), ConnectorConfig::default());
    }

    #[test]
    fn parses_stores() {
        let c = ConnectorConfig::from_toml(
            r#"
            owning_context = "app"
            parent_context = "domain"
            consistency = "store_serialized"
            lock_reclaim_threshold = 4096
            lock_timeout_ms = 250

            [[stores]]
            name = "sessions"
            persistent = false
            entry_ttl = 30
            entry_ttl_unit = "MINUTES"

            [[stores]]
            private = true
            max_entries = 10
            "#,
        )
        .unwrap();

        assert_eq!(c.owning_context.as_deref(), Some("app"));
        assert_eq!(c.consistency, ConsistencyMode::StoreSerialized);
        assert_eq!(c.lock_reclaim_threshold, Some(4096));
        assert_eq!(c.lock_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(c.stores.len(), 2);

        let sessions = &c.stores[0];
        assert!(!sessions.settings.persistent);
        assert_eq!(sessions.settings.entry_ttl, Some(30));
        assert_eq!(sessions.settings.entry_ttl_unit, TimeUnit::Minutes);

        let private = c.stores[1].to_descriptor().unwrap();
        assert!(private.name().starts_with("inline-store-"));
        assert!(matches!(
            private.resolution,
            NameResolution::GeneratedAliasWithFallback { store_name: None, .. }
        ));
        assert_eq!(private.settings.max_entries, Some(10));
    }

    #[test]
    fn top_level_store_needs_a_name() {
        let err = ConnectorConfig::from_toml("[[stores]]\nmax_entries = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn invalid_settings_are_reported() {
        let err = ConnectorConfig::from_toml("[[stores]]\nname = \"s\"\nmax_entries = 0\n").unwrap_err();
        assert!(err.to_string().contains("store 's'"));
    }

    #[test]
    fn manager_config_follows_connector() {
        let c = ConnectorConfig {
            data_dir: "/tmp/x".into(),
            default_partition_persistent: true,
            ..ConnectorConfig::default()
        };
        let m = c.manager_config();
        assert_eq!(m.data_dir, PathBuf::from("/tmp/x"));
        assert!(m.default_partition_persistent);
    }
}
