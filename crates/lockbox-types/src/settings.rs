use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Unit attached to a configured duration amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert `amount` of this unit into a [`Duration`].
    pub fn to_duration(&self, amount: u64) -> Duration {
        match self {
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            Self::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Milliseconds => write!(f, "MILLISECONDS"),
            Self::Seconds => write!(f, "SECONDS"),
            Self::Minutes => write!(f, "MINUTES"),
            Self::Hours => write!(f, "HOURS"),
            Self::Days => write!(f, "DAYS"),
        }
    }
}

/// Policy for one store partition: persistence, capacity and expiration.
///
/// Durations are expressed as an amount plus a [`TimeUnit`], which is also
/// how they appear in TOML configuration:
///
/// ```toml
/// persistent = false
/// max_entries = 1000
/// entry_ttl = 30
/// entry_ttl_unit = "MINUTES"
/// expiration_interval = 10
/// expiration_interval_unit = "SECONDS"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Whether entries survive a process restart (default: `true`).
    pub persistent: bool,
    /// Upper bound on the number of entries; the oldest are evicted first.
    pub max_entries: Option<usize>,
    /// Time-to-live amount for each entry, counted from its last write.
    pub entry_ttl: Option<u64>,
    /// Unit for `entry_ttl` (default: seconds).
    pub entry_ttl_unit: TimeUnit,
    /// How often the eviction sweep runs (default: 1).
    pub expiration_interval: u64,
    /// Unit for `expiration_interval` (default: minutes).
    pub expiration_interval_unit: TimeUnit,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            persistent: true,
            max_entries: None,
            entry_ttl: None,
            entry_ttl_unit: TimeUnit::Seconds,
            expiration_interval: 1,
            expiration_interval_unit: TimeUnit::Minutes,
        }
    }
}

impl StoreSettings {
    /// Settings for a non-persistent store with no eviction policy.
    pub fn in_memory() -> Self {
        Self {
            persistent: false,
            ..Default::default()
        }
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_entry_ttl(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.entry_ttl = Some(amount);
        self.entry_ttl_unit = unit;
        self
    }

    pub fn with_expiration_interval(mut self, amount: u64, unit: TimeUnit) -> Self {
        self.expiration_interval = amount;
        self.expiration_interval_unit = unit;
        self
    }

    /// The configured entry TTL, if any.
    pub fn entry_ttl(&self) -> Option<Duration> {
        self.entry_ttl.map(|amount| self.entry_ttl_unit.to_duration(amount))
    }

    /// Interval between eviction sweeps.
    pub fn sweep_interval(&self) -> Duration {
        self.expiration_interval_unit
            .to_duration(self.expiration_interval)
    }

    /// Returns `true` when a capacity bound or TTL is configured, i.e. when
    /// a sweep timer is needed at all.
    pub fn has_eviction_policy(&self) -> bool {
        self.max_entries.is_some() || self.entry_ttl.is_some()
    }

    /// Reject settings that cannot be honoured.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.max_entries == Some(0) {
            return Err(TypeError::InvalidSettings(
                "max_entries must be greater than zero".into(),
            ));
        }
        if self.entry_ttl == Some(0) {
            return Err(TypeError::InvalidSettings(
                "entry_ttl must be greater than zero".into(),
            ));
        }
        if self.has_eviction_policy() && self.sweep_interval().is_zero() {
            return Err(TypeError::InvalidSettings(
                "expiration_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = StoreSettings::default();
        assert!(s.persistent);
        assert!(s.max_entries.is_none());
        assert!(s.entry_ttl().is_none());
        assert_eq!(s.sweep_interval(), Duration::from_secs(60));
        assert!(!s.has_eviction_policy());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn time_unit_conversion() {
        assert_eq!(TimeUnit::Milliseconds.to_duration(1500), Duration::from_millis(1500));
        assert_eq!(TimeUnit::Seconds.to_duration(3), Duration::from_secs(3));
        assert_eq!(TimeUnit::Minutes.to_duration(2), Duration::from_secs(120));
        assert_eq!(TimeUnit::Hours.to_duration(1), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Days.to_duration(1), Duration::from_secs(86_400));
    }

    #[test]
    fn builder_sets_policy() {
        let s = StoreSettings::in_memory()
            .with_max_entries(10)
            .with_entry_ttl(5, TimeUnit::Seconds)
            .with_expiration_interval(100, TimeUnit::Milliseconds);
        assert!(!s.persistent);
        assert!(s.has_eviction_policy());
        assert_eq!(s.entry_ttl(), Some(Duration::from_secs(5)));
        assert_eq!(s.sweep_interval(), Duration::from_millis(100));
    }

    #[test]
    fn validate_rejects_zero_values() {
        let zero_cap = StoreSettings::default().with_max_entries(0);
        assert!(matches!(zero_cap.validate(), Err(TypeError::InvalidSettings(_))));

        let zero_ttl = StoreSettings::default().with_entry_ttl(0, TimeUnit::Seconds);
        assert!(zero_ttl.validate().is_err());

        let zero_interval = StoreSettings::default()
            .with_max_entries(1)
            .with_expiration_interval(0, TimeUnit::Seconds);
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn zero_interval_is_fine_without_policy() {
        let s = StoreSettings::default().with_expiration_interval(0, TimeUnit::Seconds);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn toml_roundtrip_with_partial_fields() {
        let parsed: StoreSettings = toml::from_str(
            r#"
            persistent = false
            max_entries = 3
            entry_ttl = 30
            entry_ttl_unit = "MINUTES"
            "#,
        )
        .unwrap();
        assert!(!parsed.persistent);
        assert_eq!(parsed.max_entries, Some(3));
        assert_eq!(parsed.entry_ttl(), Some(Duration::from_secs(1800)));
        // Unspecified fields fall back to defaults.
        assert_eq!(parsed.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn time_unit_display() {
        assert_eq!(TimeUnit::Seconds.to_string(), "SECONDS");
        assert_eq!(TimeUnit::Days.to_string(), "DAYS");
    }
}
