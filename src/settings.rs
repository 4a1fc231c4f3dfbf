//! Pool Settings
//!
//! Serde-backed configuration consumed read-only by [`UnitPool`](crate::UnitPool)
//! and the default-pool provider. Loadable from JSON or RON text, or from a
//! file whose extension names the format.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Result, SoundSnapError};

/// Text formats accepted for settings and profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.json`
    Json,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Pick the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("ron") => Ok(ConfigFormat::Ron),
            _ => Err(SoundSnapError::Config(format!(
                "unsupported settings file extension: {}",
                path.display()
            ))),
        }
    }

    pub(crate) fn parse<T: DeserializeOwned>(self, text: &str) -> Result<T> {
        match self {
            ConfigFormat::Json => serde_json::from_str(text).map_err(SoundSnapError::config),
            ConfigFormat::Ron => ron::from_str(text).map_err(SoundSnapError::config),
        }
    }

    pub(crate) fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let format = Self::from_path(path)?;
        let text = std::fs::read_to_string(path)?;
        format.parse(&text)
    }
}

/// Pool sizing and diagnostic policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Units created up front when a pool is built.
    pub initial_unit_count: usize,
    /// Ceiling on live units; negative means unbounded.
    pub max_unit_count: i32,
    /// Create the default pool on first use when none was set.
    pub auto_create_pool: bool,
    /// Keep the default pool across [`reload_context`](crate::provider::reload_context).
    pub persist_across_reload: bool,
    /// Log a warning when a request is dropped at the ceiling.
    pub warn_on_capacity_exceeded: bool,
    /// Log a warning when a request has no mixer group.
    pub warn_on_missing_mixer_group: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            initial_unit_count: 0,
            max_unit_count: -1,
            auto_create_pool: true,
            persist_across_reload: true,
            warn_on_capacity_exceeded: true,
            warn_on_missing_mixer_group: true,
        }
    }
}

impl PoolSettings {
    /// Ceiling on live units, `None` when unbounded.
    pub fn max_units(&self) -> Option<usize> {
        usize::try_from(self.max_unit_count).ok()
    }

    /// Builder-style ceiling override.
    pub fn with_max_unit_count(mut self, max: i32) -> Self {
        self.max_unit_count = max;
        self
    }

    /// Builder-style initial unit count override.
    pub fn with_initial_unit_count(mut self, count: usize) -> Self {
        self.initial_unit_count = count;
        self
    }

    /// Parse JSON text; missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        ConfigFormat::Json.parse(text)
    }

    /// Parse RON text; missing keys take their defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        ConfigFormat::Ron.parse(text)
    }

    /// Load from a `.json` or `.ron` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        ConfigFormat::load(path.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PoolSettings::default();
        assert_eq!(settings.max_units(), None);
        assert_eq!(settings.initial_unit_count, 0);
        assert!(settings.auto_create_pool);
        assert!(settings.warn_on_capacity_exceeded);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = PoolSettings::from_json(r#"{ "max_unit_count": 8 }"#).unwrap();
        assert_eq!(settings.max_units(), Some(8));
        assert!(settings.persist_across_reload);
    }

    #[test]
    fn test_ron_parses() {
        let settings =
            PoolSettings::from_ron("(initial_unit_count: 4, warn_on_missing_mixer_group: false)")
                .unwrap();
        assert_eq!(settings.initial_unit_count, 4);
        assert!(!settings.warn_on_missing_mixer_group);
    }

    #[test]
    fn test_bad_text_is_config_error() {
        assert!(matches!(
            PoolSettings::from_json("{ nope"),
            Err(SoundSnapError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        assert!(ConfigFormat::from_path(Path::new("pool.toml")).is_err());
        assert_eq!(
            ConfigFormat::from_path(Path::new("POOL.RON")).unwrap(),
            ConfigFormat::Ron
        );
    }
}
