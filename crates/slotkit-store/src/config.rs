use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Configuration for an [`InMemoryStore`](crate::InMemoryStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name of the persistent domain this store owns. `raw_remove_all`
    /// clears exactly this domain.
    pub domain: String,
    /// Whether a write that leaves the effective value unchanged still
    /// notifies watchers. When `false`, such a write sends no `PRIOR`
    /// notification either.
    pub notify_unchanged: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            domain: "default".into(),
            notify_unchanged: true,
        }
    }
}

impl StoreConfig {
    /// Default configuration for the named domain.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document.
    ///
    /// Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.domain.trim().is_empty() {
            return Err(StoreError::EmptyDomain);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_notify_on_every_write() {
        let config = StoreConfig::default();
        assert_eq!(config.domain, "default");
        assert!(config.notify_unchanged);
    }

    #[test]
    fn parses_partial_toml() {
        let config = StoreConfig::from_toml_str(r#"domain = "com.example.app""#).unwrap();
        assert_eq!(config.domain, "com.example.app");
        assert!(config.notify_unchanged);

        let config = StoreConfig::from_toml_str("notify_unchanged = false").unwrap();
        assert_eq!(config.domain, "default");
        assert!(!config.notify_unchanged);
    }

    #[test]
    fn rejects_empty_domain() {
        assert!(matches!(
            StoreConfig::from_toml_str(r#"domain = "  ""#),
            Err(StoreError::EmptyDomain)
        ));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            StoreConfig::from_toml_str("domain = "),
            Err(StoreError::InvalidConfig(_))
        ));
    }
}
