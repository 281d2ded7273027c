//! `[posicom]` configuration table.
//!
//! ```toml
//! [posicom]
//! sources = ["pos_left", "pos_right"]
//! sink = "pos_mean"
//! connect_timeout_ms = 5000
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use trk_common::config::ConfigError;
use trk_common::consts::MAX_FAN_IN;
use trk_shm::validate_address;

/// Default time allowed for every upstream sink to appear.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Position combiner settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PosicomConfig {
    /// Upstream position addresses, combined in this order.
    #[serde(default)]
    pub sources: Vec<String>,

    /// Output address.
    #[serde(default)]
    pub sink: String,

    /// How long to retry connecting to sources that are not bound yet.
    /// 0 tries once.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl Default for PosicomConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            sink: String::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl PosicomConfig {
    /// Build from positional CLI addresses: every address but the last is a
    /// source, the last is the sink.
    pub fn from_addresses(addresses: &[String]) -> Self {
        match addresses.split_last() {
            Some((sink, sources)) => Self {
                sources: sources.to_vec(),
                sink: sink.clone(),
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    /// Check addresses and fan-in width.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one source is required".to_string(),
            ));
        }
        if self.sources.len() > MAX_FAN_IN {
            return Err(ConfigError::ValidationError(format!(
                "{} sources exceed the fan-in limit of {}",
                self.sources.len(),
                MAX_FAN_IN
            )));
        }

        let mut seen = HashSet::new();
        for address in self.sources.iter().chain(std::iter::once(&self.sink)) {
            validate_address(address)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
            if !seen.insert(address.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "address '{address}' is used more than once"
                )));
            }
        }
        Ok(())
    }

    /// Component name used in log lines: `posicom[first...->sink]`.
    pub fn name(&self) -> String {
        match self.sources.first() {
            Some(first) => format!("posicom[{}...->{}]", first, self.sink),
            None => format!("posicom[->{}]", self.sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_addresses() {
        let config = PosicomConfig::from_addresses(&addrs(&["a", "b", "out"]));
        assert_eq!(config.sources, addrs(&["a", "b"]));
        assert_eq!(config.sink, "out");
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert!(config.validate().is_ok());
        assert_eq!(config.name(), "posicom[a...->out]");
    }

    #[test]
    fn test_requires_a_source() {
        let config = PosicomConfig::from_addresses(&addrs(&["out"]));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(PosicomConfig::default().validate().is_err());
    }

    #[test]
    fn test_rejects_duplicates_and_bad_addresses() {
        let dup = PosicomConfig::from_addresses(&addrs(&["a", "a", "out"]));
        assert!(dup.validate().is_err());

        let loop_back = PosicomConfig::from_addresses(&addrs(&["a", "b", "a"]));
        assert!(loop_back.validate().is_err());

        let bad = PosicomConfig::from_addresses(&addrs(&["a", "b/c", "out"]));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_fan_in_limit() {
        let mut list: Vec<String> = (0..=MAX_FAN_IN).map(|i| format!("s{i}")).collect();
        list.push("out".to_string());
        let config = PosicomConfig::from_addresses(&list);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_table() {
        let config: PosicomConfig = toml::from_str(
            r#"
            sources = ["left", "right"]
            sink = "mean"
            "#,
        )
        .unwrap();
        assert_eq!(config.sources, addrs(&["left", "right"]));
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
    }
}
