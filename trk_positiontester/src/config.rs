//! `[posigen]` configuration table.
//!
//! ```toml
//! [posigen]
//! dt = 0.02        # sample period [s]
//! accel = 5.0      # acceleration standard deviation [units/s²]
//! seed = 1234      # optional, reproducible trajectory
//! count = 500      # optional, stop after this many samples
//! ```

use serde::Deserialize;
use trk_common::config::ConfigError;
use trk_common::consts::{DEFAULT_SAMPLE_PERIOD_SEC, MAX_SAMPLE_PERIOD_SEC};

/// Default acceleration standard deviation.
pub const DEFAULT_ACCEL: f64 = 5.0;

/// Position tester settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PosigenConfig {
    /// Sample period in seconds.
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Standard deviation of each zero-mean acceleration component.
    #[serde(default = "default_accel")]
    pub accel: f64,

    /// RNG seed; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Number of samples to publish; unbounded when absent.
    #[serde(default)]
    pub count: Option<u64>,
}

fn default_dt() -> f64 {
    DEFAULT_SAMPLE_PERIOD_SEC
}

fn default_accel() -> f64 {
    DEFAULT_ACCEL
}

impl Default for PosigenConfig {
    fn default() -> Self {
        Self {
            dt: DEFAULT_SAMPLE_PERIOD_SEC,
            accel: DEFAULT_ACCEL,
            seed: None,
            count: None,
        }
    }
}

impl PosigenConfig {
    /// Check numeric ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dt.is_finite() || self.dt <= 0.0 || self.dt > MAX_SAMPLE_PERIOD_SEC {
            return Err(ConfigError::ValidationError(format!(
                "dt must be in (0, {}] seconds, got {}",
                MAX_SAMPLE_PERIOD_SEC, self.dt
            )));
        }
        if !self.accel.is_finite() || self.accel < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "accel must be finite and non-negative, got {}",
                self.accel
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: PosigenConfig = toml::from_str("").unwrap();
        assert_eq!(config, PosigenConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse() {
        let config: PosigenConfig = toml::from_str("dt = 0.02\nseed = 9\ncount = 10").unwrap();
        assert_eq!(config.dt, 0.02);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.count, Some(10));
        assert_eq!(config.accel, DEFAULT_ACCEL);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(toml::from_str::<PosigenConfig>("dtt = 0.02").is_err());
    }

    #[test]
    fn test_validation() {
        for dt in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e20, MAX_SAMPLE_PERIOD_SEC * 2.0] {
            let config = PosigenConfig {
                dt,
                ..PosigenConfig::default()
            };
            assert!(config.validate().is_err());
        }
        let config = PosigenConfig {
            accel: -1.0,
            ..PosigenConfig::default()
        };
        assert!(config.validate().is_err());
        let still = PosigenConfig {
            accel: 0.0,
            ..PosigenConfig::default()
        };
        assert!(still.validate().is_ok());
        let slowest = PosigenConfig {
            dt: MAX_SAMPLE_PERIOD_SEC,
            ..PosigenConfig::default()
        };
        assert!(slowest.validate().is_ok());
    }
}
