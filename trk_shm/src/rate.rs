//! Sample-rate consistency check for fan-in components.

use thiserror::Error;

/// Two periods closer than this are considered equal (seconds).
pub const PERIOD_TOLERANCE_SEC: f64 = 1e-9;

/// Result of [`check_sample_periods`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateCheck {
    /// All periods agree within [`PERIOD_TOLERANCE_SEC`]
    pub consistent: bool,
    /// Rate of the slowest input, `1 / max(period)`
    pub effective_rate_hz: f64,
}

/// Invalid input to the rate check.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
    /// No periods given
    #[error("No sample periods to check")]
    Empty,

    /// A period is not a finite positive number
    #[error("Invalid sample period at index {index}: {period_sec} s")]
    InvalidPeriod {
        /// Position in the input
        index: usize,
        /// Offending value
        period_sec: f64,
    },
}

/// Check whether all inputs of a fan-in run at the same rate.
///
/// The combined output can only run as fast as the slowest input, so the
/// effective rate is always derived from the largest period. Inconsistency
/// is not an error; the caller decides whether to warn.
pub fn check_sample_periods(periods: &[f64]) -> Result<RateCheck, RateError> {
    if periods.is_empty() {
        return Err(RateError::Empty);
    }

    let mut min = f64::INFINITY;
    let mut max = 0.0_f64;
    for (index, &period_sec) in periods.iter().enumerate() {
        if !period_sec.is_finite() || period_sec <= 0.0 {
            return Err(RateError::InvalidPeriod { index, period_sec });
        }
        min = min.min(period_sec);
        max = max.max(period_sec);
    }

    Ok(RateCheck {
        consistent: max - min <= PERIOD_TOLERANCE_SEC,
        effective_rate_hz: 1.0 / max,
    })
}
