//! System-wide constants for the trk workspace.
//!
//! Single source of truth for numeric limits and defaults shared by the
//! pipeline components.

/// Default sample period of a producer when none is configured (30 Hz).
pub const DEFAULT_SAMPLE_PERIOD_SEC: f64 = 1.0 / 30.0;

/// Longest sample period a producer may be configured with (one hour).
pub const MAX_SAMPLE_PERIOD_SEC: f64 = 3600.0;

/// Maximum length in bytes of a position label (including NUL padding).
pub const POSITION_LABEL_LEN: usize = 32;

/// Maximum number of upstream sources a single fan-in component accepts.
pub const MAX_FAN_IN: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::consts::MAX_READERS;

    #[test]
    fn constants_are_consistent() {
        assert!(DEFAULT_SAMPLE_PERIOD_SEC > 0.0);
        assert!(DEFAULT_SAMPLE_PERIOD_SEC < MAX_SAMPLE_PERIOD_SEC);
        assert!(POSITION_LABEL_LEN >= 8);
        assert!(MAX_FAN_IN >= 2);
    }

    #[test]
    fn fan_in_fits_reader_slots() {
        assert!(MAX_FAN_IN <= MAX_READERS);
    }
}
