use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::pico_driver::Channel;

/// Default bound on the trigger wait, in milliseconds.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Threshold condition that starts sample acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerDirection {
    Above,
    Below,
    Rising,
    Falling,
    RisingOrFalling,
}

impl TriggerDirection {
    /// `PS5000A_THRESHOLD_DIRECTION` value understood by the driver.
    pub fn driver_code(self) -> u32 {
        match self {
            TriggerDirection::Above => 0,
            TriggerDirection::Below => 1,
            TriggerDirection::Rising => 2,
            TriggerDirection::Falling => 3,
            TriggerDirection::RisingOrFalling => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerDirection::Above => "above",
            TriggerDirection::Below => "below",
            TriggerDirection::Rising => "rising",
            TriggerDirection::Falling => "falling",
            TriggerDirection::RisingOrFalling => "rising_or_falling",
        }
    }
}

impl fmt::Display for TriggerDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "above" => Ok(TriggerDirection::Above),
            "below" => Ok(TriggerDirection::Below),
            "rising" => Ok(TriggerDirection::Rising),
            "falling" => Ok(TriggerDirection::Falling),
            "rising_or_falling" => Ok(TriggerDirection::RisingOrFalling),
            _ => Err(format!(
                "unknown trigger direction '{s}' (expected above, below, rising, falling or rising_or_falling)"
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerConfigError {
    #[error("trigger level {level_mv} mV is outside the ±{range_mv} mV input range")]
    LevelOutOfRange { level_mv: f64, range_mv: u32 },

    #[error("auto-trigger timeout {0} ms exceeds the driver maximum of 32767 ms")]
    AutoTriggerTooLarge(u16),

    #[error("trigger wait timeout must be at least 1 ms")]
    ZeroWaitTimeout,
}

/// Simple-trigger block of a capture configuration.
///
/// `auto_trigger_ms` is the device-side fallback (0 waits forever);
/// `wait_timeout_ms` bounds the host-side wait for the armed capture.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerSettings {
    pub enabled: bool,
    pub source: Channel,
    pub level_mv: f64,
    pub direction: TriggerDirection,
    pub delay_samples: u32,
    pub auto_trigger_ms: u16,
    pub wait_timeout_ms: u64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            source: Channel::A,
            level_mv: 500.0,
            direction: TriggerDirection::Rising,
            delay_samples: 0,
            auto_trigger_ms: 0,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
        }
    }
}

impl TriggerSettings {
    /// Check the settings against the selected input range.
    pub fn validate(&self, range_mv: u32) -> Result<(), TriggerConfigError> {
        if self.wait_timeout_ms == 0 {
            return Err(TriggerConfigError::ZeroWaitTimeout);
        }
        if !self.enabled {
            return Ok(());
        }
        if self.level_mv.abs() > f64::from(range_mv) {
            return Err(TriggerConfigError::LevelOutOfRange {
                level_mv: self.level_mv,
                range_mv,
            });
        }
        if self.auto_trigger_ms > i16::MAX as u16 {
            return Err(TriggerConfigError::AutoTriggerTooLarge(self.auto_trigger_ms));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_driver_codes() {
        assert_eq!(TriggerDirection::Above.driver_code(), 0);
        assert_eq!(TriggerDirection::Below.driver_code(), 1);
        assert_eq!(TriggerDirection::Rising.driver_code(), 2);
        assert_eq!(TriggerDirection::Falling.driver_code(), 3);
        assert_eq!(TriggerDirection::RisingOrFalling.driver_code(), 4);
    }

    #[test]
    fn test_direction_round_trips_through_str() {
        for direction in [
            TriggerDirection::Above,
            TriggerDirection::Below,
            TriggerDirection::Rising,
            TriggerDirection::Falling,
            TriggerDirection::RisingOrFalling,
        ] {
            assert_eq!(direction.as_str().parse::<TriggerDirection>(), Ok(direction));
        }
        assert!("sideways".parse::<TriggerDirection>().is_err());
    }

    #[test]
    fn test_disabled_trigger_skips_level_check() {
        let settings = TriggerSettings {
            level_mv: 9000.0,
            ..TriggerSettings::default()
        };
        assert!(settings.validate(5000).is_ok());
    }

    #[test]
    fn test_level_outside_range_is_rejected() {
        let settings = TriggerSettings {
            enabled: true,
            level_mv: 5001.0,
            ..TriggerSettings::default()
        };
        assert!(matches!(
            settings.validate(5000),
            Err(TriggerConfigError::LevelOutOfRange { .. })
        ));
    }

    #[test]
    fn test_zero_wait_timeout_is_rejected() {
        let settings = TriggerSettings {
            wait_timeout_ms: 0,
            ..TriggerSettings::default()
        };
        assert!(matches!(
            settings.validate(5000),
            Err(TriggerConfigError::ZeroWaitTimeout)
        ));
    }
}
