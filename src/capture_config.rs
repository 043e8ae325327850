//! Capture settings with layered resolution: built-in defaults, then the
//! YAML file, then command-line overrides. The resolved record is validated
//! once and never mutated afterwards.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::pico_driver::{Channel, Coupling, DeviceResolution, VoltageRange};
use crate::trigger_config::{TriggerConfigError, TriggerDirection, TriggerSettings};

/// Output container selection for captured samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    Csv,
    Ipc,
    Both,
}

impl SaveFormat {
    pub fn writes_csv(self) -> bool {
        matches!(self, SaveFormat::Csv | SaveFormat::Both)
    }

    pub fn writes_ipc(self) -> bool {
        matches!(self, SaveFormat::Ipc | SaveFormat::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SaveFormat::Csv => "csv",
            SaveFormat::Ipc => "ipc",
            SaveFormat::Both => "both",
        }
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(SaveFormat::Csv),
            "ipc" => Ok(SaveFormat::Ipc),
            "both" => Ok(SaveFormat::Both),
            _ => Err(format!("unknown save format '{s}' (expected csv, ipc or both)")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("sample count must be at least 1")]
    ZeroSamples,

    #[error("pre-trigger ratio {0} is outside 0.0..=1.0")]
    PreTriggerRatioOutOfRange(f64),

    #[error("capture count must be at least 1")]
    ZeroCaptures,

    #[error("trigger delay of {delay} samples exceeds the {samples}-sample capture")]
    TriggerDelayExceedsCapture { delay: u32, samples: u32 },

    #[error(transparent)]
    Trigger(#[from] TriggerConfigError),
}

/// Validated acquisition parameters for one invocation.
///
/// `channel`, `coupling`, `range`, `timebase` and `samples` must come from
/// the file (or an override); everything else falls back to a built-in
/// default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    #[serde(default = "defaults::resolution")]
    pub resolution: DeviceResolution,
    pub channel: Channel,
    pub coupling: Coupling,
    pub range: VoltageRange,
    #[serde(default)]
    pub offset_volts: f64,
    pub timebase: u32,
    pub samples: u32,
    #[serde(default)]
    pub pre_trigger_ratio: f64,
    #[serde(default)]
    pub trigger: TriggerSettings,

    #[serde(default = "defaults::save_format")]
    pub save_format: SaveFormat,
    #[serde(default = "defaults::csv_path")]
    pub csv_path: PathBuf,
    #[serde(default = "defaults::ipc_path")]
    pub ipc_path: PathBuf,
    #[serde(default)]
    pub timestamp_filenames: bool,

    #[serde(default = "defaults::captures")]
    pub captures: u32,
    #[serde(default)]
    pub rest_ms: u64,
}

mod defaults {
    use super::{DeviceResolution, PathBuf, SaveFormat};

    pub(super) fn resolution() -> DeviceResolution {
        DeviceResolution::Bits8
    }

    pub(super) fn save_format() -> SaveFormat {
        SaveFormat::Csv
    }

    pub(super) fn csv_path() -> PathBuf {
        PathBuf::from("capture.csv")
    }

    pub(super) fn ipc_path() -> PathBuf {
        PathBuf::from("capture.arrow")
    }

    pub(super) fn captures() -> u32 {
        1
    }
}

impl CaptureConfig {
    /// Load a configuration from `path` and apply `overrides` on top.
    pub fn load(path: &Path, overrides: &CaptureOverrides) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let config = overrides.apply(config);
        config.validate()?;
        log::debug!(
            "loaded config from {}: channel={} timebase={} samples={}",
            path.display(),
            config.channel,
            config.timebase,
            config.samples
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        if !(0.0..=1.0).contains(&self.pre_trigger_ratio) {
            return Err(ConfigError::PreTriggerRatioOutOfRange(self.pre_trigger_ratio));
        }
        if self.captures == 0 {
            return Err(ConfigError::ZeroCaptures);
        }
        self.trigger.validate(self.range.millivolts())?;
        if self.trigger.enabled && self.trigger.delay_samples > self.samples {
            return Err(ConfigError::TriggerDelayExceedsCapture {
                delay: self.trigger.delay_samples,
                samples: self.samples,
            });
        }
        Ok(())
    }
}

/// Command-line overrides; a `None` field leaves the file value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOverrides {
    pub resolution: Option<DeviceResolution>,
    pub channel: Option<Channel>,
    pub coupling: Option<Coupling>,
    pub range: Option<VoltageRange>,
    pub offset_volts: Option<f64>,
    pub timebase: Option<u32>,
    pub samples: Option<u32>,
    pub pre_trigger_ratio: Option<f64>,
    pub trigger_enabled: Option<bool>,
    pub trigger_source: Option<Channel>,
    pub trigger_level_mv: Option<f64>,
    pub trigger_direction: Option<TriggerDirection>,
    pub trigger_delay_samples: Option<u32>,
    pub auto_trigger_ms: Option<u16>,
    pub wait_timeout_ms: Option<u64>,
    pub save_format: Option<SaveFormat>,
    pub csv_path: Option<PathBuf>,
    pub ipc_path: Option<PathBuf>,
    pub timestamp_filenames: Option<bool>,
    pub captures: Option<u32>,
    pub rest_ms: Option<u64>,
}

impl CaptureOverrides {
    /// Produce a new configuration with every set override applied.
    pub fn apply(&self, mut config: CaptureConfig) -> CaptureConfig {
        if let Some(value) = self.resolution {
            config.resolution = value;
        }
        if let Some(value) = self.channel {
            config.channel = value;
        }
        if let Some(value) = self.coupling {
            config.coupling = value;
        }
        if let Some(value) = self.range {
            config.range = value;
        }
        if let Some(value) = self.offset_volts {
            config.offset_volts = value;
        }
        if let Some(value) = self.timebase {
            config.timebase = value;
        }
        if let Some(value) = self.samples {
            config.samples = value;
        }
        if let Some(value) = self.pre_trigger_ratio {
            config.pre_trigger_ratio = value;
        }
        if let Some(value) = self.trigger_enabled {
            config.trigger.enabled = value;
        }
        if let Some(value) = self.trigger_source {
            config.trigger.source = value;
        }
        if let Some(value) = self.trigger_level_mv {
            config.trigger.level_mv = value;
        }
        if let Some(value) = self.trigger_direction {
            config.trigger.direction = value;
        }
        if let Some(value) = self.trigger_delay_samples {
            config.trigger.delay_samples = value;
        }
        if let Some(value) = self.auto_trigger_ms {
            config.trigger.auto_trigger_ms = value;
        }
        if let Some(value) = self.wait_timeout_ms {
            config.trigger.wait_timeout_ms = value;
        }
        if let Some(value) = self.save_format {
            config.save_format = value;
        }
        if let Some(value) = &self.csv_path {
            config.csv_path = value.clone();
        }
        if let Some(value) = &self.ipc_path {
            config.ipc_path = value.clone();
        }
        if let Some(value) = self.timestamp_filenames {
            config.timestamp_filenames = value;
        }
        if let Some(value) = self.captures {
            config.captures = value;
        }
        if let Some(value) = self.rest_ms {
            config.rest_ms = value;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_YAML: &str = "
channel: a
coupling: dc
range: 5v
timebase: 8
samples: 1000
";

    fn minimal_config() -> CaptureConfig {
        serde_yaml::from_str(MINIMAL_YAML).unwrap()
    }

    #[test]
    fn test_minimal_yaml_gets_builtin_defaults() {
        let config = minimal_config();
        assert_eq!(config.resolution, DeviceResolution::Bits8);
        assert_eq!(config.offset_volts, 0.0);
        assert_eq!(config.pre_trigger_ratio, 0.0);
        assert!(!config.trigger.enabled);
        assert_eq!(config.save_format, SaveFormat::Csv);
        assert_eq!(config.csv_path, PathBuf::from("capture.csv"));
        assert_eq!(config.captures, 1);
        assert_eq!(config.rest_ms, 0);
        assert!(!config.timestamp_filenames);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_required_key_is_a_parse_error() {
        let result: Result<CaptureConfig, _> = serde_yaml::from_str("channel: a\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let yaml = format!("{MINIMAL_YAML}vrange: 5v\n");
        let result: Result<CaptureConfig, _> = serde_yaml::from_str(&yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_nested_trigger_block_parses() {
        let yaml = format!(
            "{MINIMAL_YAML}trigger:\n  enabled: true\n  level_mv: 250.0\n  direction: falling\n"
        );
        let config: CaptureConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.trigger.enabled);
        assert_eq!(config.trigger.level_mv, 250.0);
        assert_eq!(config.trigger.direction, TriggerDirection::Falling);
        // unspecified trigger fields keep their defaults
        assert_eq!(config.trigger.source, Channel::A);
        assert_eq!(config.trigger.wait_timeout_ms, 10_000);
    }

    #[test]
    fn test_flag_beats_file_value() {
        let overrides = CaptureOverrides {
            samples: Some(2_000_000),
            ..CaptureOverrides::default()
        };
        let config = overrides.apply(minimal_config());
        assert_eq!(config.samples, 2_000_000);
        // untouched fields keep the file values
        assert_eq!(config.timebase, 8);
    }

    #[test]
    fn test_load_layers_defaults_file_and_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{MINIMAL_YAML}save_format: both\n").unwrap();
        let overrides = CaptureOverrides {
            samples: Some(2_000_000),
            timestamp_filenames: Some(true),
            ..CaptureOverrides::default()
        };
        let config = CaptureConfig::load(file.path(), &overrides).unwrap();
        assert_eq!(config.samples, 2_000_000); // flag beats file
        assert_eq!(config.save_format, SaveFormat::Both); // file beats default
        assert_eq!(config.captures, 1); // built-in default survives
        assert!(config.timestamp_filenames);
    }

    #[test]
    fn test_load_missing_file_is_a_read_error() {
        let result = CaptureConfig::load(
            Path::new("/nonexistent/capture_config.yml"),
            &CaptureOverrides::default(),
        );
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = minimal_config();
        config.samples = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSamples)));

        let mut config = minimal_config();
        config.pre_trigger_ratio = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PreTriggerRatioOutOfRange(_))
        ));

        let mut config = minimal_config();
        config.captures = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCaptures)));

        let mut config = minimal_config();
        config.trigger.enabled = true;
        config.trigger.level_mv = 6_000.0;
        assert!(matches!(config.validate(), Err(ConfigError::Trigger(_))));

        let mut config = minimal_config();
        config.trigger.enabled = true;
        config.trigger.delay_samples = 2_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TriggerDelayExceedsCapture {
                delay: 2_000,
                samples: 1_000
            })
        ));
    }
}
