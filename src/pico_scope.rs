//! Owned session against one oscilloscope unit.
//!
//! [`PicoScope::open`] claims the unit; dropping the session releases it,
//! whichever way the capture path exits. One session performs one closed
//! transaction: configure, arm, read.

use polars::prelude::*;
use std::thread;
use std::time::{Duration, Instant};

use crate::capture_config::CaptureConfig;
use crate::pico_driver::{
    Channel, Coupling, DeviceResolution, PicoStatus, ScopeDriver, UnitInfo, VoltageRange,
};
use crate::trigger_config::TriggerDirection;

/// Cadence of the `IsReady` poll while a block capture is armed.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Attempts of the upward timebase scan before giving up.
const TIMEBASE_SCAN_LIMIT: u32 = 4096;

pub(crate) const TIME_COLUMN_NAME: &str = "time_ns";
pub(crate) const MILLIVOLTS_COLUMN_NAME: &str = "mv";

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("no oscilloscope unit available: {0}")]
    DeviceUnavailable(PicoStatus),

    #[error("device rejected the requested configuration: {0}")]
    ConfigurationRejected(PicoStatus),

    #[error("no trigger within {waited_ms} ms")]
    CaptureTimeout { waited_ms: u64 },

    #[error("driver call failed: {0}")]
    Driver(PicoStatus),
}

impl ScopeError {
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, ScopeError::DeviceUnavailable(_))
    }
}

/// Timebase actually granted by the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTimebase {
    pub timebase: u32,
    pub interval_ns: f64,
    pub driver_max_samples: u32,
}

/// Samples of one completed block capture, in millivolts.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub millivolts: Vec<f64>,
    pub interval_ns: f64,
    pub pre_trigger_samples: u32,
    /// The input clipped at the selected range during the capture.
    pub overflow: bool,
}

impl CaptureResult {
    pub fn sample_count(&self) -> usize {
        self.millivolts.len()
    }

    /// Two-column frame with a time axis derived from the row index,
    /// zeroed at the trigger position.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let samples: Column =
            Series::new(MILLIVOLTS_COLUMN_NAME.into(), self.millivolts.as_slice()).into();
        DataFrame::new(vec![samples])?
            .lazy()
            .with_row_index("row_index", Some(0))
            .with_columns([
                ((col("row_index").cast(DataType::Float64)
                    - lit(f64::from(self.pre_trigger_samples)))
                    * lit(self.interval_ns))
                .alias(TIME_COLUMN_NAME),
            ])
            .select([col(TIME_COLUMN_NAME), col(MILLIVOLTS_COLUMN_NAME)])
            .collect()
    }
}

/// Convert a raw ADC count to millivolts for the given input range.
pub fn adc_to_millivolts(raw: i16, range: VoltageRange, max_adc: i16) -> f64 {
    f64::from(raw) * f64::from(range.millivolts()) / f64::from(max_adc)
}

/// Convert a millivolt level to the nearest ADC count for the given range.
/// Levels beyond the range clamp to full scale.
pub fn millivolts_to_adc(level_mv: f64, range: VoltageRange, max_adc: i16) -> i16 {
    let full_scale = f64::from(range.millivolts());
    let clamped = level_mv.clamp(-full_scale, full_scale);
    (clamped * f64::from(max_adc) / full_scale).round() as i16
}

/// An open oscilloscope unit.
#[derive(Debug)]
pub struct PicoScope<D: ScopeDriver> {
    driver: D,
    max_adc: i16,
}

impl<D: ScopeDriver> PicoScope<D> {
    /// Claim a unit at the given resolution.
    ///
    /// A power-source prompt from `OpenUnit` is answered with
    /// `ChangePowerSource` and the open proceeds; any other failure is
    /// reported as [`ScopeError::DeviceUnavailable`].
    pub fn open(mut driver: D, resolution: DeviceResolution) -> Result<Self, ScopeError> {
        match driver.open(resolution) {
            Ok(()) => {}
            Err(prompt) if prompt.is_power_source_prompt() => {
                log::debug!("answering power source prompt {prompt}");
                driver
                    .change_power_source(prompt)
                    .map_err(ScopeError::DeviceUnavailable)?;
            }
            Err(status) => return Err(ScopeError::DeviceUnavailable(status)),
        }
        log::debug!("opened unit at {resolution}");

        let mut scope = Self { driver, max_adc: 0 };
        scope.max_adc = scope
            .driver
            .maximum_adc_value()
            .map_err(ScopeError::Driver)?;
        Ok(scope)
    }

    pub fn max_adc(&self) -> i16 {
        self.max_adc
    }

    /// Apply channel, trigger and timebase settings for a capture.
    pub fn configure(&mut self, config: &CaptureConfig) -> Result<ResolvedTimebase, ScopeError> {
        self.set_single_channel(
            config.channel,
            config.coupling,
            config.range,
            config.offset_volts as f32,
        )?;

        let trigger = &config.trigger;
        if trigger.enabled {
            let threshold = millivolts_to_adc(trigger.level_mv, config.range, self.max_adc);
            self.driver
                .set_simple_trigger(
                    true,
                    trigger.source,
                    threshold,
                    trigger.direction,
                    trigger.delay_samples,
                    trigger.auto_trigger_ms as i16,
                )
                .map_err(ScopeError::ConfigurationRejected)?;
            log::debug!(
                "trigger armed on channel {} at {} mV ({} ADC counts), {}",
                trigger.source,
                trigger.level_mv,
                threshold,
                trigger.direction
            );
        } else {
            self.driver
                .set_simple_trigger(false, config.channel, 0, TriggerDirection::Rising, 0, 0)
                .map_err(ScopeError::ConfigurationRejected)?;
            log::debug!("trigger disabled; capture starts immediately");
        }

        self.resolve_timebase(config.timebase, config.samples)
    }

    /// Enable one channel and disable the rest to maximize the shared
    /// sample rate. Variants with fewer channels report `INVALID_CHANNEL`
    /// for the missing ones; those are skipped.
    pub fn set_single_channel(
        &mut self,
        channel: Channel,
        coupling: Coupling,
        range: VoltageRange,
        offset_volts: f32,
    ) -> Result<(), ScopeError> {
        self.driver
            .set_channel(channel, true, coupling, range, offset_volts)
            .map_err(ScopeError::ConfigurationRejected)?;

        for other in Channel::ALL {
            if other == channel {
                continue;
            }
            match self.driver.set_channel(other, false, coupling, range, 0.0) {
                Ok(()) | Err(PicoStatus::InvalidChannel) => {}
                Err(status) => return Err(ScopeError::ConfigurationRejected(status)),
            }
        }
        Ok(())
    }

    /// Scan upward from the requested timebase until the driver accepts one.
    fn resolve_timebase(
        &mut self,
        requested: u32,
        samples: u32,
    ) -> Result<ResolvedTimebase, ScopeError> {
        let mut timebase = requested;
        loop {
            match self.driver.timebase_info(timebase, samples) {
                Ok(info) => {
                    if timebase != requested {
                        log::warn!(
                            "timebase {requested} not valid for {samples} samples; using {timebase}"
                        );
                    }
                    return Ok(ResolvedTimebase {
                        timebase,
                        interval_ns: f64::from(info.interval_ns),
                        driver_max_samples: info.max_samples,
                    });
                }
                Err(PicoStatus::InvalidTimebase) if timebase - requested < TIMEBASE_SCAN_LIMIT => {
                    timebase += 1;
                }
                Err(status) => return Err(ScopeError::ConfigurationRejected(status)),
            }
        }
    }

    /// Arm the device, wait for the trigger, read the block back.
    ///
    /// The wait is bounded by `trigger.wait_timeout_ms`; on expiry the
    /// device is disarmed and [`ScopeError::CaptureTimeout`] is returned.
    pub fn capture_block(
        &mut self,
        config: &CaptureConfig,
        resolved: &ResolvedTimebase,
    ) -> Result<CaptureResult, ScopeError> {
        let pre = (f64::from(config.samples) * config.pre_trigger_ratio) as u32;
        let post = config.samples - pre;
        self.driver
            .run_block(pre, post, resolved.timebase)
            .map_err(ScopeError::Driver)?;
        log::debug!("armed: {pre} pre-trigger + {post} post-trigger samples");

        let wait_budget = Duration::from_millis(config.trigger.wait_timeout_ms);
        let armed_at = Instant::now();
        loop {
            if self.driver.is_ready().map_err(ScopeError::Driver)? {
                break;
            }
            if armed_at.elapsed() >= wait_budget {
                let _ = self.driver.stop();
                return Err(ScopeError::CaptureTimeout {
                    waited_ms: config.trigger.wait_timeout_ms,
                });
            }
            thread::sleep(READY_POLL_INTERVAL);
        }

        let block = self
            .driver
            .read_block(config.channel, config.samples)
            .map_err(ScopeError::Driver)?;
        self.driver.stop().map_err(ScopeError::Driver)?;

        let overflow = (block.overflow_mask >> config.channel.driver_code()) & 1 != 0;
        if overflow {
            log::warn!("input overflow on channel {}", config.channel);
        }
        let millivolts = block
            .samples
            .iter()
            .map(|&raw| adc_to_millivolts(raw, config.range, self.max_adc))
            .collect();
        Ok(CaptureResult {
            millivolts,
            interval_ns: resolved.interval_ns,
            pre_trigger_samples: pre,
            overflow,
        })
    }

    pub fn unit_info(&mut self, info: UnitInfo) -> Result<String, ScopeError> {
        self.driver.unit_info(info).map_err(ScopeError::Driver)
    }

    /// FlexRes modes the unit accepts. Leaves the unit back at 8 bit.
    pub fn supported_resolutions(&mut self) -> Result<Vec<DeviceResolution>, ScopeError> {
        let mut supported = Vec::new();
        for resolution in DeviceResolution::ALL {
            if self.driver.set_resolution(resolution).is_ok() {
                supported.push(resolution);
            }
        }
        self.driver
            .set_resolution(DeviceResolution::Bits8)
            .map_err(ScopeError::Driver)?;
        Ok(supported)
    }

    /// Input ranges the unit reports analogue offset limits for.
    pub fn supported_ranges(&mut self) -> Result<Vec<VoltageRange>, ScopeError> {
        let mut supported = Vec::new();
        for range in VoltageRange::ALL {
            if self
                .driver
                .analogue_offset_limits(range, Coupling::Dc)
                .is_ok()
            {
                supported.push(range);
            }
        }
        Ok(supported)
    }

    /// Minimum sampling interval for the current channel setup, found by
    /// scanning timebase indices from zero. `None` when the scan exhausts
    /// its attempts without the driver accepting an index.
    pub fn fastest_interval(&mut self, samples: u32) -> Result<Option<(f64, u32)>, ScopeError> {
        for timebase in 0..TIMEBASE_SCAN_LIMIT {
            match self.driver.timebase_info(timebase, samples) {
                Ok(info) => return Ok(Some((f64::from(info.interval_ns), timebase))),
                Err(PicoStatus::InvalidTimebase) => {}
                Err(status) => return Err(ScopeError::Driver(status)),
            }
        }
        Ok(None)
    }

    /// Deep memory available to a single segment for the current setup.
    pub fn max_samples_per_segment(&mut self) -> Result<u32, ScopeError> {
        self.driver
            .max_samples_per_segment()
            .map_err(ScopeError::Driver)
    }
}

impl<D: ScopeDriver> Drop for PicoScope<D> {
    fn drop(&mut self) {
        let _ = self.driver.stop();
        if let Err(status) = self.driver.close() {
            log::warn!("failed to release oscilloscope unit: {status}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pico_driver::mock::{MockDriver, MockState};

    const MINIMAL_YAML: &str = "
channel: a
coupling: dc
range: 5v
timebase: 8
samples: 64
";

    fn test_config() -> CaptureConfig {
        serde_yaml::from_str(MINIMAL_YAML).unwrap()
    }

    #[test]
    fn test_open_failure_is_device_unavailable() {
        let state = MockState::shared();
        state.borrow_mut().open_status = PicoStatus::NotFound;
        let result = PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8);
        assert!(matches!(result, Err(ScopeError::DeviceUnavailable(PicoStatus::NotFound))));
        // nothing to release; the unit was never claimed
        assert_eq!(state.borrow().close_calls, 0);
    }

    #[test]
    fn test_open_answers_power_source_prompt() {
        let state = MockState::shared();
        state.borrow_mut().power_prompt = Some(PicoStatus::PowerSupplyNotConnected);
        let scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        assert_eq!(state.borrow().power_source_changes, 1);
        drop(scope);
        assert_eq!(state.borrow().close_calls, 1);
    }

    #[test]
    fn test_drop_releases_the_unit() {
        let state = MockState::shared();
        let scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        assert!(state.borrow().is_open);
        drop(scope);
        let observed = state.borrow();
        assert!(!observed.is_open);
        assert_eq!(observed.close_calls, 1);
    }

    #[test]
    fn test_configure_bumps_invalid_timebase() {
        let state = MockState::shared();
        state.borrow_mut().min_valid_timebase = 12;
        let mut scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        let resolved = scope.configure(&test_config()).unwrap();
        assert_eq!(resolved.timebase, 12);
        assert_eq!(resolved.interval_ns, 8.0);
    }

    #[test]
    fn test_configure_gives_up_when_no_timebase_fits() {
        let state = MockState::shared();
        state.borrow_mut().min_valid_timebase = 100_000;
        let mut scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        let result = scope.configure(&test_config());
        assert!(matches!(
            result,
            Err(ScopeError::ConfigurationRejected(PicoStatus::InvalidTimebase))
        ));
    }

    #[test]
    fn test_configure_rejected_channel_setup() {
        let state = MockState::shared();
        state.borrow_mut().reject_primary_channel = true;
        let mut scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        assert!(matches!(
            scope.configure(&test_config()),
            Err(ScopeError::ConfigurationRejected(_))
        ));
    }

    #[test]
    fn test_configure_ignores_missing_channels() {
        let state = MockState::shared();
        state.borrow_mut().missing_channels = vec![Channel::C, Channel::D];
        let mut scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        scope.configure(&test_config()).unwrap();
        assert_eq!(state.borrow().enabled_channels, vec![Channel::A]);
    }

    #[test]
    fn test_configure_programs_trigger_threshold_in_adc_counts() {
        let state = MockState::shared();
        let mut scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        let mut config = test_config();
        config.trigger.enabled = true;
        config.trigger.level_mv = 2_500.0;
        scope.configure(&config).unwrap();
        let (enabled, source, threshold, direction, delay, auto_ms) =
            state.borrow().last_trigger.unwrap();
        assert!(enabled);
        assert_eq!(source, Channel::A);
        assert_eq!(threshold, 16_256); // 2.5 V of a 5 V range at max ADC 32512
        assert_eq!(direction, TriggerDirection::Rising);
        assert_eq!(delay, 0);
        assert_eq!(auto_ms, 0);
    }

    #[test]
    fn test_capture_block_splits_pre_and_post_samples() {
        let state = MockState::shared();
        let mut scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        let mut config = test_config();
        config.pre_trigger_ratio = 0.25;
        let resolved = scope.configure(&config).unwrap();
        let result = scope.capture_block(&config, &resolved).unwrap();
        assert_eq!(state.borrow().last_run_block, Some((16, 48, 8)));
        assert_eq!(result.sample_count(), 64);
        assert_eq!(result.pre_trigger_samples, 16);
        assert!(!result.overflow);
    }

    #[test]
    fn test_capture_block_times_out_and_disarms() {
        let state = MockState::shared();
        state.borrow_mut().never_ready = true;
        let mut scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        let mut config = test_config();
        config.trigger.wait_timeout_ms = 20;
        let resolved = scope.configure(&config).unwrap();
        let result = scope.capture_block(&config, &resolved);
        assert!(matches!(
            result,
            Err(ScopeError::CaptureTimeout { waited_ms: 20 })
        ));
        assert!(state.borrow().stop_calls >= 1);
        drop(scope);
        assert_eq!(state.borrow().close_calls, 1);
    }

    #[test]
    fn test_capture_block_flags_overflow() {
        let state = MockState::shared();
        state.borrow_mut().overflow_mask = 0b0001; // channel A
        let mut scope =
            PicoScope::open(MockDriver::new(state.clone()), DeviceResolution::Bits8).unwrap();
        let config = test_config();
        let resolved = scope.configure(&config).unwrap();
        let result = scope.capture_block(&config, &resolved).unwrap();
        assert!(result.overflow);
    }

    #[test]
    fn test_adc_conversions_round_trip_at_full_scale() {
        let max_adc = 32_512;
        assert_eq!(
            millivolts_to_adc(5_000.0, VoltageRange::V5, max_adc),
            max_adc
        );
        assert_eq!(
            millivolts_to_adc(-5_000.0, VoltageRange::V5, max_adc),
            -max_adc
        );
        // beyond full scale clamps instead of wrapping
        assert_eq!(
            millivolts_to_adc(9_999.0, VoltageRange::V5, max_adc),
            max_adc
        );
        assert_eq!(
            adc_to_millivolts(max_adc, VoltageRange::V5, max_adc),
            5_000.0
        );
        assert_eq!(adc_to_millivolts(0, VoltageRange::V5, max_adc), 0.0);
    }

    #[test]
    fn test_dataframe_time_axis_is_zeroed_at_the_trigger() {
        let result = CaptureResult {
            millivolts: vec![1.0, 2.0, 3.0, 4.0],
            interval_ns: 8.0,
            pre_trigger_samples: 2,
            overflow: false,
        };
        let df = result.to_dataframe().unwrap();
        assert_eq!(df.height(), 4);
        let names: Vec<&str> = df.get_column_names().iter().map(|name| name.as_str()).collect();
        assert_eq!(names, vec![TIME_COLUMN_NAME, MILLIVOLTS_COLUMN_NAME]);
        let time = df.column(TIME_COLUMN_NAME).unwrap().f64().unwrap();
        assert_eq!(time.get(0), Some(-16.0));
        assert_eq!(time.get(2), Some(0.0));
        assert_eq!(time.get(3), Some(8.0));
    }
}
