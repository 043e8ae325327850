//! Seam between the capture logic and the vendor `ps5000a` driver.
//!
//! [`ScopeDriver`] mirrors the handful of driver entry points the capture and
//! self-test paths use. The `picosdk` feature provides [`SdkDriver`], backed
//! by the vendor shared library; without it, [`UnavailableDriver`] reports
//! every unit as absent so the binaries still run (and fail cleanly) on
//! machines without the SDK.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::trigger_config::TriggerDirection;

/// Status code returned by every `ps5000a` driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicoStatus {
    Ok,
    MaxUnitsOpened,
    MemoryFail,
    NotFound,
    FwFail,
    OpenOperationInProgress,
    OperationFailed,
    NotResponding,
    ConfigFail,
    InvalidHandle,
    InvalidParameter,
    InvalidTimebase,
    InvalidVoltageRange,
    InvalidChannel,
    InvalidTriggerChannel,
    Busy,
    PowerSupplyConnected,
    PowerSupplyNotConnected,
    Usb3DeviceNonUsb3Port,
    Other(u32),
}

impl PicoStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            0x0000 => PicoStatus::Ok,
            0x0001 => PicoStatus::MaxUnitsOpened,
            0x0002 => PicoStatus::MemoryFail,
            0x0003 => PicoStatus::NotFound,
            0x0004 => PicoStatus::FwFail,
            0x0005 => PicoStatus::OpenOperationInProgress,
            0x0006 => PicoStatus::OperationFailed,
            0x0007 => PicoStatus::NotResponding,
            0x0008 => PicoStatus::ConfigFail,
            0x000C => PicoStatus::InvalidHandle,
            0x000D => PicoStatus::InvalidParameter,
            0x000E => PicoStatus::InvalidTimebase,
            0x000F => PicoStatus::InvalidVoltageRange,
            0x0010 => PicoStatus::InvalidChannel,
            0x0011 => PicoStatus::InvalidTriggerChannel,
            0x0027 => PicoStatus::Busy,
            0x0119 => PicoStatus::PowerSupplyConnected,
            0x011A => PicoStatus::PowerSupplyNotConnected,
            0x011E => PicoStatus::Usb3DeviceNonUsb3Port,
            other => PicoStatus::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            PicoStatus::Ok => 0x0000,
            PicoStatus::MaxUnitsOpened => 0x0001,
            PicoStatus::MemoryFail => 0x0002,
            PicoStatus::NotFound => 0x0003,
            PicoStatus::FwFail => 0x0004,
            PicoStatus::OpenOperationInProgress => 0x0005,
            PicoStatus::OperationFailed => 0x0006,
            PicoStatus::NotResponding => 0x0007,
            PicoStatus::ConfigFail => 0x0008,
            PicoStatus::InvalidHandle => 0x000C,
            PicoStatus::InvalidParameter => 0x000D,
            PicoStatus::InvalidTimebase => 0x000E,
            PicoStatus::InvalidVoltageRange => 0x000F,
            PicoStatus::InvalidChannel => 0x0010,
            PicoStatus::InvalidTriggerChannel => 0x0011,
            PicoStatus::Busy => 0x0027,
            PicoStatus::PowerSupplyConnected => 0x0119,
            PicoStatus::PowerSupplyNotConnected => 0x011A,
            PicoStatus::Usb3DeviceNonUsb3Port => 0x011E,
            PicoStatus::Other(code) => code,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PicoStatus::Ok => "PICO_OK",
            PicoStatus::MaxUnitsOpened => "PICO_MAX_UNITS_OPENED",
            PicoStatus::MemoryFail => "PICO_MEMORY_FAIL",
            PicoStatus::NotFound => "PICO_NOT_FOUND",
            PicoStatus::FwFail => "PICO_FW_FAIL",
            PicoStatus::OpenOperationInProgress => "PICO_OPEN_OPERATION_IN_PROGRESS",
            PicoStatus::OperationFailed => "PICO_OPERATION_FAILED",
            PicoStatus::NotResponding => "PICO_NOT_RESPONDING",
            PicoStatus::ConfigFail => "PICO_CONFIG_FAIL",
            PicoStatus::InvalidHandle => "PICO_INVALID_HANDLE",
            PicoStatus::InvalidParameter => "PICO_INVALID_PARAMETER",
            PicoStatus::InvalidTimebase => "PICO_INVALID_TIMEBASE",
            PicoStatus::InvalidVoltageRange => "PICO_INVALID_VOLTAGE_RANGE",
            PicoStatus::InvalidChannel => "PICO_INVALID_CHANNEL",
            PicoStatus::InvalidTriggerChannel => "PICO_INVALID_TRIGGER_CHANNEL",
            PicoStatus::Busy => "PICO_BUSY",
            PicoStatus::PowerSupplyConnected => "PICO_POWER_SUPPLY_CONNECTED",
            PicoStatus::PowerSupplyNotConnected => "PICO_POWER_SUPPLY_NOT_CONNECTED",
            PicoStatus::Usb3DeviceNonUsb3Port => "PICO_USB3_0_DEVICE_NON_USB3_0_PORT",
            PicoStatus::Other(_) => "(unknown status)",
        }
    }

    pub fn is_ok(self) -> bool {
        self == PicoStatus::Ok
    }

    /// Statuses `OpenUnit` uses to ask about the power source; answered with
    /// `ChangePowerSource` rather than treated as failures.
    pub fn is_power_source_prompt(self) -> bool {
        matches!(
            self,
            PicoStatus::PowerSupplyConnected
                | PicoStatus::PowerSupplyNotConnected
                | PicoStatus::Usb3DeviceNonUsb3Port
        )
    }
}

impl fmt::Display for PicoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.code())
    }
}

pub type DriverResult<T> = Result<T, PicoStatus>;

/// Analogue input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    A,
    B,
    C,
    D,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    /// `PS5000A_CHANNEL` value understood by the driver.
    pub fn driver_code(self) -> u32 {
        match self {
            Channel::A => 0,
            Channel::B => 1,
            Channel::C => 2,
            Channel::D => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::A => "A",
            Channel::B => "B",
            Channel::C => "C",
            Channel::D => "D",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" => Ok(Channel::A),
            "b" => Ok(Channel::B),
            "c" => Ok(Channel::C),
            "d" => Ok(Channel::D),
            _ => Err(format!("unknown channel '{s}' (expected a, b, c or d)")),
        }
    }
}

/// Input coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coupling {
    Ac,
    Dc,
}

impl Coupling {
    /// `PS5000A_COUPLING` value understood by the driver.
    pub fn driver_code(self) -> u32 {
        match self {
            Coupling::Ac => 0,
            Coupling::Dc => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Coupling::Ac => "ac",
            Coupling::Dc => "dc",
        }
    }
}

impl fmt::Display for Coupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Coupling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ac" => Ok(Coupling::Ac),
            "dc" => Ok(Coupling::Dc),
            _ => Err(format!("unknown coupling '{s}' (expected ac or dc)")),
        }
    }
}

/// Full-scale input range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum VoltageRange {
    #[serde(rename = "10mv")]
    Mv10,
    #[serde(rename = "20mv")]
    Mv20,
    #[serde(rename = "50mv")]
    Mv50,
    #[serde(rename = "100mv")]
    Mv100,
    #[serde(rename = "200mv")]
    Mv200,
    #[serde(rename = "500mv")]
    Mv500,
    #[serde(rename = "1v")]
    V1,
    #[serde(rename = "2v")]
    V2,
    #[serde(rename = "5v")]
    V5,
    #[serde(rename = "10v")]
    V10,
    #[serde(rename = "20v")]
    V20,
    #[serde(rename = "50v")]
    V50,
}

impl VoltageRange {
    pub const ALL: [VoltageRange; 12] = [
        VoltageRange::Mv10,
        VoltageRange::Mv20,
        VoltageRange::Mv50,
        VoltageRange::Mv100,
        VoltageRange::Mv200,
        VoltageRange::Mv500,
        VoltageRange::V1,
        VoltageRange::V2,
        VoltageRange::V5,
        VoltageRange::V10,
        VoltageRange::V20,
        VoltageRange::V50,
    ];

    /// `PS5000A_RANGE` value understood by the driver.
    pub fn driver_code(self) -> u32 {
        match self {
            VoltageRange::Mv10 => 0,
            VoltageRange::Mv20 => 1,
            VoltageRange::Mv50 => 2,
            VoltageRange::Mv100 => 3,
            VoltageRange::Mv200 => 4,
            VoltageRange::Mv500 => 5,
            VoltageRange::V1 => 6,
            VoltageRange::V2 => 7,
            VoltageRange::V5 => 8,
            VoltageRange::V10 => 9,
            VoltageRange::V20 => 10,
            VoltageRange::V50 => 11,
        }
    }

    /// Full-scale value in millivolts.
    pub fn millivolts(self) -> u32 {
        match self {
            VoltageRange::Mv10 => 10,
            VoltageRange::Mv20 => 20,
            VoltageRange::Mv50 => 50,
            VoltageRange::Mv100 => 100,
            VoltageRange::Mv200 => 200,
            VoltageRange::Mv500 => 500,
            VoltageRange::V1 => 1_000,
            VoltageRange::V2 => 2_000,
            VoltageRange::V5 => 5_000,
            VoltageRange::V10 => 10_000,
            VoltageRange::V20 => 20_000,
            VoltageRange::V50 => 50_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VoltageRange::Mv10 => "10mv",
            VoltageRange::Mv20 => "20mv",
            VoltageRange::Mv50 => "50mv",
            VoltageRange::Mv100 => "100mv",
            VoltageRange::Mv200 => "200mv",
            VoltageRange::Mv500 => "500mv",
            VoltageRange::V1 => "1v",
            VoltageRange::V2 => "2v",
            VoltageRange::V5 => "5v",
            VoltageRange::V10 => "10v",
            VoltageRange::V20 => "20v",
            VoltageRange::V50 => "50v",
        }
    }
}

impl fmt::Display for VoltageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoltageRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        VoltageRange::ALL
            .into_iter()
            .find(|range| range.as_str() == lower)
            .ok_or_else(|| format!("unknown voltage range '{s}' (expected 10mv .. 50v)"))
    }
}

/// FlexRes ADC resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DeviceResolution {
    #[serde(rename = "8bit")]
    Bits8,
    #[serde(rename = "12bit")]
    Bits12,
    #[serde(rename = "14bit")]
    Bits14,
    #[serde(rename = "15bit")]
    Bits15,
    #[serde(rename = "16bit")]
    Bits16,
}

impl DeviceResolution {
    pub const ALL: [DeviceResolution; 5] = [
        DeviceResolution::Bits8,
        DeviceResolution::Bits12,
        DeviceResolution::Bits14,
        DeviceResolution::Bits15,
        DeviceResolution::Bits16,
    ];

    /// `PS5000A_DEVICE_RESOLUTION` value understood by the driver.
    pub fn driver_code(self) -> u32 {
        match self {
            DeviceResolution::Bits8 => 0,
            DeviceResolution::Bits12 => 1,
            DeviceResolution::Bits14 => 2,
            DeviceResolution::Bits15 => 3,
            DeviceResolution::Bits16 => 4,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            DeviceResolution::Bits8 => 8,
            DeviceResolution::Bits12 => 12,
            DeviceResolution::Bits14 => 14,
            DeviceResolution::Bits15 => 15,
            DeviceResolution::Bits16 => 16,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceResolution::Bits8 => "8bit",
            DeviceResolution::Bits12 => "12bit",
            DeviceResolution::Bits14 => "14bit",
            DeviceResolution::Bits15 => "15bit",
            DeviceResolution::Bits16 => "16bit",
        }
    }
}

impl fmt::Display for DeviceResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        DeviceResolution::ALL
            .into_iter()
            .find(|resolution| resolution.as_str() == lower)
            .ok_or_else(|| {
                format!("unknown resolution '{s}' (expected 8bit, 12bit, 14bit, 15bit or 16bit)")
            })
    }
}

/// Identity string selector for `GetUnitInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitInfo {
    DriverVersion,
    UsbVersion,
    Variant,
    BatchAndSerial,
    CalDate,
    FirmwareVersion1,
    FirmwareVersion2,
}

impl UnitInfo {
    /// `PICO_INFO` value understood by the driver.
    pub fn driver_code(self) -> u32 {
        match self {
            UnitInfo::DriverVersion => 0,
            UnitInfo::UsbVersion => 1,
            UnitInfo::Variant => 3,
            UnitInfo::BatchAndSerial => 4,
            UnitInfo::CalDate => 5,
            UnitInfo::FirmwareVersion1 => 9,
            UnitInfo::FirmwareVersion2 => 10,
        }
    }
}

/// Sample interval and capacity the device grants for a timebase index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimebaseInfo {
    pub interval_ns: f32,
    pub max_samples: u32,
}

/// Raw ADC counts read back after a block capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub samples: Vec<i16>,
    /// One bit per channel; a set bit means the input clipped.
    pub overflow_mask: i16,
}

/// The `ps5000a` entry points the capture and self-test paths use.
///
/// An implementation owns at most one unit: `open` claims it and `close`
/// releases it. Every other call requires an open unit.
pub trait ScopeDriver {
    fn open(&mut self, resolution: DeviceResolution) -> DriverResult<()>;
    fn change_power_source(&mut self, prompt: PicoStatus) -> DriverResult<()>;
    fn close(&mut self) -> DriverResult<()>;

    fn set_channel(
        &mut self,
        channel: Channel,
        enabled: bool,
        coupling: Coupling,
        range: VoltageRange,
        offset_volts: f32,
    ) -> DriverResult<()>;
    fn set_simple_trigger(
        &mut self,
        enabled: bool,
        source: Channel,
        threshold_adc: i16,
        direction: TriggerDirection,
        delay_samples: u32,
        auto_trigger_ms: i16,
    ) -> DriverResult<()>;
    fn maximum_adc_value(&mut self) -> DriverResult<i16>;
    fn timebase_info(&mut self, timebase: u32, samples: u32) -> DriverResult<TimebaseInfo>;

    fn run_block(
        &mut self,
        pre_trigger_samples: u32,
        post_trigger_samples: u32,
        timebase: u32,
    ) -> DriverResult<()>;
    fn is_ready(&mut self) -> DriverResult<bool>;
    fn read_block(&mut self, channel: Channel, samples: u32) -> DriverResult<RawBlock>;
    fn stop(&mut self) -> DriverResult<()>;

    fn unit_info(&mut self, info: UnitInfo) -> DriverResult<String>;
    fn set_resolution(&mut self, resolution: DeviceResolution) -> DriverResult<()>;
    fn analogue_offset_limits(
        &mut self,
        range: VoltageRange,
        coupling: Coupling,
    ) -> DriverResult<(f32, f32)>;
    fn max_samples_per_segment(&mut self) -> DriverResult<u32>;
}

/// Stand-in driver used when the crate is built without the `picosdk`
/// feature. Open attempts report the unit as absent; everything else
/// reports an invalid handle.
#[derive(Debug, Default)]
pub struct UnavailableDriver;

impl UnavailableDriver {
    pub fn new() -> Self {
        Self
    }
}

impl ScopeDriver for UnavailableDriver {
    fn open(&mut self, _resolution: DeviceResolution) -> DriverResult<()> {
        log::warn!("built without the picosdk feature; no unit can be opened");
        Err(PicoStatus::NotFound)
    }

    fn change_power_source(&mut self, _prompt: PicoStatus) -> DriverResult<()> {
        Err(PicoStatus::InvalidHandle)
    }

    fn close(&mut self) -> DriverResult<()> {
        Err(PicoStatus::InvalidHandle)
    }

    fn set_channel(
        &mut self,
        _channel: Channel,
        _enabled: bool,
        _coupling: Coupling,
        _range: VoltageRange,
        _offset_volts: f32,
    ) -> DriverResult<()> {
        Err(PicoStatus::InvalidHandle)
    }

    fn set_simple_trigger(
        &mut self,
        _enabled: bool,
        _source: Channel,
        _threshold_adc: i16,
        _direction: TriggerDirection,
        _delay_samples: u32,
        _auto_trigger_ms: i16,
    ) -> DriverResult<()> {
        Err(PicoStatus::InvalidHandle)
    }

    fn maximum_adc_value(&mut self) -> DriverResult<i16> {
        Err(PicoStatus::InvalidHandle)
    }

    fn timebase_info(&mut self, _timebase: u32, _samples: u32) -> DriverResult<TimebaseInfo> {
        Err(PicoStatus::InvalidHandle)
    }

    fn run_block(
        &mut self,
        _pre_trigger_samples: u32,
        _post_trigger_samples: u32,
        _timebase: u32,
    ) -> DriverResult<()> {
        Err(PicoStatus::InvalidHandle)
    }

    fn is_ready(&mut self) -> DriverResult<bool> {
        Err(PicoStatus::InvalidHandle)
    }

    fn read_block(&mut self, _channel: Channel, _samples: u32) -> DriverResult<RawBlock> {
        Err(PicoStatus::InvalidHandle)
    }

    fn stop(&mut self) -> DriverResult<()> {
        Err(PicoStatus::InvalidHandle)
    }

    fn unit_info(&mut self, _info: UnitInfo) -> DriverResult<String> {
        Err(PicoStatus::InvalidHandle)
    }

    fn set_resolution(&mut self, _resolution: DeviceResolution) -> DriverResult<()> {
        Err(PicoStatus::InvalidHandle)
    }

    fn analogue_offset_limits(
        &mut self,
        _range: VoltageRange,
        _coupling: Coupling,
    ) -> DriverResult<(f32, f32)> {
        Err(PicoStatus::InvalidHandle)
    }

    fn max_samples_per_segment(&mut self) -> DriverResult<u32> {
        Err(PicoStatus::InvalidHandle)
    }
}

#[cfg(feature = "picosdk")]
mod sdk {
    #![allow(unsafe_code)]

    use super::{
        Channel, Coupling, DeviceResolution, DriverResult, PicoStatus, RawBlock, ScopeDriver,
        TimebaseInfo, UnitInfo, VoltageRange,
    };
    use crate::trigger_config::TriggerDirection;
    use std::os::raw::{c_char, c_void};

    #[link(name = "ps5000a")]
    extern "C" {
        fn ps5000aOpenUnit(handle: *mut i16, serial: *const c_char, resolution: u32) -> u32;
        fn ps5000aChangePowerSource(handle: i16, power_state: u32) -> u32;
        fn ps5000aCloseUnit(handle: i16) -> u32;
        fn ps5000aSetChannel(
            handle: i16,
            channel: u32,
            enabled: i16,
            coupling: u32,
            range: u32,
            analogue_offset: f32,
        ) -> u32;
        fn ps5000aSetSimpleTrigger(
            handle: i16,
            enable: i16,
            source: u32,
            threshold: i16,
            direction: u32,
            delay: u32,
            auto_trigger_ms: i16,
        ) -> u32;
        fn ps5000aMaximumValue(handle: i16, value: *mut i16) -> u32;
        fn ps5000aGetTimebase2(
            handle: i16,
            timebase: u32,
            no_samples: i32,
            time_interval_ns: *mut f32,
            max_samples: *mut i32,
            segment_index: u32,
        ) -> u32;
        fn ps5000aRunBlock(
            handle: i16,
            no_of_pre_trigger_samples: i32,
            no_of_post_trigger_samples: i32,
            timebase: u32,
            time_indisposed_ms: *mut i32,
            segment_index: u32,
            ready: *mut c_void,
            parameter: *mut c_void,
        ) -> u32;
        fn ps5000aIsReady(handle: i16, ready: *mut i16) -> u32;
        fn ps5000aSetDataBuffers(
            handle: i16,
            channel: u32,
            buffer_max: *mut i16,
            buffer_min: *mut i16,
            buffer_length: i32,
            segment_index: u32,
            mode: u32,
        ) -> u32;
        fn ps5000aGetValues(
            handle: i16,
            start_index: u32,
            no_of_samples: *mut u32,
            downsample_ratio: u32,
            downsample_ratio_mode: u32,
            segment_index: u32,
            overflow: *mut i16,
        ) -> u32;
        fn ps5000aStop(handle: i16) -> u32;
        fn ps5000aGetUnitInfo(
            handle: i16,
            string: *mut c_char,
            string_length: i16,
            required_size: *mut i16,
            info: u32,
        ) -> u32;
        fn ps5000aSetDeviceResolution(handle: i16, resolution: u32) -> u32;
        fn ps5000aGetAnalogueOffset(
            handle: i16,
            range: u32,
            coupling: u32,
            maximum_voltage: *mut f32,
            minimum_voltage: *mut f32,
        ) -> u32;
        fn ps5000aMemorySegments(handle: i16, n_segments: u32, n_max_samples: *mut i32) -> u32;
    }

    fn check(code: u32) -> DriverResult<()> {
        match PicoStatus::from_code(code) {
            PicoStatus::Ok => Ok(()),
            status => Err(status),
        }
    }

    /// Driver backed by the vendor `ps5000a` shared library.
    #[derive(Debug, Default)]
    pub struct SdkDriver {
        handle: i16,
    }

    impl SdkDriver {
        pub fn new() -> Self {
            Self { handle: 0 }
        }
    }

    impl ScopeDriver for SdkDriver {
        fn open(&mut self, resolution: DeviceResolution) -> DriverResult<()> {
            let mut handle = 0i16;
            let code = unsafe {
                ps5000aOpenUnit(&mut handle, std::ptr::null(), resolution.driver_code())
            };
            // The handle is live even when OpenUnit answers with a power
            // source prompt; keep it so ChangePowerSource can be called.
            self.handle = handle;
            check(code)
        }

        fn change_power_source(&mut self, prompt: PicoStatus) -> DriverResult<()> {
            check(unsafe { ps5000aChangePowerSource(self.handle, prompt.code()) })
        }

        fn close(&mut self) -> DriverResult<()> {
            let result = check(unsafe { ps5000aCloseUnit(self.handle) });
            self.handle = 0;
            result
        }

        fn set_channel(
            &mut self,
            channel: Channel,
            enabled: bool,
            coupling: Coupling,
            range: VoltageRange,
            offset_volts: f32,
        ) -> DriverResult<()> {
            check(unsafe {
                ps5000aSetChannel(
                    self.handle,
                    channel.driver_code(),
                    i16::from(enabled),
                    coupling.driver_code(),
                    range.driver_code(),
                    offset_volts,
                )
            })
        }

        fn set_simple_trigger(
            &mut self,
            enabled: bool,
            source: Channel,
            threshold_adc: i16,
            direction: TriggerDirection,
            delay_samples: u32,
            auto_trigger_ms: i16,
        ) -> DriverResult<()> {
            check(unsafe {
                ps5000aSetSimpleTrigger(
                    self.handle,
                    i16::from(enabled),
                    source.driver_code(),
                    threshold_adc,
                    direction.driver_code(),
                    delay_samples,
                    auto_trigger_ms,
                )
            })
        }

        fn maximum_adc_value(&mut self) -> DriverResult<i16> {
            let mut value = 0i16;
            check(unsafe { ps5000aMaximumValue(self.handle, &mut value) })?;
            Ok(value)
        }

        fn timebase_info(&mut self, timebase: u32, samples: u32) -> DriverResult<TimebaseInfo> {
            let mut interval_ns = 0f32;
            let mut max_samples = 0i32;
            check(unsafe {
                ps5000aGetTimebase2(
                    self.handle,
                    timebase,
                    samples as i32,
                    &mut interval_ns,
                    &mut max_samples,
                    0,
                )
            })?;
            Ok(TimebaseInfo {
                interval_ns,
                max_samples: max_samples.max(0) as u32,
            })
        }

        fn run_block(
            &mut self,
            pre_trigger_samples: u32,
            post_trigger_samples: u32,
            timebase: u32,
        ) -> DriverResult<()> {
            check(unsafe {
                ps5000aRunBlock(
                    self.handle,
                    pre_trigger_samples as i32,
                    post_trigger_samples as i32,
                    timebase,
                    std::ptr::null_mut(),
                    0,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            })
        }

        fn is_ready(&mut self) -> DriverResult<bool> {
            let mut ready = 0i16;
            check(unsafe { ps5000aIsReady(self.handle, &mut ready) })?;
            Ok(ready != 0)
        }

        fn read_block(&mut self, channel: Channel, samples: u32) -> DriverResult<RawBlock> {
            let mut buffer = vec![0i16; samples as usize];
            check(unsafe {
                ps5000aSetDataBuffers(
                    self.handle,
                    channel.driver_code(),
                    buffer.as_mut_ptr(),
                    std::ptr::null_mut(),
                    samples as i32,
                    0,
                    0,
                )
            })?;
            let mut returned = samples;
            let mut overflow_mask = 0i16;
            check(unsafe {
                ps5000aGetValues(self.handle, 0, &mut returned, 0, 0, 0, &mut overflow_mask)
            })?;
            buffer.truncate(returned as usize);
            Ok(RawBlock {
                samples: buffer,
                overflow_mask,
            })
        }

        fn stop(&mut self) -> DriverResult<()> {
            check(unsafe { ps5000aStop(self.handle) })
        }

        fn unit_info(&mut self, info: UnitInfo) -> DriverResult<String> {
            let mut buffer = [0 as c_char; 256];
            let mut required = 0i16;
            check(unsafe {
                ps5000aGetUnitInfo(
                    self.handle,
                    buffer.as_mut_ptr(),
                    buffer.len() as i16,
                    &mut required,
                    info.driver_code(),
                )
            })?;
            let bytes: Vec<u8> = buffer
                .iter()
                .take_while(|&&byte| byte != 0)
                .map(|&byte| byte as u8)
                .collect();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }

        fn set_resolution(&mut self, resolution: DeviceResolution) -> DriverResult<()> {
            check(unsafe { ps5000aSetDeviceResolution(self.handle, resolution.driver_code()) })
        }

        fn analogue_offset_limits(
            &mut self,
            range: VoltageRange,
            coupling: Coupling,
        ) -> DriverResult<(f32, f32)> {
            let mut maximum = 0f32;
            let mut minimum = 0f32;
            check(unsafe {
                ps5000aGetAnalogueOffset(
                    self.handle,
                    range.driver_code(),
                    coupling.driver_code(),
                    &mut maximum,
                    &mut minimum,
                )
            })?;
            Ok((maximum, minimum))
        }

        fn max_samples_per_segment(&mut self) -> DriverResult<u32> {
            let mut max_samples = 0i32;
            check(unsafe { ps5000aMemorySegments(self.handle, 1, &mut max_samples) })?;
            Ok(max_samples.max(0) as u32)
        }
    }
}

#[cfg(feature = "picosdk")]
pub use sdk::SdkDriver;

/// Driver the binaries use: SDK-backed when built with `picosdk`, otherwise
/// the stand-in that reports every unit as absent.
#[cfg(feature = "picosdk")]
pub fn default_driver() -> SdkDriver {
    SdkDriver::new()
}

#[cfg(not(feature = "picosdk"))]
pub fn default_driver() -> UnavailableDriver {
    UnavailableDriver::new()
}
