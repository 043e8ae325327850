//! # PicoScope RS
//!
//! Capture utilities for PicoScope 5000A series oscilloscopes.
//!
//! This crate drives a PS5000A-class unit through the vendor `ps5000a`
//! driver: it loads a YAML capture configuration (with command-line
//! overrides layered on top), claims the unit for exactly one block capture
//! at a time, and serializes the samples to CSV and/or Arrow IPC files.
//! A self-test path reports identity, capability and timing information
//! without capturing anything.
//!
//! ## Features
//!
//! - **Layered configuration**: built-in defaults, then the YAML file, then
//!   command-line flags; the resolved record is validated once and immutable
//! - **Closed capture transactions**: open, configure, trigger, read, write,
//!   close, with the unit released on every exit path
//! - **Multi-shot sequencing**: repeated captures with a rest interval,
//!   continuing past per-shot timeouts and aborting when the unit disappears
//! - **DataFrame output**: uses `polars` for the sample frame and its CSV
//!   and Arrow IPC writers
//! - **Vendor seam**: the `picosdk` feature links the vendor driver; without
//!   it every unit reports as unavailable, which keeps the binaries usable
//!   on machines without the SDK
//!
//! ## Examples
//!
//! ### Single capture
//!
//! ```rust,no_run
//! use picoscope_rs::{default_driver, single_shot, CaptureConfig, CaptureOverrides};
//! use std::path::Path;
//!
//! let config = CaptureConfig::load(Path::new("capture_config.yml"), &CaptureOverrides::default())?;
//! let summary = single_shot(default_driver(), &config)?;
//! println!("captured {} samples at {:.3} ns", summary.sample_count, summary.interval_ns);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Repeated captures
//!
//! ```rust,no_run
//! use picoscope_rs::{default_driver, multi_shot, CaptureConfig, CaptureOverrides};
//! use std::path::Path;
//!
//! let config = CaptureConfig::load(Path::new("capture_multi.yml"), &CaptureOverrides::default())?;
//! let report = multi_shot(default_driver, &config);
//! println!("completed {}/{} captures", report.completed, report.requested);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Configuration from YAML
//!
//! ```rust
//! use picoscope_rs::CaptureConfig;
//!
//! let config: CaptureConfig = serde_yaml::from_str(
//!     "
//! channel: a
//! coupling: dc
//! range: 5v
//! timebase: 8
//! samples: 1000
//! ",
//! )?;
//! assert_eq!(config.samples, 1000);
//! config.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capture;
pub mod capture_config;
pub mod pico_driver;
pub mod pico_scope;
pub mod trigger_config;

// Re-export the main types for convenience
pub use capture::{
    multi_shot, single_shot, write_outputs, CaptureError, MultiShotReport, OutputSink,
    ShotFailure, ShotSummary,
};

pub use capture_config::{CaptureConfig, CaptureOverrides, ConfigError, SaveFormat};

pub use pico_driver::{
    default_driver, Channel, Coupling, DeviceResolution, PicoStatus, ScopeDriver, UnavailableDriver,
    UnitInfo, VoltageRange,
};

#[cfg(feature = "picosdk")]
pub use pico_driver::SdkDriver;

pub use pico_scope::{
    adc_to_millivolts, millivolts_to_adc, CaptureResult, PicoScope, ResolvedTimebase, ScopeError,
};

pub use self_test::{run_self_test, SelfTestReport};

pub use trigger_config::{TriggerConfigError, TriggerDirection, TriggerSettings};
