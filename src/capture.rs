//! The capture procedures: path resolution, output serialization, the
//! single-shot transaction and the multi-shot repetition loop.

use chrono::{DateTime, Datelike, Local, Timelike};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::capture_config::CaptureConfig;
use crate::pico_driver::ScopeDriver;
use crate::pico_scope::{CaptureResult, PicoScope, ScopeError};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error("failed to assemble sample frame: {0}")]
    Frame(#[from] PolarsError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize samples to {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
}

impl CaptureError {
    /// Fatal errors abort a multi-shot sequence; everything else is
    /// reported and the sequence continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::Scope(scope) if scope.is_device_unavailable())
    }
}

/// Destination files for one capture, resolved before the device is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSink {
    pub csv: Option<PathBuf>,
    pub ipc: Option<PathBuf>,
}

impl OutputSink {
    /// Resolve the configured paths, stamping the file stem when enabled.
    /// Without timestamping the configured paths are used verbatim, so
    /// repeated captures overwrite the same files.
    pub fn resolve(config: &CaptureConfig, now: DateTime<Local>) -> Self {
        let stamp = config.timestamp_filenames.then(|| timestamp_stem(now));
        let render = |configured: &Path| match &stamp {
            Some(stem) => stamped_path(configured, stem),
            None => configured.to_path_buf(),
        };
        Self {
            csv: config.save_format.writes_csv().then(|| render(&config.csv_path)),
            ipc: config.save_format.writes_ipc().then(|| render(&config.ipc_path)),
        }
    }
}

/// `M{month}-D{day}-H{hour}-M{minute}-S{second}-U.{microseconds}` stem used
/// for timestamped output files.
fn timestamp_stem(now: DateTime<Local>) -> String {
    format!(
        "M{:02}-D{:02}-H{:02}-M{:02}-S{:02}-U.{:06}",
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.timestamp_subsec_micros()
    )
}

/// Replace the file name of `configured` with the stamp, keeping the
/// directory and extension.
fn stamped_path(configured: &Path, stem: &str) -> PathBuf {
    let mut name = stem.to_string();
    if let Some(extension) = configured.extension() {
        name.push('.');
        name.push_str(&extension.to_string_lossy());
    }
    configured.with_file_name(name)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Run `write` against a temporary sibling of `path` and rename it into
/// place, so a failed write never leaves a partial file behind.
fn persist<F>(path: &Path, write: F) -> Result<(), CaptureError>
where
    F: FnOnce(&mut File) -> Result<(), PolarsError>,
{
    let tmp = temp_sibling(path);
    let mut file = File::create(&tmp).map_err(|source| CaptureError::Write {
        path: tmp.clone(),
        source,
    })?;
    if let Err(source) = write(&mut file) {
        drop(file);
        let _ = fs::remove_file(&tmp);
        return Err(CaptureError::Serialize {
            path: path.to_path_buf(),
            source,
        });
    }
    drop(file);
    fs::rename(&tmp, path).map_err(|source| CaptureError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize one capture to the resolved sink.
pub fn write_outputs(result: &CaptureResult, sink: &OutputSink) -> Result<(), CaptureError> {
    let mut frame = result.to_dataframe()?;
    if let Some(path) = &sink.csv {
        persist(path, |file| {
            CsvWriter::new(file).include_header(true).finish(&mut frame)
        })?;
        log::info!("wrote {} samples to {}", result.sample_count(), path.display());
    }
    if let Some(path) = &sink.ipc {
        persist(path, |file| IpcWriter::new(file).finish(&mut frame))?;
        log::info!("wrote {} samples to {}", result.sample_count(), path.display());
    }
    Ok(())
}

/// Outcome of one completed single-shot capture.
#[derive(Debug, Clone)]
pub struct ShotSummary {
    pub sample_count: usize,
    pub interval_ns: f64,
    pub overflow: bool,
    pub sink: OutputSink,
}

/// Perform exactly one trigger-and-read cycle: resolve output paths, claim
/// the device, configure, arm, read, write, release.
///
/// The unit is released before the outputs are written; a failure anywhere
/// leaves no partial output file behind.
pub fn single_shot<D: ScopeDriver>(
    driver: D,
    config: &CaptureConfig,
) -> Result<ShotSummary, CaptureError> {
    let sink = OutputSink::resolve(config, Local::now());

    let mut scope = PicoScope::open(driver, config.resolution)?;
    let resolved = scope.configure(config)?;
    log::info!(
        "timebase {} at {:.3} ns/sample, driver max {} samples",
        resolved.timebase,
        resolved.interval_ns,
        resolved.driver_max_samples
    );
    let result = scope.capture_block(config, &resolved)?;
    // Release the unit before touching the filesystem.
    drop(scope);

    write_outputs(&result, &sink)?;
    Ok(ShotSummary {
        sample_count: result.sample_count(),
        interval_ns: result.interval_ns,
        overflow: result.overflow,
        sink,
    })
}

/// Per-shot failure kept for the final report.
#[derive(Debug)]
pub struct ShotFailure {
    /// Zero-based index of the failed capture.
    pub shot: u32,
    pub error: CaptureError,
}

/// Outcome of a capture sequence.
#[derive(Debug)]
pub struct MultiShotReport {
    pub requested: u32,
    pub completed: u32,
    pub failures: Vec<ShotFailure>,
    /// Set when the sequence was cut short by a fatal error.
    pub aborted: Option<CaptureError>,
}

impl MultiShotReport {
    pub fn all_completed(&self) -> bool {
        self.completed == self.requested
    }
}

/// Invoke the single-shot procedure `captures` times with `rest_ms` of
/// sleep between attempts, reusing the same configuration for every shot.
///
/// Without timestamped filenames each shot overwrites the same configured
/// paths; that is the documented behavior, not a bug. Timeouts and rejected
/// configurations are reported and the sequence continues; an unavailable
/// device aborts the remainder.
pub fn multi_shot<D, F>(mut driver_factory: F, config: &CaptureConfig) -> MultiShotReport
where
    D: ScopeDriver,
    F: FnMut() -> D,
{
    let mut report = MultiShotReport {
        requested: config.captures,
        completed: 0,
        failures: Vec::new(),
        aborted: None,
    };

    for shot in 0..config.captures {
        match single_shot(driver_factory(), config) {
            Ok(summary) => {
                report.completed += 1;
                log::info!(
                    "capture {}/{} done ({} samples)",
                    shot + 1,
                    config.captures,
                    summary.sample_count
                );
            }
            Err(error) if error.is_fatal() => {
                log::error!("capture {}/{} aborted the sequence: {error}", shot + 1, config.captures);
                report.aborted = Some(error);
                return report;
            }
            Err(error) => {
                log::error!("capture {}/{} failed: {error}", shot + 1, config.captures);
                report.failures.push(ShotFailure { shot, error });
            }
        }
        if shot + 1 < config.captures {
            thread::sleep(Duration::from_millis(config.rest_ms));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pico_driver::mock::{MockDriver, MockState};
    use chrono::TimeZone;
    use std::time::Instant;

    fn test_config(dir: &Path) -> CaptureConfig {
        let yaml = format!(
            "
channel: a
coupling: dc
range: 5v
timebase: 8
samples: 32
save_format: both
csv_path: {dir}/capture.csv
ipc_path: {dir}/capture.arrow
",
            dir = dir.display()
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_timestamp_stem_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 15, 4, 9).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(timestamp_stem(now), "M03-D07-H15-M04-S09-U.123456");
    }

    #[test]
    fn test_stamped_path_keeps_directory_and_extension() {
        let path = stamped_path(Path::new("data/capture.csv"), "M01-D02-H03-M04-S05-U.000006");
        assert_eq!(path, PathBuf::from("data/M01-D02-H03-M04-S05-U.000006.csv"));
    }

    #[test]
    fn test_resolution_without_timestamps_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let first = OutputSink::resolve(&config, Local::now());
        let second = OutputSink::resolve(&config, Local::now());
        assert_eq!(first, second);
        assert_eq!(first.csv, Some(config.csv_path.clone()));
        assert_eq!(first.ipc, Some(config.ipc_path.clone()));
    }

    #[test]
    fn test_timestamped_resolutions_differ_within_one_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.timestamp_filenames = true;
        let first = OutputSink::resolve(&config, Local::now());
        thread::sleep(Duration::from_micros(50));
        let second = OutputSink::resolve(&config, Local::now());
        assert_ne!(first.csv, second.csv);
        assert_ne!(first.ipc, second.ipc);
    }

    #[test]
    fn test_single_shot_writes_csv_and_ipc() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let state = MockState::shared();
        let summary = single_shot(MockDriver::new(state.clone()), &config).unwrap();
        assert_eq!(summary.sample_count, 32);

        let csv = fs::read_to_string(&config.csv_path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("time_ns,mv"));
        assert_eq!(lines.count(), 32);

        let ipc = IpcReader::new(File::open(&config.ipc_path).unwrap())
            .finish()
            .unwrap();
        assert_eq!(ipc.height(), 32);

        // the transaction is closed: the unit was claimed and released once
        let observed = state.borrow();
        assert_eq!(observed.open_calls, 1);
        assert_eq!(observed.close_calls, 1);
        assert!(!observed.is_open);
    }

    #[test]
    fn test_single_shot_timeout_leaves_no_output_and_releases_unit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.trigger.wait_timeout_ms = 20;
        let state = MockState::shared();
        state.borrow_mut().never_ready = true;

        let result = single_shot(MockDriver::new(state.clone()), &config);
        assert!(matches!(
            result,
            Err(CaptureError::Scope(ScopeError::CaptureTimeout { .. }))
        ));
        assert!(!config.csv_path.exists());
        assert!(!config.ipc_path.exists());
        let observed = state.borrow();
        assert_eq!(observed.close_calls, 1);
        assert!(!observed.is_open);
    }

    #[test]
    fn test_single_shot_write_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.csv_path = dir.path().join("missing/capture.csv");
        let state = MockState::shared();
        let result = single_shot(MockDriver::new(state.clone()), &config);
        match result {
            Err(error @ CaptureError::Write { .. }) => assert!(!error.is_fatal()),
            other => panic!("expected a write error, got {other:?}"),
        }
        // the unit was still released before the write was attempted
        assert_eq!(state.borrow().close_calls, 1);
    }

    #[test]
    fn test_multi_shot_runs_every_capture_with_rest() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.captures = 3;
        config.rest_ms = 40;
        let state = MockState::shared();
        let factory_state = state.clone();

        let started = Instant::now();
        let report = multi_shot(move || MockDriver::new(factory_state.clone()), &config);
        let elapsed = started.elapsed();

        assert_eq!(report.requested, 3);
        assert_eq!(report.completed, 3);
        assert!(report.all_completed());
        assert!(report.failures.is_empty());
        assert!(report.aborted.is_none());
        // two rests of 40 ms separate three captures
        assert!(elapsed >= Duration::from_millis(80), "elapsed {elapsed:?}");
        let observed = state.borrow();
        assert_eq!(observed.open_calls, 3);
        assert_eq!(observed.close_calls, 3);
    }

    #[test]
    fn test_multi_shot_absorbs_timeouts_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.captures = 3;
        config.trigger.wait_timeout_ms = 10;
        let state = MockState::shared();
        state.borrow_mut().never_ready = true;
        let factory_state = state.clone();

        let report = multi_shot(move || MockDriver::new(factory_state.clone()), &config);
        assert_eq!(report.completed, 0);
        assert_eq!(report.failures.len(), 3);
        assert!(report.aborted.is_none());
        assert_eq!(state.borrow().open_calls, 3);
    }

    #[test]
    fn test_multi_shot_aborts_when_the_device_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.captures = 5;
        let state = MockState::shared();
        state.borrow_mut().fail_open_after = Some(1);
        let factory_state = state.clone();

        let report = multi_shot(move || MockDriver::new(factory_state.clone()), &config);
        assert_eq!(report.completed, 1);
        assert!(report.failures.is_empty());
        assert!(matches!(
            report.aborted,
            Some(CaptureError::Scope(ScopeError::DeviceUnavailable(_)))
        ));
        // the remaining three captures were never attempted
        assert_eq!(state.borrow().open_calls, 2);
    }
}
