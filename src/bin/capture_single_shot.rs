//! PS5000A single-shot block capture, driven by a YAML configuration with
//! command-line overrides.

use clap::Parser;
use picoscope_rs::{
    default_driver, single_shot, CaptureConfig, CaptureOverrides, Channel, Coupling,
    DeviceResolution, SaveFormat, TriggerDirection, VoltageRange,
};
use std::path::PathBuf;
use std::process;

#[derive(Debug, Parser)]
#[command(name = "capture-single-shot", version, about = "PS5000A single-shot block capture")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "capture_config.yml")]
    config: PathBuf,

    /// ADC resolution (8bit, 12bit, 14bit, 15bit, 16bit)
    #[arg(long)]
    resolution: Option<DeviceResolution>,

    /// Input channel (a, b, c, d)
    #[arg(long)]
    channel: Option<Channel>,

    /// Input coupling (ac, dc)
    #[arg(long)]
    coupling: Option<Coupling>,

    /// Full-scale input range (10mv .. 50v)
    #[arg(long)]
    range: Option<VoltageRange>,

    /// Analogue offset in volts
    #[arg(long)]
    offset_volts: Option<f64>,

    /// Requested timebase index
    #[arg(long)]
    timebase: Option<u32>,

    /// Number of samples to capture
    #[arg(long)]
    samples: Option<u32>,

    /// Fraction of samples captured before the trigger (0.0..=1.0)
    #[arg(long)]
    pre_trigger_ratio: Option<f64>,

    /// Enable the trigger
    #[arg(long, overrides_with = "no_trigger")]
    trigger: bool,

    /// Disable the trigger (capture starts immediately)
    #[arg(long)]
    no_trigger: bool,

    /// Trigger source channel
    #[arg(long)]
    trigger_source: Option<Channel>,

    /// Trigger level in millivolts
    #[arg(long)]
    trigger_level_mv: Option<f64>,

    /// Trigger direction (above, below, rising, falling, rising_or_falling)
    #[arg(long)]
    trigger_direction: Option<TriggerDirection>,

    /// Trigger delay in samples
    #[arg(long)]
    trigger_delay_samples: Option<u32>,

    /// Device-side auto-trigger timeout in ms (0 waits forever)
    #[arg(long)]
    auto_trigger_ms: Option<u16>,

    /// Bound on the host-side trigger wait in ms
    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// Output selection (csv, ipc, both)
    #[arg(long)]
    save_format: Option<SaveFormat>,

    /// CSV output path
    #[arg(long)]
    csv_path: Option<PathBuf>,

    /// Arrow IPC output path
    #[arg(long)]
    ipc_path: Option<PathBuf>,

    /// Stamp output filenames with the capture time
    #[arg(long, overrides_with = "no_timestamp_filenames")]
    timestamp_filenames: bool,

    /// Use the configured output paths verbatim
    #[arg(long)]
    no_timestamp_filenames: bool,
}

impl Args {
    fn overrides(&self) -> CaptureOverrides {
        CaptureOverrides {
            resolution: self.resolution,
            channel: self.channel,
            coupling: self.coupling,
            range: self.range,
            offset_volts: self.offset_volts,
            timebase: self.timebase,
            samples: self.samples,
            pre_trigger_ratio: self.pre_trigger_ratio,
            trigger_enabled: flag_pair(self.trigger, self.no_trigger),
            trigger_source: self.trigger_source,
            trigger_level_mv: self.trigger_level_mv,
            trigger_direction: self.trigger_direction,
            trigger_delay_samples: self.trigger_delay_samples,
            auto_trigger_ms: self.auto_trigger_ms,
            wait_timeout_ms: self.wait_timeout_ms,
            save_format: self.save_format,
            csv_path: self.csv_path.clone(),
            ipc_path: self.ipc_path.clone(),
            timestamp_filenames: flag_pair(self.timestamp_filenames, self.no_timestamp_filenames),
            captures: None,
            rest_ms: None,
        }
    }
}

fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(error) = run(&args) {
        eprintln!("error: {error}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = CaptureConfig::load(&args.config, &args.overrides())?;
    println!(
        "loaded config: channel={} range={} timebase={} samples={}",
        config.channel, config.range, config.timebase, config.samples
    );

    let summary = single_shot(default_driver(), &config)?;
    if let Some(path) = &summary.sink.csv {
        println!("csv: {}", path.display());
    }
    if let Some(path) = &summary.sink.ipc {
        println!("ipc: {}", path.display());
    }
    println!(
        "captured {} samples at {:.3} ns/sample{}",
        summary.sample_count,
        summary.interval_ns,
        if summary.overflow { " (input overflow)" } else { "" }
    );
    Ok(())
}
