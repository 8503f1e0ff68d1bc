//! phantomcd: a user-space ATAPI CD/DVD-ROM drive.
//!
//! A kernel virtual SCSI adapter forwards CDBs over a character device; this
//! daemon interprets them against a loaded disc image faithfully enough that
//! OS drivers, audio players, rippers and copy-protection probes treat the
//! result as a real drive.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use phantomcd::device::load::LoadOptions;
use phantomcd::device::{Device, DeviceMonitor, OptionValue};

#[derive(Parser)]
#[command(name = "phantomcd", about = "User-space ATAPI CD/DVD-ROM drive emulator")]
struct Args {
    /// Kernel control device the virtual SCSI adapter forwards CDBs over.
    #[arg(long, default_value = "/dev/phantom_ctl")]
    ctl_device: PathBuf,

    /// Device number (names the emulated drive in logs and signals).
    #[arg(long, default_value_t = 0)]
    device: u32,

    /// Audio output driver for CD-DA playback.
    #[arg(long, default_value = "null")]
    audio_driver: String,

    /// Emulate per-sector seek timing from the image's DPM data.
    #[arg(long)]
    dpm_emulation: Option<bool>,

    /// Emulate transfer-rate timing.
    #[arg(long)]
    tr_emulation: Option<bool>,

    /// Report read errors for sectors whose stored EDC mismatches.
    #[arg(long)]
    bad_sector_emulation: Option<bool>,

    /// Disc image to load at startup; multiple files load as one
    /// multi-session disc.
    images: Vec<PathBuf>,
}

/// Logs the signals a control layer would forward to clients.
struct StatusLogger;

impl DeviceMonitor for StatusLogger {
    fn status_changed(&self, device: u32) {
        info!(device, "status changed");
    }

    fn option_changed(&self, device: u32, option: &str) {
        debug!(device, option, "option changed");
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut device = Device::new(args.device);
    device.add_monitor(Box::new(StatusLogger));

    let toggles = [
        ("dpm-emulation", args.dpm_emulation),
        ("tr-emulation", args.tr_emulation),
        ("bad-sector-emulation", args.bad_sector_emulation),
    ];
    for (name, value) in toggles {
        if let Some(enabled) = value {
            if let Err(err) = device.set_option(name, OptionValue::Bool(enabled)) {
                error!(%err, "failed to set option");
                return ExitCode::FAILURE;
            }
        }
    }

    if !args.images.is_empty() {
        if let Err(err) = device.load(&args.images, &LoadOptions::default()) {
            error!(%err, "failed to load startup image");
            return ExitCode::FAILURE;
        }
        let (loaded, filenames) = device.status();
        info!(loaded, ?filenames, "startup image");
    }

    if let Err(err) = device.start(&args.ctl_device, &args.audio_driver) {
        error!(%err, device = %args.ctl_device.display(), "failed to open control device");
        return ExitCode::FAILURE;
    }

    info!(ctl = %args.ctl_device.display(), "device running");

    // The transport loop owns the process lifetime; it ends when the control
    // device goes away or shutdown is requested.
    device.wait();
    device.shutdown();

    ExitCode::SUCCESS
}
