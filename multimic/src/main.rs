//! multimic - record the same moment from several microphones
//!
//! Lists host devices, lets the user pick inputs (or takes them from
//! `--device`/config), records a fixed-length clip from every pick, and writes
//! one WAV per device.

use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use multimic::cli::{self, Args};
use multimic::config::RecorderConfig;
use multimic::recorder;
use multimic::selector::{DeviceSelector, Selection};
use multimic_audio::{AudioBackend, AudioHost};

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so prompts and status lines own stdout
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => RecorderConfig::load_from(path),
        None => RecorderConfig::load(),
    }
    .context("Failed to load configuration")?;

    args.apply(&mut config);
    config.validate()?;

    if args.init_config {
        config.save()?;
        println!("Wrote {}", config.config_path.display());
        return Ok(());
    }

    info!("🎙️ multimic v{}", env!("CARGO_PKG_VERSION"));

    let host = AudioHost::new();
    info!("Audio host: {}", host.name());

    let devices = host.devices().context("Failed to enumerate audio devices")?;

    if args.list {
        let mut stdout = io::stdout().lock();
        return if args.json {
            cli::print_devices_json(&devices, &mut stdout)
        } else {
            cli::print_devices(&devices, &mut stdout)
        };
    }

    let selection = if config.devices.is_empty() {
        DeviceSelector::new(&devices)
            .run(io::stdin().lock(), &mut io::stdout())
            .context("Failed to read device selection")?
    } else {
        Selection::from_indices(&devices, &config.devices)
            .context("Invalid device in configuration or --device")?
    };

    if selection.is_empty() {
        warn!("No devices selected, nothing will be recorded");
    }

    info!(
        "Recording {:.2}s at {} Hz from {} device(s) ({:?} mode)",
        config.capture.record_seconds,
        config.capture.sample_rate,
        selection.len(),
        config.capture_mode
    );

    let report = recorder::record(&host, &devices, &selection, &config, &mut io::stdout())?;

    for device in &report.devices {
        if device.dropped_samples > 0 {
            warn!(
                "⚠️ {} dropped {} samples; its file has gaps",
                device.device.name, device.dropped_samples
            );
        }
    }

    drop(host);
    info!("✓ Done, {} file(s) written", report.devices.len());
    Ok(())
}
