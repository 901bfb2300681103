//! Kiroku Recorder Binary
//!
//! Unattended field video recorder: continuous chunked capture on a fast
//! local tier, scheduled verified relocation to an external drive, and
//! age-based retention.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults (rpicam-vid backend)
//! kiroku-recorder
//!
//! # Custom settings
//! kiroku-recorder --chunk-minutes 30 --transfer-hours 6 --preview
//!
//! # Different storage paths
//! kiroku-recorder --local-path /tmp/videos --external-path /media/usb/videos
//!
//! # Synthetic source (development without a camera)
//! kiroku-recorder --test-source
//! ```
//!
//! Every flag also has a `KIROKU_*` environment variable; flags win.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kiroku::{
    config::{parse_hours, parse_resolution},
    CaptureBackend, ProcessBackend, Recorder, RecorderConfig, TestSourceBackend,
};

/// Append-only session log written to the local tier.
const LOG_FILE: &str = "kiroku-recorder.log";

struct Options {
    config: RecorderConfig,
    test_source: bool,
}

impl Options {
    /// Environment first, then command-line flags on top.
    fn load() -> Result<Self> {
        let mut config = RecorderConfig::default();
        let mut test_source = false;

        if let Ok(v) = std::env::var("KIROKU_LOCAL_PATH") {
            config.local_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("KIROKU_EXTERNAL_PATH") {
            config.external_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("KIROKU_CHUNK_MINUTES") {
            config.chunk_duration = parse_minutes(&v)?;
        }
        if let Ok(v) = std::env::var("KIROKU_TRANSFER_HOURS") {
            config.transfer_interval = parse_hours(&v)?;
        }
        if let Ok(v) = std::env::var("KIROKU_RESOLUTION") {
            (config.width, config.height) = parse_resolution(&v)?;
        }
        if let Ok(v) = std::env::var("KIROKU_BITRATE") {
            config.bitrate = v.parse().context("invalid KIROKU_BITRATE")?;
        }
        if let Ok(v) = std::env::var("KIROKU_FRAMERATE") {
            config.framerate = v.parse().context("invalid KIROKU_FRAMERATE")?;
        }
        if let Ok(v) = std::env::var("KIROKU_CLEANUP_DAYS") {
            config.retention = parse_days(&v)?;
        }
        if let Ok(v) = std::env::var("KIROKU_SWEEP_HOURS") {
            config.sweep_interval = Some(parse_hours(&v)?);
        }
        if let Ok(v) = std::env::var("KIROKU_PREVIEW") {
            config.preview = v == "1" || v.eq_ignore_ascii_case("true");
        }

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("missing value for {flag}"))
            };
            match arg.as_str() {
                "--local-path" => config.local_path = PathBuf::from(value("--local-path")?),
                "--external-path" => {
                    config.external_path = PathBuf::from(value("--external-path")?)
                }
                "--chunk-minutes" => config.chunk_duration = parse_minutes(&value("--chunk-minutes")?)?,
                "--transfer-hours" => {
                    config.transfer_interval = parse_hours(&value("--transfer-hours")?)?
                }
                "--resolution" => {
                    (config.width, config.height) = parse_resolution(&value("--resolution")?)?
                }
                "--bitrate" => {
                    config.bitrate = value("--bitrate")?.parse().context("invalid --bitrate")?
                }
                "--framerate" => {
                    config.framerate = value("--framerate")?
                        .parse()
                        .context("invalid --framerate")?
                }
                "--cleanup-days" => config.retention = parse_days(&value("--cleanup-days")?)?,
                "--sweep-hours" => {
                    config.sweep_interval = Some(parse_hours(&value("--sweep-hours")?)?)
                }
                "--preview" => config.preview = true,
                "--test-source" => test_source = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other => bail!("unknown argument '{other}' (see --help)"),
            }
        }

        config.validate()?;
        Ok(Self {
            config,
            test_source,
        })
    }
}

fn parse_minutes(s: &str) -> Result<std::time::Duration> {
    let minutes: u64 = s.parse().with_context(|| format!("invalid minutes '{s}'"))?;
    if minutes == 0 {
        bail!("minutes must be positive");
    }
    Ok(std::time::Duration::from_secs(minutes * 60))
}

fn parse_days(s: &str) -> Result<std::time::Duration> {
    let days: u64 = s.parse().with_context(|| format!("invalid days '{s}'"))?;
    Ok(std::time::Duration::from_secs(days * 24 * 3600))
}

fn print_usage() {
    println!(
        "kiroku-recorder - continuous chunked video recorder with tiered storage

USAGE:
    kiroku-recorder [OPTIONS]

OPTIONS:
    --local-path <DIR>       fast tier directory (default /var/lib/kiroku/chunks)
    --external-path <DIR>    slow tier directory (default /mnt/external/kiroku)
    --chunk-minutes <N>      chunk duration in minutes (default 20)
    --transfer-hours <H>     hours between transfer cycles, fractional ok (default 12)
    --resolution <WxH>       video resolution (default 1920x1080)
    --bitrate <BPS>          video bitrate in bits/sec (default 10000000)
    --framerate <FPS>        video framerate (default 30)
    --cleanup-days <N>       days to keep chunks on the external tier (default 30)
    --sweep-hours <H>        also re-run retention every H hours (default: startup only)
    --preview                show live camera preview
    --test-source            use the synthetic capture backend (no camera)
    -h, --help               print this help"
    );
}

/// Console logging plus an append-only log file on the local tier.
fn init_tracing(local_path: &std::path::Path) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    std::fs::create_dir_all(local_path).with_context(|| {
        format!("failed to create local storage {}", local_path.display())
    })?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(local_path.join(LOG_FILE))
        .context("failed to open session log file")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kiroku=info".parse().unwrap()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::load()?;
    init_tracing(&options.config.local_path)?;

    let config = &options.config;
    info!("Kiroku Recorder starting");
    info!("  Local storage: {}", config.local_path.display());
    info!("  External storage: {}", config.external_path.display());
    info!(
        "  Video: {}x{} @ {}fps, {} bps",
        config.width, config.height, config.framerate, config.bitrate
    );
    info!("  Chunk duration: {:?}", config.chunk_duration);
    info!("  Transfer interval: {:?}", config.transfer_interval);
    info!("  Retention: {:?}", config.retention);
    match config.sweep_interval {
        Some(period) => info!("  Periodic sweep: every {:?}", period),
        None => info!("  Periodic sweep: startup only"),
    }

    let backend: Box<dyn CaptureBackend> = if options.test_source {
        info!("  Backend: test source");
        Box::new(TestSourceBackend::new())
    } else {
        Box::new(ProcessBackend::new())
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received shutdown signal");
            signal_cancel.cancel();
        }
    });

    let recorder = Recorder::new(options.config, backend)?;
    recorder.run(cancel).await
}
