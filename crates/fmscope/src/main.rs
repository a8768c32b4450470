//! Spectrum, waterfall and FM audio from an I/Q source
//!
//! Runs the sdrscope pipeline against an I/Q capture (or a SoapySDR receiver
//! with the `soapy` feature), plays the demodulated audio (with the `audio`
//! feature) and polls the display at 60 Hz, writing the current frame to a
//! PNG file at a fixed period.
//!
//! # Usage Examples
//!
//! ## IQ File Playback
//! ```bash
//! fmscope --source file --file samples.iq --format cu8 -c 96.9M -s 2M
//! ```
//!
//! ## SoapySDR with audio, snapshot every 2 seconds
//! ```bash
//! fmscope --source soapy --soapy-args "driver=lime" -c 96.9M --snapshot fft.png -v
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::{info, warn};

use sdrscope::device::file::{FileDeviceProvider, FileSourceConfig};
use sdrscope::device::null::NullAudioBackend;
use sdrscope::device::{AudioBackend, DeviceProvider};
use sdrscope::notation::format_frequency;
use sdrscope::params::FFT_SIZES;
use sdrscope::waterfall::{Image, Label};
use sdrscope::{IqFormat, Pipeline, PipelineConfig, PipelineState, RuntimeParameters};

#[derive(Debug, Clone, Copy)]
struct Frequency(u32);

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(stripped) = s.strip_suffix('M') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid MHz value")?;
            Ok(Frequency((val * 1_000_000.0) as u32))
        } else if let Some(stripped) = s.strip_suffix('k') {
            let val: f64 = stripped.trim().parse().map_err(|_| "Invalid kHz value")?;
            Ok(Frequency((val * 1_000.0) as u32))
        } else {
            let val: u32 = s.parse().map_err(|_| "Invalid Hz value")?;
            Ok(Frequency(val))
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceType {
    File,
    Soapy,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Spectrum, waterfall and FM audio from an I/Q source", long_about = None)]
struct Args {
    /// Center frequency in Hz (accepts k/M suffix, e.g. 96.9M)
    #[arg(short, long, value_parser = Frequency::from_str, default_value = "96.9M")]
    center_freq: Frequency,

    /// Sample rate in Hz (accepts k/M suffix)
    #[arg(short, long, value_parser = Frequency::from_str, default_value = "2M")]
    sample_rate: Frequency,

    /// Normalized gain (0.0 - 1.0)
    #[arg(short, long, default_value_t = 0.4)]
    gain: f64,

    /// Antenna index
    #[arg(long, default_value_t = 0)]
    antenna: usize,

    /// FFT size (128 to 16384, power of two)
    #[arg(long, default_value_t = 4096)]
    fft_size: usize,

    /// Temporal averaging factor (>= 1)
    #[arg(long, default_value_t = 4.5)]
    averaging: f32,

    /// Source type: file or soapy
    #[arg(long, default_value = "file")]
    source: SourceType,

    /// Input file path (required when source=file)
    #[arg(long)]
    file: Option<PathBuf>,

    /// IQ format for file input (cu8, cs8, cs16, cf32)
    #[arg(long, default_value = "cu8")]
    format: String,

    /// Replay the file as fast as possible instead of at the sample rate
    #[arg(long, default_value_t = false)]
    no_pacing: bool,

    /// SoapySDR device filter (e.g., "driver=lime")
    #[arg(long, default_value = "")]
    soapy_args: String,

    /// Disable audio output (for SSH/headless operation)
    #[arg(long, default_value_t = false)]
    no_audio: bool,

    /// Write the display to this PNG file periodically
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Seconds between snapshots
    #[arg(long, default_value_t = 2.0)]
    snapshot_every: f64,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn provider(args: &Args) -> sdrscope::Result<Box<dyn DeviceProvider>> {
    match args.source {
        SourceType::File => {
            let Some(path) = args.file.as_ref() else {
                eprintln!("Error: --file is required when source=file");
                std::process::exit(1);
            };
            let format: IqFormat = args.format.parse()?;
            let config = FileSourceConfig {
                realtime: !args.no_pacing,
                ..FileSourceConfig::new(path, format)
            };
            Ok(Box::new(FileDeviceProvider::new(config)))
        }
        SourceType::Soapy => {
            #[cfg(feature = "soapy")]
            {
                Ok(Box::new(sdrscope::device::soapy::SoapyDeviceProvider::new(
                    args.soapy_args.as_str(),
                )))
            }
            #[cfg(not(feature = "soapy"))]
            {
                eprintln!("Error: soapy feature not enabled. Rebuild with --features soapy");
                std::process::exit(1);
            }
        }
    }
}

fn audio_backend(no_audio: bool) -> Box<dyn AudioBackend> {
    if no_audio {
        return Box::new(NullAudioBackend);
    }
    #[cfg(feature = "audio")]
    {
        Box::new(sdrscope::device::tinyaudio::TinyAudioBackend)
    }
    #[cfg(not(feature = "audio"))]
    {
        warn!("audio feature not enabled, audio is discarded");
        Box::new(NullAudioBackend)
    }
}

fn save_png(path: &Path, image: &Image) -> Result<(), Box<dyn std::error::Error>> {
    let (width, height) = (image.width(), image.height());
    let root = BitMapBackend::new(path, (width as u32, height as u32)).into_drawing_area();
    root.fill(&BLACK)?;
    for (i, px) in image.canvas.pixels().iter().enumerate() {
        if *px == sdrscope::waterfall::canvas::Rgba::BLACK {
            continue;
        }
        let (x, y) = ((i % width) as i32, (i / width) as i32);
        root.draw_pixel((x, y), &RGBColor(px.r, px.g, px.b))?;
    }
    for label in &image.labels {
        let Some(anchor) = label_anchor(label, width, height) else {
            continue;
        };
        let color = RGBColor(label.color.r, label.color.g, label.color.b);
        let style = ("sans-serif", f64::from(label.size))
            .into_font()
            .color(&color)
            .pos(Pos::new(HPos::Left, VPos::Bottom));
        // A host without fonts still gets the pixels
        if let Err(e) = root.draw(&Text::new(label.text.as_str(), anchor, style)) {
            warn!("drawing label {:?}: {}", label.text, e);
        }
    }
    root.present()?;
    Ok(())
}

/// Baseline start of a label in pixels, `None` when it falls off the image.
fn label_anchor(label: &Label, width: usize, height: usize) -> Option<(i32, i32)> {
    let (x, y) = (label.x.round(), label.y.round());
    let inside = x >= 0.0 && y >= 0.0 && x < width as f32 && y < height as f32;
    (inside && !label.text.is_empty()).then_some((x as i32, y as i32))
}

#[tokio::main]
async fn main() -> sdrscope::Result<()> {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .try_init();

    if !FFT_SIZES.contains(&args.fft_size) {
        eprintln!("Error: FFT size must be one of {:?}", FFT_SIZES);
        std::process::exit(1);
    }

    let config = PipelineConfig {
        params: RuntimeParameters {
            center_frequency: args.center_freq.0 as f64,
            sample_rate: args.sample_rate.0 as f64,
            gain: args.gain,
            antenna_index: args.antenna,
            fft_size: args.fft_size,
            averaging_factor: args.averaging,
            ..RuntimeParameters::default()
        },
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config, provider(&args)?, audio_backend(args.no_audio))?;

    // Initialization failures are not fatal: retry until it loads or ^C
    let mut retry = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = retry.tick() => {
                match pipeline.initialize() {
                    Ok(()) => break,
                    Err(e) => warn!("not loaded ({}), retrying", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                pipeline.close();
                return Ok(());
            }
        }
    }
    debug_assert_eq!(pipeline.state(), PipelineState::Ready);

    pipeline.start()?;
    info!(
        "tuned to {} ({}), antennas {:?}",
        format_frequency(pipeline.params().center_frequency),
        pipeline.frequency_digits(),
        pipeline.antennas().unwrap_or_default()
    );

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut display = tokio::time::interval(Duration::from_secs_f64(1.0 / 60.0));
    let mut snapshot = tokio::time::interval(Duration::from_secs_f64(args.snapshot_every.max(0.1)));
    let mut latest: Option<Image> = None;
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = display.tick() => {
                if let Some(image) = pipeline.presenter().take_if_updated() {
                    frames += 1;
                    latest = Some(image);
                }
            }
            _ = snapshot.tick() => {
                if let (Some(path), Some(image)) = (args.snapshot.as_ref(), latest.as_ref()) {
                    if let Err(e) = save_png(path, image) {
                        warn!("writing {}: {}", path.display(), e);
                    }
                }
                let ring = pipeline.ring();
                info!(
                    "{} frames displayed, audio ring {}/{} (overflows {}, underruns {})",
                    frames,
                    ring.len(),
                    ring.capacity(),
                    ring.overflows(),
                    ring.underruns()
                );
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(stats) = pipeline.stats() {
        info!("{:?}", stats);
    }
    pipeline.close();
    Ok(())
}
