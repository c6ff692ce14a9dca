//! contrail-bench: CLI tool for pipeline parameter experimentation and diagnostics.
//!
//! Feeds a sequence of frames through the contour pipeline and prints
//! per-frame stage diagnostics. Frames are either a synthetic bright disk
//! drifting across a dark raster or a loaded image drifting the same way.
//! Useful for:
//!
//! - Tuning the threshold, minimum area, and simplification tolerance
//! - Watching identities stay stable (or not) as shapes move
//! - Measuring per-stage durations to identify bottlenecks
//! - Previewing the rendered strokes of the final frame
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin contrail-bench -- [OPTIONS]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use contrail_pipeline::diagnostics::{Clock, FrameDiagnostics};
use contrail_pipeline::{
    Color, Dimensions, FramePipeline, PipelineConfig, PixmapCanvas, RenderStyle, RgbaImage,
    SaddleResolution,
};
use image::Rgba;
use tracing::{debug, info};

/// Contour pipeline experimentation and diagnostics for contrail.
///
/// Runs a stream of frames through extraction, tracking, and rendering
/// with configurable parameters and prints per-stage timing and counts.
#[derive(Parser)]
#[command(name = "contrail-bench", version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image to drift across the frame (PNG, JPEG, BMP, WebP).
    ///
    /// When omitted, a synthetic bright disk is used.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Synthetic frame width in pixels.
    #[arg(long, default_value_t = 320, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(2..))]
    width: u32,

    /// Synthetic frame height in pixels.
    #[arg(long, default_value_t = 180, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(2..))]
    height: u32,

    /// Synthetic disk radius as a fraction of the frame height.
    #[arg(long, default_value_t = 0.2, value_parser = positive_f64)]
    radius: f64,

    /// Horizontal drift per frame as a fraction of the frame width.
    #[arg(long, default_value_t = 0.01)]
    speed: f64,

    /// Number of frames to process.
    #[arg(long, default_value_t = 30, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    frames: u32,

    /// Frame rate used to derive timestamps.
    #[arg(long, default_value_t = 30.0, value_parser = positive_f64)]
    fps: f64,

    /// Luminance threshold (0-255).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Saddle cell resolution rule.
    #[arg(long, value_enum, default_value_t = Saddle::EntryDirection)]
    saddle: Saddle,

    /// Drop traces that touch the frame edge.
    #[arg(long)]
    discard_open: bool,

    /// Minimum contour area (normalized units squared).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_AREA)]
    min_area: f64,

    /// RDP simplification tolerance (normalized units).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SIMPLIFY_EPSILON)]
    simplify_epsilon: f64,

    /// Tracker smoothing factor (0-1).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SMOOTHING)]
    smoothing: f64,

    /// Trail length in seconds.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_TRAIL_LENGTH)]
    trail_length: f64,

    /// Stroke color as #rrggbb or #rrggbbaa.
    #[arg(long, default_value = "#ffffffff")]
    color: String,

    /// Stroke width at rest in pixels.
    #[arg(long, default_value_t = RenderStyle::DEFAULT_BASE_WIDTH)]
    base_width: f64,

    /// How strongly motion thins the stroke (0-1).
    #[arg(long, default_value_t = RenderStyle::DEFAULT_VELOCITY_RESPONSE)]
    velocity_response: f64,

    /// Trail taper amount (0-1).
    #[arg(long, default_value_t = RenderStyle::DEFAULT_TAPER_AMOUNT)]
    taper: f64,

    /// Glow intensity (0-1).
    #[arg(long, default_value_t = RenderStyle::DEFAULT_GLOW_INTENSITY)]
    glow: f64,

    /// Write the final rendered frame as PNG.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Print diagnostics for every frame, not just the summary.
    #[arg(long)]
    per_frame: bool,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Parse a finite, strictly positive float.
fn positive_f64(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not a positive finite number"))
    }
}

/// Saddle resolution selection.
#[derive(Clone, Copy, ValueEnum)]
enum Saddle {
    /// Continue by entry edge; diagonal blobs stay separate.
    EntryDirection,
    /// Asymptotic decider on the mean corner luminance.
    CenterAverage,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let color = Color::from_hex(&cli.color).map_err(|e| format!("Error parsing --color: {e}"))?;
    Ok(PipelineConfig {
        threshold: cli.threshold,
        saddle_resolution: match cli.saddle {
            Saddle::EntryDirection => SaddleResolution::EntryDirection,
            Saddle::CenterAverage => SaddleResolution::CenterAverage,
        },
        discard_open_contours: cli.discard_open,
        min_area: cli.min_area,
        simplify_epsilon: cli.simplify_epsilon,
        smoothing: cli.smoothing,
        trail_length: cli.trail_length,
        style: RenderStyle {
            color,
            base_width: cli.base_width,
            velocity_response: cli.velocity_response,
            taper_amount: cli.taper,
            glow_intensity: cli.glow,
            ..RenderStyle::default()
        },
    })
}

/// Where frames come from.
enum Source {
    /// Bright disk on black.
    Disk { radius: f64 },
    /// A loaded image translated each frame.
    Image(RgbaImage),
}

impl Source {
    #[allow(clippy::cast_possible_truncation)]
    fn frame(&self, width: u32, height: u32, offset_x: f64) -> RgbaImage {
        match self {
            Self::Disk { radius } => {
                let mut img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
                let center = (
                    (f64::from(width) * (0.3 + offset_x)).round() as i32,
                    (f64::from(height) / 2.0).round() as i32,
                );
                let r = (f64::from(height) * radius).round() as i32;
                imageproc::drawing::draw_filled_circle_mut(
                    &mut img,
                    center,
                    r,
                    Rgba([255, 255, 255, 255]),
                );
                img
            }
            Self::Image(img) => {
                let dx = (f64::from(width) * offset_x).round() as i32;
                imageproc::geometric_transformations::translate(img, (dx, 0))
            }
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[allow(clippy::too_many_lines)]
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let source = match cli.input {
        Some(ref path) => match std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| contrail_pipeline::decode_rgba(&bytes).map_err(|e| e.to_string()))
        {
            Ok(img) => {
                eprintln!("Input: {} ({}x{})", path.display(), img.width(), img.height());
                Source::Image(img)
            }
            Err(e) => {
                eprintln!("Error loading {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Source::Disk { radius: cli.radius },
    };
    let frame = match &source {
        Source::Image(img) => Dimensions {
            width: img.width(),
            height: img.height(),
        },
        Source::Disk { .. } => Dimensions {
            width: cli.width,
            height: cli.height,
        },
    };

    let mut pipeline = match FramePipeline::new(config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Pipeline error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut canvas = match PixmapCanvas::new(frame.width, frame.height) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Canvas error: {e}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Frame: {}x{}", frame.width, frame.height);
    eprintln!("Config: {:#?}", pipeline.config());
    eprintln!("Frames: {} @ {} fps", cli.frames, cli.fps);
    eprintln!();

    let frame_interval_ms = 1000.0 / cli.fps;
    let mut all_diagnostics = Vec::with_capacity(cli.frames as usize);

    for index in 0..cli.frames {
        let img = source.frame(frame.width, frame.height, f64::from(index) * cli.speed);
        let timestamp = f64::from(index) * frame_interval_ms;
        canvas.clear(Color::rgb(0, 0, 0));

        let output = match pipeline.process_frame_with_clock(
            img.as_raw(),
            frame,
            timestamp,
            &mut canvas,
            frame,
            &StdClock,
        ) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("Pipeline error on frame {index}: {e}");
                return ExitCode::FAILURE;
            }
        };
        debug!(
            frame = index,
            ids = ?output.contours.iter().map(contrail_pipeline::TrackedContour::id).collect::<Vec<_>>(),
            "frame identities"
        );

        if cli.per_frame {
            if cli.json {
                match serde_json::to_string_pretty(&output.diagnostics) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Error serializing diagnostics: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!("{}", output.diagnostics.report());
                println!();
            }
        }

        all_diagnostics.push(output.diagnostics);
    }

    if let Some(last) = pipeline.tracker().iter().last() {
        info!(
            id = last.id(),
            velocity = last.velocity,
            age = last.age,
            "last identity"
        );
    }

    if let Some(ref png_path) = cli.png {
        match canvas.to_rgba_image().save(png_path) {
            Ok(()) => eprintln!("PNG written to {}", png_path.display()),
            Err(e) => eprintln!("Error writing PNG to {}: {e}", png_path.display()),
        }
    }

    if cli.json && !cli.per_frame {
        match serde_json::to_string_pretty(&all_diagnostics) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else if !cli.json {
        print_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&FrameDiagnostics) -> Duration;

/// Print aggregated statistics across all frames.
#[allow(clippy::cast_precision_loss)]
fn print_summary(all_diagnostics: &[FrameDiagnostics]) {
    println!(
        "Summary ({} frames)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Frame duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Extraction", |d| d.extraction.duration),
        ("Filter", |d| d.filter.duration),
        ("Simplification", |d| d.simplification.duration),
        ("Tracking", |d| d.tracking.duration),
        ("Trails", |d| d.trails.duration),
        ("Render", |d| d.render.duration),
    ];

    for (name, extractor) in stage_extractors {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }

    if let Some(last) = all_diagnostics.last() {
        println!();
        println!(
            "Final frame: {} contours, {} tracked",
            last.summary.contour_count, last.summary.tracked_count,
        );
    }
}
