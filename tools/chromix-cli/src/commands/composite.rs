//! Run a composite job from the command line.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Args;

use chromix_common::config::AppConfig;
use chromix_composite_engine::pipeline::{composite, CancelToken, JobProgress, ProgressCallback};
use chromix_composite_engine::params::{CompositeJob, KeyColor, LogoPlacement, LogoSpec};
use chromix_processing_core::audio::AudioMode;
use chromix_processing_core::keying::KeyColorBounds;

#[derive(Args)]
pub struct CompositeArgs {
    /// Foreground clip (filmed against the key color)
    foreground: PathBuf,

    /// Background clip the subject is composited onto
    background: PathBuf,

    /// Output file path
    #[arg(short, long, default_value = "composite_output.mp4")]
    output: PathBuf,

    /// When the composite becomes active (seconds)
    #[arg(long, default_value = "0.0")]
    start: f64,

    /// When it deactivates; omitted = until the end of the background
    #[arg(long)]
    end: Option<f64>,

    /// Audio policy: synced|background|foreground|both|timed|none
    #[arg(long, default_value = "synced")]
    audio: String,

    /// Horizontal subject offset from the background center (pixels)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    x: i32,

    /// Vertical subject offset from the background center (pixels)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    y: i32,

    /// Foreground scale factor
    #[arg(long, default_value = "1.0")]
    scale: f64,

    /// Foreground blend opacity [0.0, 1.0]
    #[arg(long, default_value = "1.0")]
    opacity: f64,

    /// Key color preset: green|blue
    #[arg(long, default_value = "green")]
    key: String,

    /// Custom hue lower bound (0-179); overrides the preset
    #[arg(long)]
    h_min: Option<u8>,

    /// Custom hue upper bound (0-179)
    #[arg(long)]
    h_max: Option<u8>,

    /// Custom saturation lower bound
    #[arg(long)]
    s_min: Option<u8>,

    /// Custom saturation upper bound
    #[arg(long)]
    s_max: Option<u8>,

    /// Custom value lower bound
    #[arg(long)]
    v_min: Option<u8>,

    /// Custom value upper bound
    #[arg(long)]
    v_max: Option<u8>,

    /// Mask edge blur kernel width (odd, 0 = off)
    #[arg(long, default_value = "5")]
    blur: u32,

    /// Key-spill suppression strength [0.0, 1.0]
    #[arg(long, default_value = "0.5")]
    spill: f64,

    /// Trade quality for speed
    #[arg(long)]
    fast: bool,

    /// Prefer a hardware video encoder
    #[arg(long)]
    gpu: bool,

    /// Watermark image to overlay
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Logo corner: top-left|top-right|bottom-left|bottom-right
    #[arg(long, default_value = "bottom-right")]
    logo_position: String,

    /// Explicit logo X offset (overrides the corner)
    #[arg(long, allow_hyphen_values = true)]
    logo_x: Option<i64>,

    /// Explicit logo Y offset (overrides the corner)
    #[arg(long, allow_hyphen_values = true)]
    logo_y: Option<i64>,

    /// Logo scale factor
    #[arg(long, default_value = "0.1")]
    logo_scale: f64,

    /// Logo opacity [0.0, 1.0]
    #[arg(long, default_value = "1.0")]
    logo_opacity: f64,
}

pub async fn run(args: CompositeArgs) -> anyhow::Result<()> {
    let job = build_job(&args)?;

    println!("Compositing:");
    println!("  Foreground: {}", job.foreground.display());
    println!("  Background: {}", job.background.display());
    println!("  Output:     {}", job.output.display());

    // Ctrl-C requests cooperative cancellation; the engine stops between
    // frames and discards partial output.
    let cancel: CancelToken = Arc::new(AtomicBool::new(false));
    let signal_token = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.store(true, Ordering::SeqCst);
        }
    });

    let progress_cb: ProgressCallback = Box::new(|p: JobProgress| {
        print!("\r  [{:3}%] {}          ", p.percent, p.message);
    });

    match composite(job, AppConfig::load().tools, Some(progress_cb), Some(cancel)).await {
        Ok(outcome) => {
            println!(
                "\nDone: {} ({} frames, {:.1}s of video, {:.1}s wall clock)",
                outcome.output_path.display(),
                outcome.frames_written,
                outcome.duration_secs,
                outcome.elapsed_secs,
            );
            Ok(())
        }
        Err(e) => {
            println!("\nComposite failed: {e}");
            Err(e.into())
        }
    }
}

fn build_job(args: &CompositeArgs) -> anyhow::Result<CompositeJob> {
    let mut job = CompositeJob::new(&args.foreground, &args.background, &args.output);
    job.start_time = args.start;
    job.end_time = args.end;
    job.position = (args.x, args.y);
    job.scale = args.scale;
    job.opacity = args.opacity;
    job.key = parse_key(args)?;
    job.edge_blur = args.blur;
    job.spill_reduction = args.spill;
    job.audio = parse_audio_mode(&args.audio)?;
    job.fast_mode = args.fast;
    job.gpu_accel = args.gpu;
    job.logo = args
        .logo
        .as_ref()
        .map(|path| build_logo(args, path.clone()))
        .transpose()?;
    Ok(job)
}

fn parse_audio_mode(value: &str) -> anyhow::Result<AudioMode> {
    match value {
        "synced" => Ok(AudioMode::Synced),
        "background" => Ok(AudioMode::BackgroundOnly),
        "foreground" => Ok(AudioMode::ForegroundOnly),
        "both" => Ok(AudioMode::Both),
        "timed" => Ok(AudioMode::TimedForeground),
        "none" => Ok(AudioMode::None),
        other => Err(anyhow::anyhow!(
            "Unknown audio mode: {other}. Use: synced, background, foreground, both, timed, none"
        )),
    }
}

fn parse_key(args: &CompositeArgs) -> anyhow::Result<KeyColor> {
    let preset = match args.key.as_str() {
        "green" => KeyColor::Green,
        "blue" => KeyColor::Blue,
        other => {
            return Err(anyhow::anyhow!("Unknown key preset: {other}. Use: green, blue"));
        }
    };

    let overrides = [
        args.h_min, args.h_max, args.s_min, args.s_max, args.v_min, args.v_max,
    ];
    if overrides.iter().all(Option::is_none) {
        return Ok(preset);
    }

    // Any explicit bound switches to a custom interval, with the preset
    // filling in the rest.
    let base = preset.bounds();
    Ok(KeyColor::Custom(KeyColorBounds::custom(
        [
            args.h_min.unwrap_or(base.lower[0]),
            args.s_min.unwrap_or(base.lower[1]),
            args.v_min.unwrap_or(base.lower[2]),
        ],
        [
            args.h_max.unwrap_or(base.upper[0]),
            args.s_max.unwrap_or(base.upper[1]),
            args.v_max.unwrap_or(base.upper[2]),
        ],
    )))
}

fn build_logo(args: &CompositeArgs, path: PathBuf) -> anyhow::Result<LogoSpec> {
    let placement = match (args.logo_x, args.logo_y) {
        (Some(x), Some(y)) => LogoPlacement::At { x, y },
        (None, None) => match args.logo_position.as_str() {
            "top-left" => LogoPlacement::TopLeft,
            "top-right" => LogoPlacement::TopRight,
            "bottom-left" => LogoPlacement::BottomLeft,
            "bottom-right" => LogoPlacement::BottomRight,
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown logo position: {other}. Use: top-left, top-right, bottom-left, bottom-right"
                ));
            }
        },
        _ => {
            return Err(anyhow::anyhow!(
                "Provide both --logo-x and --logo-y, or neither"
            ));
        }
    };

    Ok(LogoSpec {
        path,
        placement,
        scale: args.logo_scale,
        opacity: args.logo_opacity,
        window: None,
    })
}
