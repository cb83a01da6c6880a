//! The compositing pipeline driver.
//!
//! One job is one sequential per-frame loop: decode the next background
//! frame, key/refine/transform the matching foreground frame while the
//! timing gate is active, overlay the logo, and hand the result to the
//! encoder. Audio is mixed once after the loop and muxed with the video
//! into the final container.
//!
//! Failure semantics: parameter and media errors surface before any frame
//! is processed; mid-run failures carry the offending frame index; on any
//! terminal error (and on cancellation) child processes are reaped,
//! intermediate files removed, and partial output deleted.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chromix_common::config::ToolConfig;
use chromix_common::error::{EngineError, EngineResult};
use chromix_processing_core::audio::{self, AudioMode, MixInputs};
use chromix_processing_core::frame::{FrameBuffer, Mask};
use chromix_processing_core::keying::{backdrop_mask, KeyColorBounds};
use chromix_processing_core::logo::{blend_logo, LogoImage};
use chromix_processing_core::refine::{alpha_from_backdrop, blur_mask, suppress_spill};
use chromix_processing_core::timing::ActiveWindow;
use chromix_processing_core::transform::{
    blend_onto, centered_placement, resize_frame, resize_mask, scaled_size, Interpolation,
};

use crate::accel::select_encoder;
use crate::ffmpeg::{self, FrameDecoder, FrameEncoder};
use crate::params::{CompositeJob, LogoSpec};
use crate::probe::{probe_media, MediaInfo};

/// Progress callback invoked during processing.
pub type ProgressCallback = Box<dyn Fn(JobProgress) + Send>;

/// Cooperative cancellation token, checked between frames.
pub type CancelToken = Arc<AtomicBool>;

/// One progress update. Percentages are monotonically non-decreasing.
#[derive(Debug, Clone)]
pub struct JobProgress {
    pub percent: u8,
    pub message: String,
}

/// Terminal result of a successful run.
#[derive(Debug, Clone)]
pub struct CompositeOutcome {
    pub output_path: PathBuf,
    pub duration_secs: f64,
    pub frames_written: u64,
    pub elapsed_secs: f64,
    /// Completion time, RFC 3339.
    pub finished_at: String,
}

/// At most one progress update per this many frames.
const PROGRESS_FRAME_INTERVAL: u64 = 30;

/// Percent span reserved for the per-frame loop; the stages before and
/// after use the remainder, mirroring the loading/audio/mux milestones.
const COMPOSITE_PERCENT_BASE: u64 = 10;
const COMPOSITE_PERCENT_SPAN: u64 = 78;

/// Run a composite job to completion.
///
/// This is the engine's entry point: it validates the job, drives the
/// per-frame loop, and resolves to the terminal outcome. On failure or
/// cancellation any partial output has already been deleted.
pub async fn composite(
    job: CompositeJob,
    tools: ToolConfig,
    progress: Option<ProgressCallback>,
    cancel: Option<CancelToken>,
) -> EngineResult<CompositeOutcome> {
    tracing::info!(
        foreground = %job.foreground.display(),
        background = %job.background.display(),
        output = %job.output.display(),
        fast_mode = job.fast_mode,
        gpu_accel = job.gpu_accel,
        "Starting composite job"
    );

    let result = run_pipeline(&job, &tools, progress, cancel);
    match &result {
        Ok(outcome) => tracing::info!(
            frames = outcome.frames_written,
            elapsed_secs = outcome.elapsed_secs,
            "Composite job finished"
        ),
        Err(err) => {
            remove_partial_output(&job.output);
            if err.is_failure() {
                tracing::error!(error = %err, "Composite job failed");
            } else {
                tracing::info!("Composite job cancelled");
            }
        }
    }
    result
}

fn run_pipeline(
    job: &CompositeJob,
    tools: &ToolConfig,
    progress: Option<ProgressCallback>,
    cancel: Option<CancelToken>,
) -> EngineResult<CompositeOutcome> {
    let started = Instant::now();
    let mut reporter = ProgressReporter::new(progress);

    job.validate()?;
    ffmpeg::verify_tools(&tools.ffmpeg, &tools.ffprobe)?;
    reporter.emit(2, "Validating parameters");

    let fg_info = probe_media(&tools.ffprobe, &job.foreground)?;
    let bg_info = probe_media(&tools.ffprobe, &job.background)?;
    tracing::info!(
        bg_width = bg_info.width,
        bg_height = bg_info.height,
        bg_duration = bg_info.duration,
        bg_fps = bg_info.fps,
        fg_width = fg_info.width,
        fg_height = fg_info.height,
        fg_duration = fg_info.duration,
        "Inputs probed"
    );
    reporter.emit(5, "Loading videos");

    let window = job.window();
    let fps = bg_info.fps;
    let total_frames = bg_info.frame_count().max(1);
    let active_span = window.span_secs(bg_info.duration);

    let logo = job
        .logo
        .as_ref()
        .map(|spec| prepare_logo(spec, bg_info.width, bg_info.height, job.interpolation()))
        .transpose()?;
    reporter.emit(8, "Preparing overlays");

    let selection = select_encoder(&tools.ffmpeg, job.gpu_accel, job.fast_mode);

    if let Some(parent) = job.output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Video is encoded to an intermediate that only becomes the real
    // output at mux time; the temp path cleans itself up on any exit.
    let temp_video = tempfile::Builder::new()
        .prefix("chromix-video-")
        .suffix(".mp4")
        .tempfile()?
        .into_temp_path();

    let mut encoder = FrameEncoder::spawn(
        &tools.ffmpeg,
        &temp_video,
        bg_info.width,
        bg_info.height,
        fps,
        &selection,
    )?;
    let mut bg_decoder = FrameDecoder::spawn(
        &tools.ffmpeg,
        &job.background,
        bg_info.width,
        bg_info.height,
        None,
        None,
    )?;
    let mut fg_decoder = if active_span > 0.0 {
        Some(FrameDecoder::spawn(
            &tools.ffmpeg,
            &job.foreground,
            fg_info.width,
            fg_info.height,
            Some(fps),
            Some(active_span),
        )?)
    } else {
        None
    };

    let mut bg_frame = alloc_frame(bg_info.width, bg_info.height)?;
    let mut fg_frame = alloc_frame(fg_info.width, fg_info.height)?;

    let bounds = job.key.bounds();
    let interpolation = job.interpolation();
    let spill = job.effective_spill();
    let (scaled_w, scaled_h) = scaled_size(fg_info.width, fg_info.height, job.scale);

    let mut frames_written: u64 = 0;
    // The most recent processed foreground (subject + alpha, prescaled).
    // Held so a foreground that runs out before the window ends freezes
    // on its last frame instead of vanishing.
    let mut last_fg: Option<(FrameBuffer, Mask)> = None;

    reporter.emit(COMPOSITE_PERCENT_BASE as u8, "Compositing video");
    loop {
        if let Some(token) = &cancel {
            if token.load(Ordering::SeqCst) {
                return Err(EngineError::Cancelled);
            }
        }

        let more = bg_decoder
            .read_frame(&mut bg_frame)
            .map_err(|e| EngineError::decode(frames_written, format!("background: {e}")))?;
        if !more {
            break;
        }

        let t = frames_written as f64 / fps;
        if window.contains(t) {
            if let Some(decoder) = fg_decoder.as_mut() {
                match decoder.read_frame(&mut fg_frame) {
                    Ok(true) => {
                        last_fg = Some(process_foreground(
                            &mut fg_frame,
                            &bounds,
                            job.edge_blur,
                            spill,
                            interpolation,
                            (scaled_w, scaled_h),
                        ));
                    }
                    Ok(false) => {}
                    Err(e) => {
                        return Err(EngineError::decode(
                            frames_written,
                            format!("foreground: {e}"),
                        ));
                    }
                }
            }
            if let Some((subject, alpha)) = &last_fg {
                let placement = centered_placement(
                    bg_info.width,
                    bg_info.height,
                    subject.width,
                    subject.height,
                    job.position,
                );
                blend_onto(&mut bg_frame, subject, alpha, placement, job.opacity);
            }
        }

        if let Some(prepared) = &logo {
            if prepared.window.map_or(true, |w| w.contains(t)) {
                blend_logo(
                    &mut bg_frame,
                    &prepared.image,
                    prepared.x,
                    prepared.y,
                    prepared.opacity,
                );
            }
        }

        encoder
            .write_frame(&bg_frame)
            .map_err(|e| EngineError::encode(frames_written, e.to_string()))?;
        frames_written += 1;

        if frames_written % PROGRESS_FRAME_INTERVAL == 0 {
            let done = frames_written.min(total_frames);
            let percent = COMPOSITE_PERCENT_BASE + done * COMPOSITE_PERCENT_SPAN / total_frames;
            reporter.emit(
                percent as u8,
                format!("Compositing frame {frames_written}/{total_frames}"),
            );
        }
    }

    if let Some(decoder) = fg_decoder.take() {
        log_decoder_diagnostics("foreground", decoder.finish());
    }
    log_decoder_diagnostics("background", bg_decoder.finish());
    encoder
        .finish()
        .map_err(|e| EngineError::encode(frames_written, e))?;

    if frames_written == 0 {
        return Err(EngineError::decode(0, "background produced no frames"));
    }

    reporter.emit(90, "Mixing audio");
    let out_duration = frames_written as f64 / fps;
    let mixed = mix_audio(job, tools, &fg_info, &bg_info, window, out_duration)?;

    reporter.emit(95, "Muxing output");
    let pcm_path = write_pcm_temp(&mixed)?;
    drop(mixed);
    ffmpeg::mux_with_audio(&tools.ffmpeg, &temp_video, &pcm_path, &job.output)
        .map_err(|e| EngineError::encode(frames_written, e.to_string()))?;

    reporter.emit(100, "Complete");
    Ok(CompositeOutcome {
        output_path: job.output.clone(),
        duration_secs: out_duration,
        frames_written,
        elapsed_secs: started.elapsed().as_secs_f64(),
        finished_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Key, refine, and prescale one foreground frame.
///
/// Spill suppression mutates the frame in place before scaling, so the
/// scaled subject carries no key fringe into the blend.
fn process_foreground(
    frame: &mut FrameBuffer,
    bounds: &KeyColorBounds,
    edge_blur: u32,
    spill: f64,
    interpolation: Interpolation,
    scaled: (u32, u32),
) -> (FrameBuffer, Mask) {
    let mask = backdrop_mask(frame, bounds);
    let alpha = alpha_from_backdrop(&mask);
    let alpha = blur_mask(&alpha, edge_blur);
    suppress_spill(frame, &alpha, bounds.key_channel(), spill);

    let subject = resize_frame(frame, scaled.0, scaled.1, interpolation);
    let alpha = resize_mask(&alpha, scaled.0, scaled.1, interpolation);
    (subject, alpha)
}

/// A logo loaded, scaled, and positioned once at job start.
struct PreparedLogo {
    image: LogoImage,
    x: i64,
    y: i64,
    opacity: f64,
    window: Option<ActiveWindow>,
}

fn prepare_logo(
    spec: &LogoSpec,
    frame_w: u32,
    frame_h: u32,
    interpolation: Interpolation,
) -> EngineResult<PreparedLogo> {
    let decoded = image::open(&spec.path)
        .map_err(|e| {
            EngineError::unsupported_media(&spec.path, format!("cannot decode logo: {e}"))
        })?
        .to_rgba8();

    let (w, h) = scaled_size(decoded.width(), decoded.height(), spec.scale);
    let filter = match interpolation {
        Interpolation::Bilinear => image::imageops::FilterType::Triangle,
        Interpolation::Nearest => image::imageops::FilterType::Nearest,
    };
    let resized = image::imageops::resize(&decoded, w, h, filter);
    let image = LogoImage {
        data: resized.into_raw(),
        width: w,
        height: h,
    };

    let (x, y) = spec.placement.resolve(frame_w, frame_h, w, h);
    tracing::info!(width = w, height = h, x, y, "Logo prepared");
    Ok(PreparedLogo {
        image,
        x,
        y,
        opacity: spec.opacity,
        window: spec.window,
    })
}

/// Decode whichever PCM tracks the policy needs and mix the output track.
fn mix_audio(
    job: &CompositeJob,
    tools: &ToolConfig,
    fg_info: &MediaInfo,
    bg_info: &MediaInfo,
    window: ActiveWindow,
    duration_secs: f64,
) -> EngineResult<Vec<i16>> {
    let needs_fg = matches!(
        job.audio,
        AudioMode::Synced | AudioMode::ForegroundOnly | AudioMode::Both | AudioMode::TimedForeground
    );
    let needs_bg = matches!(
        job.audio,
        AudioMode::Synced | AudioMode::BackgroundOnly | AudioMode::Both | AudioMode::TimedForeground
    );

    let foreground = if needs_fg && fg_info.has_audio {
        ffmpeg::decode_audio(&tools.ffmpeg, &job.foreground)?
    } else {
        Vec::new()
    };
    let background = if needs_bg && bg_info.has_audio {
        ffmpeg::decode_audio(&tools.ffmpeg, &job.background)?
    } else {
        Vec::new()
    };

    Ok(audio::mix(
        MixInputs {
            foreground: &foreground,
            background: &background,
        },
        job.audio,
        window,
        duration_secs,
    ))
}

/// Write the mixed PCM to a self-cleaning temp file for the mux step.
fn write_pcm_temp(samples: &[i16]) -> EngineResult<tempfile::TempPath> {
    let mut file = tempfile::Builder::new()
        .prefix("chromix-audio-")
        .suffix(".pcm")
        .tempfile()?;
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    file.write_all(&bytes)?;
    Ok(file.into_temp_path())
}

/// Allocate a frame buffer, surfacing allocation failure as a job error
/// instead of aborting.
fn alloc_frame(width: u32, height: u32) -> EngineResult<FrameBuffer> {
    let len = width as usize * height as usize * 3;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| {
        EngineError::resource_exhausted(format!("cannot allocate {len}-byte frame buffer"))
    })?;
    data.resize(len, 0);
    Ok(FrameBuffer {
        data,
        width,
        height,
    })
}

fn log_decoder_diagnostics(stream: &str, stderr: String) {
    let trimmed = stderr.trim();
    if !trimmed.is_empty() {
        tracing::debug!(stream, stderr = trimmed, "Decoder diagnostics");
    }
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete partial output");
        } else {
            tracing::info!(path = %path.display(), "Deleted partial output");
        }
    }
}

/// Emits progress updates, clamped so percentages never move backwards.
struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last_percent: u8,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last_percent: 0,
        }
    }

    fn emit(&mut self, percent: u8, message: impl Into<String>) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        if let Some(cb) = &self.callback {
            cb(JobProgress {
                percent,
                message: message.into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_is_monotone() {
        let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&seen);
        let mut reporter = ProgressReporter::new(Some(Box::new(move |p: JobProgress| {
            sink.lock().unwrap().push(p.percent);
        })));

        reporter.emit(5, "a");
        reporter.emit(3, "never goes backwards");
        reporter.emit(50, "b");
        reporter.emit(120, "clamped");

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![5, 5, 50, 100]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_alloc_frame_matches_dimensions() {
        let frame = alloc_frame(320, 180).unwrap();
        assert_eq!(frame.data.len(), 320 * 180 * 3);
    }

    #[test]
    fn test_pcm_temp_roundtrip() {
        let samples = vec![0i16, 1000, -1000, i16::MAX, i16::MIN];
        let path = write_pcm_temp(&samples).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), samples.len() * 2);
        let decoded: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_process_foreground_keys_and_scales() {
        let mut frame = FrameBuffer::solid(8, 8, 0, 220, 10);
        // One subject pixel block.
        for y in 2..6 {
            for x in 2..6 {
                frame.set_pixel(x, y, [200, 60, 60]);
            }
        }
        let bounds = KeyColorBounds::green();
        let (subject, alpha) = process_foreground(
            &mut frame,
            &bounds,
            0,
            0.0,
            Interpolation::Nearest,
            (4, 4),
        );
        assert_eq!(subject.width, 4);
        assert_eq!(alpha.width, 4);
        // Center of the scaled frame is subject, corners are backdrop.
        assert_eq!(alpha.get(2, 2), 255);
        assert_eq!(alpha.get(0, 0), 0);
    }
}
