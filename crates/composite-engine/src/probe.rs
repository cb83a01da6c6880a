//! Media probing via ffprobe.
//!
//! Both inputs are probed before any frame is processed, so unreadable
//! or codec-less files surface as `UnsupportedMedia` synchronously.

use std::path::Path;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use chromix_common::error::{EngineError, EngineResult};

/// Stream information for one media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds.
    pub duration: f64,
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
    /// Average frame rate.
    pub fps: f64,
    /// Video codec name.
    pub video_codec: String,
    /// Whether the file carries at least one audio stream.
    pub has_audio: bool,
}

impl MediaInfo {
    /// Total video frames, rounded up.
    pub fn frame_count(&self) -> u64 {
        (self.duration * self.fps).ceil() as u64
    }
}

/// ffprobe JSON output shape (`-print_format json`).
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Probe a media file for stream information.
pub fn probe_media(ffprobe: &str, path: &Path) -> EngineResult<MediaInfo> {
    if !path.is_file() {
        return Err(EngineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| EngineError::tooling(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(EngineError::unsupported_media(
            path,
            format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    parse_probe_output(path, &output.stdout)
}

/// Turn raw ffprobe JSON into a [`MediaInfo`], rejecting files without a
/// decodable video stream.
fn parse_probe_output(path: &Path, json: &[u8]) -> EngineResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json).map_err(|e| {
        EngineError::unsupported_media(path, format!("unreadable ffprobe output: {e}"))
    })?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| EngineError::unsupported_media(path, "no video stream found"))?;

    let width = video.width.unwrap_or(0);
    let height = video.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(EngineError::unsupported_media(
            path,
            "video stream reports zero dimensions",
        ));
    }

    let fps = video
        .avg_frame_rate
        .as_deref()
        .or(video.r_frame_rate.as_deref())
        .and_then(parse_frame_rate)
        .ok_or_else(|| EngineError::unsupported_media(path, "no usable frame rate"))?;

    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    if duration <= 0.0 {
        return Err(EngineError::unsupported_media(
            path,
            "could not determine duration",
        ));
    }

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    Ok(MediaInfo {
        duration,
        width,
        height,
        fps,
        video_codec: video.codec_name.clone().unwrap_or_default(),
        has_audio,
    })
}

/// Parse a frame rate string (e.g. "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    let value = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (value.is_finite() && value > 0.0).then_some(value)
}
