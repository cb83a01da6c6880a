//! Encoder selection: the fast-mode and hardware-acceleration strategy.
//!
//! Both knobs are resolved once at job start and never switched mid-run.
//! Hardware acceleration is applied at the codec stage; when no hardware
//! H.264 encoder is usable the engine logs a warning and continues on the
//! software path — the only silent degradation in the pipeline.

use std::process::{Command, Stdio};

/// The encoder configuration a job runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSelection {
    /// ffmpeg encoder name (e.g. "libx264", "h264_nvenc").
    pub codec: String,

    /// x264 speed preset; hardware encoders use their driver defaults.
    pub preset: Option<String>,

    pub hardware: bool,
}

/// Hardware H.264 encoders in probe order.
const HARDWARE_CANDIDATES: [&str; 4] = [
    "h264_nvenc",
    "h264_vaapi",
    "h264_videotoolbox",
    "h264_qsv",
];

/// Choose the encoder for a job.
pub fn select_encoder(ffmpeg: &str, gpu_accel: bool, fast_mode: bool) -> EncoderSelection {
    if gpu_accel {
        if let Some(codec) = probe_hardware_encoder(ffmpeg) {
            tracing::info!(codec, "Using hardware video encoder");
            return EncoderSelection {
                codec: codec.to_string(),
                preset: None,
                hardware: true,
            };
        }
        tracing::warn!("No hardware H.264 encoder available; falling back to software x264");
    }

    EncoderSelection {
        codec: "libx264".to_string(),
        preset: Some(if fast_mode { "ultrafast" } else { "medium" }.to_string()),
        hardware: false,
    }
}

fn probe_hardware_encoder(ffmpeg: &str) -> Option<&'static str> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let listing = String::from_utf8_lossy(&output.stdout);
    pick_hardware_codec(&listing)
}

/// Pick the first known hardware encoder present in `ffmpeg -encoders`
/// output.
fn pick_hardware_codec(listing: &str) -> Option<&'static str> {
    HARDWARE_CANDIDATES
        .into_iter()
        .find(|codec| listing.lines().any(|line| line.contains(codec)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_prefers_nvenc() {
        let listing = "\
 V....D h264_vaapi           VAAPI H.264 encoder
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder";
        assert_eq!(pick_hardware_codec(listing), Some("h264_nvenc"));
    }

    #[test]
    fn test_pick_none_when_software_only() {
        let listing = " V..... libx264              H.264 / AVC (codec h264)";
        assert_eq!(pick_hardware_codec(listing), None);
    }

    #[test]
    fn test_missing_ffmpeg_falls_back_to_software() {
        let selection = select_encoder("chromix-no-such-binary", true, false);
        assert_eq!(selection.codec, "libx264");
        assert!(!selection.hardware);
        assert_eq!(selection.preset.as_deref(), Some("medium"));
    }

    #[test]
    fn test_fast_mode_preset() {
        let selection = select_encoder("chromix-no-such-binary", false, true);
        assert_eq!(selection.preset.as_deref(), Some("ultrafast"));
    }
}
