//! Composite job parameters and validation.
//!
//! A [`CompositeJob`] is built once from caller input, validated as a
//! whole, and then treated as immutable for the rest of the run. The
//! engine fails closed: an out-of-range value is rejected with the field
//! name before any frame is touched, never silently replaced.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use chromix_common::error::{EngineError, EngineResult};
use chromix_processing_core::audio::AudioMode;
use chromix_processing_core::keying::KeyColorBounds;
use chromix_processing_core::timing::ActiveWindow;
use chromix_processing_core::transform::Interpolation;

/// Key color selection: a preset or explicit HSV bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyColor {
    Green,
    Blue,
    Custom(KeyColorBounds),
}

impl KeyColor {
    /// The HSV interval this selection keys against.
    pub fn bounds(&self) -> KeyColorBounds {
        match self {
            KeyColor::Green => KeyColorBounds::green(),
            KeyColor::Blue => KeyColorBounds::blue(),
            KeyColor::Custom(bounds) => *bounds,
        }
    }
}

/// Where the logo sits on the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogoPlacement {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    /// Explicit top-left offset in output pixels.
    At { x: i64, y: i64 },
}

/// Corners keep a small margin so the watermark never touches the edge.
const CORNER_MARGIN: i64 = 3;

impl LogoPlacement {
    /// Resolve to a top-left position for a logo of the given size.
    /// Corner placements are clamped inside the frame; explicit offsets
    /// are taken as-is (blending clips at the frame bounds).
    pub fn resolve(&self, frame_w: u32, frame_h: u32, logo_w: u32, logo_h: u32) -> (i64, i64) {
        let right = (frame_w as i64 - logo_w as i64 - CORNER_MARGIN).max(CORNER_MARGIN);
        let bottom = (frame_h as i64 - logo_h as i64 - CORNER_MARGIN).max(CORNER_MARGIN);
        match *self {
            LogoPlacement::TopLeft => (CORNER_MARGIN, CORNER_MARGIN),
            LogoPlacement::TopRight => (right, CORNER_MARGIN),
            LogoPlacement::BottomLeft => (CORNER_MARGIN, bottom),
            LogoPlacement::BottomRight => (right, bottom),
            LogoPlacement::At { x, y } => (x, y),
        }
    }
}

/// Optional watermark overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoSpec {
    /// Path to a still image with its own alpha channel.
    pub path: PathBuf,

    pub placement: LogoPlacement,

    /// Scale applied to the source image once at job start.
    pub scale: f64,

    /// Overlay opacity on top of the image's own alpha.
    pub opacity: f64,

    /// Optional time window; absent means the logo shows on every frame.
    /// Independent of the composite's active window.
    pub window: Option<ActiveWindow>,
}

/// Validated, immutable configuration for one compositing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeJob {
    /// Green/blue-screen clip to key.
    pub foreground: PathBuf,

    /// Clip the subject is composited onto. Its duration, resolution,
    /// and frame rate define the output.
    pub background: PathBuf,

    /// Output media file.
    pub output: PathBuf,

    /// When the composite becomes active (seconds).
    pub start_time: f64,

    /// When it deactivates; `None` runs to the end of the background.
    pub end_time: Option<f64>,

    /// Signed pixel offset of the subject from the background center.
    pub position: (i32, i32),

    /// Foreground scale factor, > 0.
    pub scale: f64,

    /// Foreground blend opacity in [0, 1].
    pub opacity: f64,

    pub key: KeyColor,

    /// Odd mask-blur kernel width, or 0 to disable edge softening.
    pub edge_blur: u32,

    /// Key-spill suppression strength in [0, 1].
    pub spill_reduction: f64,

    pub audio: AudioMode,

    pub logo: Option<LogoSpec>,

    /// Trade quality for speed: nearest-neighbor scaling, no spill pass.
    pub fast_mode: bool,

    /// Prefer a hardware H.264 encoder, falling back to software.
    pub gpu_accel: bool,
}

impl CompositeJob {
    /// A job with the engine defaults for everything but the paths.
    pub fn new(
        foreground: impl Into<PathBuf>,
        background: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            foreground: foreground.into(),
            background: background.into(),
            output: output.into(),
            start_time: 0.0,
            end_time: None,
            position: (0, 0),
            scale: 1.0,
            opacity: 1.0,
            key: KeyColor::Green,
            edge_blur: 5,
            spill_reduction: 0.5,
            audio: AudioMode::Synced,
            logo: None,
            fast_mode: false,
            gpu_accel: false,
        }
    }

    /// The composite's active window.
    pub fn window(&self) -> ActiveWindow {
        ActiveWindow::new(self.start_time, self.end_time)
    }

    /// Interpolation for the scaling stages, fixed at job start.
    pub fn interpolation(&self) -> Interpolation {
        if self.fast_mode {
            Interpolation::Nearest
        } else {
            Interpolation::Bilinear
        }
    }

    /// Spill strength actually applied (fast mode skips the pass).
    pub fn effective_spill(&self) -> f64 {
        if self.fast_mode {
            0.0
        } else {
            self.spill_reduction
        }
    }

    /// Check every invariant, naming the offending field on failure.
    pub fn validate(&self) -> EngineResult<()> {
        require_file(&self.foreground)?;
        require_file(&self.background)?;

        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(EngineError::invalid_parameter(
                "scale",
                "must be finite and greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(EngineError::invalid_parameter(
                "opacity",
                "must be within [0.0, 1.0]",
            ));
        }
        if !(0.0..=1.0).contains(&self.spill_reduction) {
            return Err(EngineError::invalid_parameter(
                "spill_reduction",
                "must be within [0.0, 1.0]",
            ));
        }
        if !(self.start_time.is_finite() && self.start_time >= 0.0) {
            return Err(EngineError::invalid_parameter(
                "start_time",
                "must be finite and non-negative",
            ));
        }
        if let Some(end) = self.end_time {
            if !(end.is_finite() && end > self.start_time) {
                return Err(EngineError::invalid_parameter(
                    "end_time",
                    "must be greater than start_time",
                ));
            }
        }
        if self.edge_blur != 0 && self.edge_blur % 2 == 0 {
            return Err(EngineError::invalid_parameter(
                "edge_blur",
                "must be zero or an odd kernel width",
            ));
        }
        if self.key.bounds().is_empty() {
            return Err(EngineError::invalid_parameter(
                "key",
                "lower bound exceeds upper bound; the color interval is empty",
            ));
        }

        if let Some(logo) = &self.logo {
            require_file(&logo.path)?;
            if !(logo.scale.is_finite() && logo.scale > 0.0) {
                return Err(EngineError::invalid_parameter(
                    "logo.scale",
                    "must be finite and greater than zero",
                ));
            }
            if !(0.0..=1.0).contains(&logo.opacity) {
                return Err(EngineError::invalid_parameter(
                    "logo.opacity",
                    "must be within [0.0, 1.0]",
                ));
            }
            if let Some(window) = logo.window {
                if let Some(end) = window.end_secs {
                    if end <= window.start_secs {
                        return Err(EngineError::invalid_parameter(
                            "logo.window",
                            "end must be greater than start",
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

fn require_file(path: &Path) -> EngineResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(EngineError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}
