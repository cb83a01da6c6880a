//! Chroma keying: perceptual color-space masking against a key color.
//!
//! Pixels are converted to HSV and tested channel-wise against a
//! configured interval. The hue axis uses the half-degree convention
//! (0–179), so the full circle fits a byte and tolerances line up with
//! the values camera operators already use for green-screen work.

use serde::{Deserialize, Serialize};

use crate::frame::{FrameBuffer, Mask};

/// Mask value assigned to backdrop pixels.
pub const BACKDROP: u8 = 255;

/// Inclusive HSV interval describing the backdrop color.
///
/// Channels are `[hue, saturation, value]` with hue on the 0–179
/// half-degree scale. Bounds form one contiguous interval per channel;
/// hue ranges that wrap the origin (red keys) are not expressible — use
/// the green or blue presets, or a custom non-wrapping interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColorBounds {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

/// The RGB channel a key color reflects most strongly, used to decide
/// which channel spill suppression should pull down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChannel {
    Red,
    Green,
    Blue,
}

impl KeyColorBounds {
    /// Green-screen preset: a wide hue band tolerant of uneven lighting.
    pub fn green() -> Self {
        Self {
            lower: [35, 40, 40],
            upper: [85, 255, 255],
        }
    }

    /// Blue-screen preset.
    pub fn blue() -> Self {
        Self {
            lower: [100, 40, 40],
            upper: [130, 255, 255],
        }
    }

    /// Custom interval from explicit lower/upper triples.
    pub fn custom(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Whether any channel interval is empty (lower > upper).
    pub fn is_empty(&self) -> bool {
        (0..3).any(|c| self.lower[c] > self.upper[c])
    }

    /// Whether an HSV triple falls inside the interval on all channels.
    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }

    /// The RGB channel dominated by this key color, from the hue center.
    pub fn key_channel(&self) -> KeyChannel {
        let center = (self.lower[0] as u32 + self.upper[0] as u32) / 2;
        match center {
            30..=89 => KeyChannel::Green,
            90..=149 => KeyChannel::Blue,
            _ => KeyChannel::Red,
        }
    }
}

/// Convert an RGB pixel to HSV with hue on the 0–179 scale.
#[inline]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let rf = r as f32;
    let gf = g as f32;
    let bf = b as f32;

    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let h_deg = if delta <= 0.0 {
        0.0
    } else if max == rf {
        let h = 60.0 * (gf - bf) / delta;
        if h < 0.0 {
            h + 360.0
        } else {
            h
        }
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };

    let h = (h_deg / 2.0).round().min(179.0) as u8;
    [h, s.round() as u8, v.round() as u8]
}

/// Classify every pixel of `frame` as backdrop or subject.
///
/// Returns a mask holding backdrop confidence: [`BACKDROP`] where all
/// three HSV channels fall inside `bounds`, 0 elsewhere. Pure function
/// of its inputs.
pub fn backdrop_mask(frame: &FrameBuffer, bounds: &KeyColorBounds) -> Mask {
    let mut mask = Mask::new(frame.width, frame.height);
    for (pixel, out) in frame.data.chunks_exact(3).zip(mask.data.iter_mut()) {
        let hsv = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        if bounds.contains(hsv) {
            *out = BACKDROP;
        }
    }
    mask
}
