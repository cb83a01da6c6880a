//! Mask refinement: edge softening and key-spill suppression.
//!
//! The raw key mask is a hard backdrop/subject classification. Refinement
//! inverts it into a subject alpha mask, widens the boundary into a smooth
//! ramp with a separable blur, and optionally pulls the key color out of
//! half-covered edge pixels so the subject keeps no colored fringe.

use crate::frame::{FrameBuffer, Mask};
use crate::keying::{KeyChannel, BACKDROP};

/// Invert a backdrop-confidence mask into a subject alpha mask.
pub fn alpha_from_backdrop(mask: &Mask) -> Mask {
    let mut alpha = Mask::new(mask.width, mask.height);
    for (src, dst) in mask.data.iter().zip(alpha.data.iter_mut()) {
        *dst = BACKDROP - src;
    }
    alpha
}

/// Separable box blur with an odd kernel width.
///
/// `kernel` of 0 or 1 returns the mask unchanged. Windows are clamped at
/// the borders and divided by the actual sample count, so edge alpha is
/// not darkened.
pub fn blur_mask(mask: &Mask, kernel: u32) -> Mask {
    if kernel <= 1 {
        return mask.clone();
    }
    debug_assert!(kernel % 2 == 1, "blur kernel must be odd");

    let radius = (kernel / 2) as i64;
    let w = mask.width as i64;
    let h = mask.height as i64;

    // Horizontal pass.
    let mut horizontal = Mask::new(mask.width, mask.height);
    for y in 0..h {
        for x in 0..w {
            let lo = (x - radius).max(0);
            let hi = (x + radius).min(w - 1);
            let mut sum = 0u32;
            for sx in lo..=hi {
                sum += mask.data[(y * w + sx) as usize] as u32;
            }
            let count = (hi - lo + 1) as u32;
            horizontal.data[(y * w + x) as usize] = (sum / count) as u8;
        }
    }

    // Vertical pass.
    let mut blurred = Mask::new(mask.width, mask.height);
    for y in 0..h {
        let lo = (y - radius).max(0);
        let hi = (y + radius).min(h - 1);
        for x in 0..w {
            let mut sum = 0u32;
            for sy in lo..=hi {
                sum += horizontal.data[(sy * w + x) as usize] as u32;
            }
            let count = (hi - lo + 1) as u32;
            blurred.data[(y * w + x) as usize] = (sum / count) as u8;
        }
    }

    blurred
}

/// Pull the key color out of edge pixels still tinted by the backdrop.
///
/// Only pixels on the alpha ramp (0 < alpha < 255) are touched; fully
/// opaque subject pixels keep their color. Where the key channel exceeds
/// the stronger of the other two channels, the excess is reduced in
/// proportion to `strength` (0.0 = off, 1.0 = clamp to the ceiling).
pub fn suppress_spill(frame: &mut FrameBuffer, alpha: &Mask, channel: KeyChannel, strength: f64) {
    if strength <= 0.0 {
        return;
    }
    let strength = strength.min(1.0) as f32;
    let key = match channel {
        KeyChannel::Red => 0,
        KeyChannel::Green => 1,
        KeyChannel::Blue => 2,
    };

    for (pixel, &a) in frame.data.chunks_exact_mut(3).zip(alpha.data.iter()) {
        if a == 0 || a == 255 {
            continue;
        }
        let others = [pixel[(key + 1) % 3], pixel[(key + 2) % 3]];
        let ceiling = others[0].max(others[1]);
        if pixel[key] > ceiling {
            let excess = (pixel[key] - ceiling) as f32;
            pixel[key] = (pixel[key] as f32 - excess * strength).round() as u8;
        }
    }
}
