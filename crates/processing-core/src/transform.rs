//! Geometric transform and alpha blending.
//!
//! Scales the keyed foreground (frame + alpha mask together, so coverage
//! stays aligned with color), places it relative to the background center,
//! and blends it in. Placement is clipped to the background bounds — a
//! subject pushed past an edge is cropped, never an error.

use serde::{Deserialize, Serialize};

use crate::frame::{FrameBuffer, Mask};

/// Interpolation used when resizing frames and masks.
///
/// `Bilinear` is the quality path; `Nearest` is the fast-mode path.
/// The choice is made once per job and never switched mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Bilinear,
    Nearest,
}

/// Top-left placement of the foreground on the background, in background
/// pixel coordinates. May be negative or exceed the bounds; blending clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
}

/// Placement for a foreground of the given size: background center plus
/// the caller's signed offset.
pub fn centered_placement(
    bg_width: u32,
    bg_height: u32,
    fg_width: u32,
    fg_height: u32,
    offset: (i32, i32),
) -> Placement {
    Placement {
        x: (bg_width as i64 - fg_width as i64) / 2 + offset.0 as i64,
        y: (bg_height as i64 - fg_height as i64) / 2 + offset.1 as i64,
    }
}

/// Dimensions after applying a scale factor, floored at one pixel.
pub fn scaled_size(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Resize an RGB frame.
pub fn resize_frame(
    src: &FrameBuffer,
    width: u32,
    height: u32,
    interpolation: Interpolation,
) -> FrameBuffer {
    if width == src.width && height == src.height {
        return src.clone();
    }
    let mut dst = FrameBuffer::new(width, height);
    let sx = src.width as f32 / width as f32;
    let sy = src.height as f32 / height as f32;

    for y in 0..height {
        for x in 0..width {
            let rgb = match interpolation {
                Interpolation::Nearest => {
                    let (nx, ny) = nearest_source(x, y, sx, sy, src.width, src.height);
                    src.pixel(nx, ny)
                }
                Interpolation::Bilinear => {
                    let (x0, x1, fx) = bilinear_axis(x, sx, src.width);
                    let (y0, y1, fy) = bilinear_axis(y, sy, src.height);
                    let mut rgb = [0u8; 3];
                    for (c, out) in rgb.iter_mut().enumerate() {
                        let tl = src.pixel(x0, y0)[c] as f32;
                        let tr = src.pixel(x1, y0)[c] as f32;
                        let bl = src.pixel(x0, y1)[c] as f32;
                        let br = src.pixel(x1, y1)[c] as f32;
                        let top = tl + (tr - tl) * fx;
                        let bottom = bl + (br - bl) * fx;
                        *out = (top + (bottom - top) * fy).round() as u8;
                    }
                    rgb
                }
            };
            dst.set_pixel(x, y, rgb);
        }
    }
    dst
}

/// Resize a single-channel mask with the same mapping as [`resize_frame`].
pub fn resize_mask(src: &Mask, width: u32, height: u32, interpolation: Interpolation) -> Mask {
    if width == src.width && height == src.height {
        return src.clone();
    }
    let mut dst = Mask::new(width, height);
    let sx = src.width as f32 / width as f32;
    let sy = src.height as f32 / height as f32;

    for y in 0..height {
        for x in 0..width {
            let value = match interpolation {
                Interpolation::Nearest => {
                    let (nx, ny) = nearest_source(x, y, sx, sy, src.width, src.height);
                    src.get(nx, ny)
                }
                Interpolation::Bilinear => {
                    let (x0, x1, fx) = bilinear_axis(x, sx, src.width);
                    let (y0, y1, fy) = bilinear_axis(y, sy, src.height);
                    let top = src.get(x0, y0) as f32 + (src.get(x1, y0) as f32 - src.get(x0, y0) as f32) * fx;
                    let bottom = src.get(x0, y1) as f32 + (src.get(x1, y1) as f32 - src.get(x0, y1) as f32) * fx;
                    (top + (bottom - top) * fy).round() as u8
                }
            };
            dst.set(x, y, value);
        }
    }
    dst
}

/// Blend the foreground onto the background in place.
///
/// Per pixel: `out = bg * (1 - a·opacity) + fg * (a·opacity)` with
/// `a = alpha / 255`. Opacity of zero leaves the background untouched.
pub fn blend_onto(
    bg: &mut FrameBuffer,
    fg: &FrameBuffer,
    alpha: &Mask,
    placement: Placement,
    opacity: f64,
) {
    if opacity <= 0.0 {
        return;
    }
    let opacity = opacity.min(1.0) as f32;

    let dst_x0 = placement.x.max(0);
    let dst_y0 = placement.y.max(0);
    let dst_x1 = (placement.x + fg.width as i64).min(bg.width as i64);
    let dst_y1 = (placement.y + fg.height as i64).min(bg.height as i64);
    if dst_x0 >= dst_x1 || dst_y0 >= dst_y1 {
        return;
    }

    for dy in dst_y0..dst_y1 {
        let sy = (dy - placement.y) as u32;
        for dx in dst_x0..dst_x1 {
            let sx = (dx - placement.x) as u32;
            let a = alpha.get(sx, sy) as f32 / 255.0 * opacity;
            if a <= 0.0 {
                continue;
            }
            let fg_px = fg.pixel(sx, sy);
            let i = bg.idx(dx as u32, dy as u32);
            for c in 0..3 {
                let bg_v = bg.data[i + c] as f32;
                let fg_v = fg_px[c] as f32;
                bg.data[i + c] = (bg_v * (1.0 - a) + fg_v * a).round() as u8;
            }
        }
    }
}

#[inline]
fn nearest_source(x: u32, y: u32, sx: f32, sy: f32, src_w: u32, src_h: u32) -> (u32, u32) {
    let nx = (((x as f32 + 0.5) * sx) as u32).min(src_w - 1);
    let ny = (((y as f32 + 0.5) * sy) as u32).min(src_h - 1);
    (nx, ny)
}

#[inline]
fn bilinear_axis(dst: u32, scale: f32, src_len: u32) -> (u32, u32, f32) {
    let pos = ((dst as f32 + 0.5) * scale - 0.5).max(0.0);
    let i0 = (pos as u32).min(src_len - 1);
    let i1 = (i0 + 1).min(src_len - 1);
    (i0, i1, pos - i0 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_size_never_zero() {
        assert_eq!(scaled_size(100, 50, 0.5), (50, 25));
        assert_eq!(scaled_size(3, 3, 0.01), (1, 1));
        assert_eq!(scaled_size(100, 100, 1.0), (100, 100));
    }

    #[test]
    fn test_centered_placement() {
        let p = centered_placement(100, 100, 40, 20, (0, 0));
        assert_eq!((p.x, p.y), (30, 40));
        let p = centered_placement(100, 100, 40, 20, (-50, 10));
        assert_eq!((p.x, p.y), (-20, 50));
    }

    #[test]
    fn test_resize_identity() {
        let frame = FrameBuffer::solid(7, 5, 9, 8, 7);
        assert_eq!(resize_frame(&frame, 7, 5, Interpolation::Bilinear), frame);
    }

    #[test]
    fn test_resize_preserves_solid_color() {
        let frame = FrameBuffer::solid(8, 8, 10, 200, 30);
        for interp in [Interpolation::Bilinear, Interpolation::Nearest] {
            let scaled = resize_frame(&frame, 4, 4, interp);
            assert_eq!(scaled.width, 4);
            assert!(scaled
                .data
                .chunks_exact(3)
                .all(|p| p[0] == 10 && p[1] == 200 && p[2] == 30));
        }
    }

    #[test]
    fn test_blend_zero_opacity_is_identity() {
        let mut bg = FrameBuffer::solid(10, 10, 1, 2, 3);
        let expected = bg.clone();
        let fg = FrameBuffer::solid(4, 4, 200, 200, 200);
        let alpha = Mask::filled(4, 4, 255);
        blend_onto(&mut bg, &fg, &alpha, Placement { x: 3, y: 3 }, 0.0);
        assert_eq!(bg, expected);
    }

    #[test]
    fn test_blend_full_alpha_replaces_pixels() {
        let mut bg = FrameBuffer::solid(6, 6, 0, 0, 0);
        let fg = FrameBuffer::solid(2, 2, 250, 10, 10);
        let alpha = Mask::filled(2, 2, 255);
        blend_onto(&mut bg, &fg, &alpha, Placement { x: 2, y: 2 }, 1.0);
        assert_eq!(bg.pixel(2, 2), [250, 10, 10]);
        assert_eq!(bg.pixel(3, 3), [250, 10, 10]);
        // Outside the placed region nothing changed.
        assert_eq!(bg.pixel(0, 0), [0, 0, 0]);
        assert_eq!(bg.pixel(5, 5), [0, 0, 0]);
    }

    #[test]
    fn test_blend_half_alpha_mixes() {
        let mut bg = FrameBuffer::solid(2, 2, 0, 0, 0);
        let fg = FrameBuffer::solid(2, 2, 200, 100, 50);
        let alpha = Mask::filled(2, 2, 128);
        blend_onto(&mut bg, &fg, &alpha, Placement { x: 0, y: 0 }, 1.0);
        let [r, g, b] = bg.pixel(0, 0);
        assert!((r as i32 - 100).abs() <= 1);
        assert!((g as i32 - 50).abs() <= 1);
        assert!((b as i32 - 25).abs() <= 1);
    }

    #[test]
    fn test_blend_clips_out_of_bounds_placement() {
        let mut bg = FrameBuffer::solid(4, 4, 0, 0, 0);
        let fg = FrameBuffer::solid(4, 4, 255, 255, 255);
        let alpha = Mask::filled(4, 4, 255);

        // Half off the top-left corner.
        blend_onto(&mut bg, &fg, &alpha, Placement { x: -2, y: -2 }, 1.0);
        assert_eq!(bg.pixel(0, 0), [255, 255, 255]);
        assert_eq!(bg.pixel(1, 1), [255, 255, 255]);
        assert_eq!(bg.pixel(2, 2), [0, 0, 0]);

        // Entirely outside: no panic, no change.
        let mut bg2 = FrameBuffer::solid(4, 4, 7, 7, 7);
        let expected = bg2.clone();
        blend_onto(&mut bg2, &fg, &alpha, Placement { x: 100, y: 100 }, 1.0);
        assert_eq!(bg2, expected);
    }
}
