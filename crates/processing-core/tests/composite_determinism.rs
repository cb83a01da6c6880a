//! End-to-end determinism of the per-frame processing chain.
//!
//! Runs the full mask → refine → transform → overlay chain over a
//! synthetic clip twice, from scratch, and requires bit-identical output.

use chromix_processing_core::frame::FrameBuffer;
use chromix_processing_core::keying::{backdrop_mask, KeyColorBounds, BACKDROP};
use chromix_processing_core::refine::{alpha_from_backdrop, blur_mask, suppress_spill};
use chromix_processing_core::timing::ActiveWindow;
use chromix_processing_core::transform::{
    blend_onto, centered_placement, resize_frame, resize_mask, scaled_size, Interpolation,
};

/// A synthetic green-screen frame: green backdrop with a moving
/// off-key rectangle standing in for the subject.
fn synthetic_foreground(frame_index: u32) -> FrameBuffer {
    let mut frame = FrameBuffer::solid(64, 36, 30, 200, 40);
    let offset = frame_index % 16;
    for y in 8..28 {
        for x in (10 + offset)..(34 + offset) {
            frame.set_pixel(x, y, [180, 140, 120]);
        }
    }
    frame
}

fn synthetic_background(frame_index: u32) -> FrameBuffer {
    let shade = (frame_index * 7 % 255) as u8;
    FrameBuffer::solid(128, 72, shade, 60, 200 - shade.min(200))
}

fn fnv1a_64(input: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn render_clip_signature() -> u64 {
    let bounds = KeyColorBounds::green();
    let window = ActiveWindow::new(0.2, Some(0.8));
    let fps = 10.0;
    let mut signature: u64 = 0;

    for frame_index in 0..10u32 {
        let t = frame_index as f64 / fps;
        let mut background = synthetic_background(frame_index);

        if window.contains(t) {
            let mut foreground = synthetic_foreground(frame_index);
            let mask = backdrop_mask(&foreground, &bounds);
            let alpha = alpha_from_backdrop(&mask);
            let alpha = blur_mask(&alpha, 5);
            suppress_spill(&mut foreground, &alpha, bounds.key_channel(), 0.6);

            let (w, h) = scaled_size(foreground.width, foreground.height, 1.5);
            let scaled = resize_frame(&foreground, w, h, Interpolation::Bilinear);
            let scaled_alpha = resize_mask(&alpha, w, h, Interpolation::Bilinear);
            let placement = centered_placement(background.width, background.height, w, h, (5, -3));
            blend_onto(&mut background, &scaled, &scaled_alpha, placement, 0.9);
        }

        signature ^= fnv1a_64(&background.data).rotate_left(frame_index);
    }

    signature
}

#[test]
fn composite_chain_is_deterministic_across_runs() {
    let first = render_clip_signature();
    let second = render_clip_signature();
    assert_eq!(first, second);
}

#[test]
fn uniform_green_clip_is_fully_masked_every_frame() {
    let bounds = KeyColorBounds::green();
    for _ in 0..10 {
        let frame = FrameBuffer::solid(48, 27, 0, 220, 10);
        let mask = backdrop_mask(&frame, &bounds);
        let covered = mask.data.iter().filter(|&&v| v == BACKDROP).count();
        assert_eq!(covered, mask.data.len());
    }
}

#[test]
fn inactive_frames_pass_background_through_unchanged() {
    let window = ActiveWindow::new(5.0, Some(15.0));
    let background = synthetic_background(3);
    let mut output = background.clone();

    // Outside the window nothing touches the frame; the transformer is
    // never invoked, matching the driver's gate.
    if window.contains(2.0) {
        let foreground = synthetic_foreground(3);
        let mask = backdrop_mask(&foreground, &KeyColorBounds::green());
        let alpha = alpha_from_backdrop(&mask);
        let placement = centered_placement(output.width, output.height, 64, 36, (0, 0));
        blend_onto(&mut output, &foreground, &alpha, placement, 1.0);
    }

    assert_eq!(output, background);
}
