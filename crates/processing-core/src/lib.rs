//! Chromix Processing Core — the per-frame compositing kernels.
//!
//! Everything needed to turn a green-screen frame into a composited
//! output frame, plus the audio mixing policies:
//! - **Keying:** perceptual color-space masking against a key color
//! - **Refinement:** edge softening and key-spill suppression
//! - **Transform:** scaling, placement, and alpha blending
//! - **Logo:** watermark overlay
//! - **Audio:** six-policy PCM track mixing
//! - **Timing:** the active-window gate
//!
//! This crate is pure computation — no I/O, no subprocesses.
//! All inputs are data; all outputs are data.

pub mod audio;
pub mod frame;
pub mod keying;
pub mod logo;
pub mod refine;
pub mod timing;
pub mod transform;

pub use audio::AudioMode;
pub use frame::{FrameBuffer, Mask};
pub use keying::KeyColorBounds;
pub use timing::ActiveWindow;
pub use transform::Interpolation;
