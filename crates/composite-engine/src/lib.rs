//! Chromix Composite Engine
//!
//! Frame-by-frame chroma-key compositing pipeline that strips a uniform
//! backdrop from a foreground clip and blends the subject onto a
//! background clip inside a caller-defined time window.
//!
//! # Pipeline Architecture
//!
//! ```text
//! foreground.mp4 ──► decode ──► key mask ──► refine ──┐
//!                                                     ├── transform + blend
//! background.mp4 ──► decode ─────────────────────────►┤         │
//!                                   timing gate ──────┘         │
//!                                                               ├── logo overlay
//! logo.png ─────────────────────────────────────────────────────┘         │
//!                                                                         ▼
//!                                                                  Encode (H.264)
//!                                                                         │
//! audio tracks ──► decode PCM ──► mix (6 policies) ──► mux ◄──────────────┘
//!                                                       │
//!                                                       ▼
//!                                                   output.mp4
//! ```
//!
//! Container decode/encode/mux is delegated to `ffmpeg` child processes;
//! every per-frame numeric stage runs in-process on flat pixel buffers.

pub mod accel;
pub mod ffmpeg;
pub mod params;
pub mod pipeline;
pub mod probe;

pub use params::{CompositeJob, KeyColor, LogoPlacement, LogoSpec};
pub use pipeline::{composite, CancelToken, CompositeOutcome, JobProgress, ProgressCallback};
pub use probe::MediaInfo;
