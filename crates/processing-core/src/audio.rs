//! Audio track mixing.
//!
//! Builds one output PCM track from the foreground/background inputs
//! under one of six policies, aligned to the composite's active window.
//! All policies produce exactly the requested output duration: inputs
//! that are too short are padded with silence, too long are trimmed.
//!
//! Samples are interleaved stereo i16 at the engine rate. Policies that
//! sum tracks accumulate in i32 and rescale by the peak, so an overdriven
//! mix is turned down rather than hard-clipped.

use serde::{Deserialize, Serialize};

use crate::timing::ActiveWindow;

/// Engine-internal PCM sample rate (Hz).
pub const SAMPLE_RATE: u32 = 44_100;

/// Engine-internal channel count (interleaved stereo).
pub const CHANNELS: usize = 2;

/// Audio mixing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioMode {
    /// Background for the full duration, foreground added in during the
    /// active window.
    Synced,
    /// Background track only.
    BackgroundOnly,
    /// Foreground track only, from t = 0.
    ForegroundOnly,
    /// Both tracks summed for the full duration, peak-normalized.
    Both,
    /// Background (or silence) outside the active window, foreground
    /// only inside it.
    TimedForeground,
    /// Silent track.
    None,
}

/// Decoded input tracks for one mix. Either slice may be empty.
#[derive(Debug, Clone, Copy)]
pub struct MixInputs<'a> {
    pub foreground: &'a [i16],
    pub background: &'a [i16],
}

/// Number of interleaved samples an output of `duration_secs` holds.
pub fn output_len(duration_secs: f64) -> usize {
    (duration_secs.max(0.0) * SAMPLE_RATE as f64).round() as usize * CHANNELS
}

/// Mix one output track of exactly `duration_secs` seconds.
pub fn mix(
    inputs: MixInputs<'_>,
    mode: AudioMode,
    window: ActiveWindow,
    duration_secs: f64,
) -> Vec<i16> {
    let total_frames = (duration_secs.max(0.0) * SAMPLE_RATE as f64).round() as usize;
    let start_frame = secs_to_frame(window.start_secs).min(total_frames);
    let end_frame = secs_to_frame(window.bounded_end(duration_secs))
        .min(total_frames)
        .max(start_frame);

    match mode {
        AudioMode::None => vec![0i16; total_frames * CHANNELS],
        AudioMode::BackgroundOnly => copy_padded(inputs.background, total_frames),
        AudioMode::ForegroundOnly => copy_padded(inputs.foreground, total_frames),
        AudioMode::TimedForeground => {
            let mut out = vec![0i16; total_frames * CHANNELS];
            for frame in 0..total_frames {
                let in_window = frame >= start_frame && frame < end_frame;
                for ch in 0..CHANNELS {
                    out[frame * CHANNELS + ch] = if in_window {
                        sample(inputs.foreground, frame - start_frame, ch) as i16
                    } else {
                        sample(inputs.background, frame, ch) as i16
                    };
                }
            }
            out
        }
        AudioMode::Both => {
            let mut acc = vec![0i32; total_frames * CHANNELS];
            for frame in 0..total_frames {
                for ch in 0..CHANNELS {
                    acc[frame * CHANNELS + ch] =
                        sample(inputs.background, frame, ch) + sample(inputs.foreground, frame, ch);
                }
            }
            rescale_peak(&acc)
        }
        AudioMode::Synced => {
            let mut acc = vec![0i32; total_frames * CHANNELS];
            for frame in 0..total_frames {
                let in_window = frame >= start_frame && frame < end_frame;
                for ch in 0..CHANNELS {
                    let mut v = sample(inputs.background, frame, ch);
                    if in_window {
                        v += sample(inputs.foreground, frame - start_frame, ch);
                    }
                    acc[frame * CHANNELS + ch] = v;
                }
            }
            rescale_peak(&acc)
        }
    }
}

#[inline]
fn secs_to_frame(secs: f64) -> usize {
    (secs.max(0.0) * SAMPLE_RATE as f64).round() as usize
}

#[inline]
fn sample(track: &[i16], frame: usize, ch: usize) -> i32 {
    track.get(frame * CHANNELS + ch).copied().unwrap_or(0) as i32
}

fn copy_padded(track: &[i16], total_frames: usize) -> Vec<i16> {
    let total = total_frames * CHANNELS;
    let mut out = vec![0i16; total];
    let n = track.len().min(total);
    out[..n].copy_from_slice(&track[..n]);
    out
}

/// Scale an i32 accumulation buffer back into i16 range. Mixes that stay
/// in range pass through untouched; overdriven mixes are scaled down by
/// their peak.
fn rescale_peak(acc: &[i32]) -> Vec<i16> {
    let peak = acc.iter().map(|v| v.unsigned_abs()).max().unwrap_or(0);
    if peak <= i16::MAX as u32 {
        return acc.iter().map(|&v| v as i16).collect();
    }
    let scale = i16::MAX as f64 / peak as f64;
    acc.iter()
        .map(|&v| (v as f64 * scale).round() as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn constant_track(frames: usize, value: i16) -> Vec<i16> {
        vec![value; frames * CHANNELS]
    }

    const ALL_MODES: [AudioMode; 6] = [
        AudioMode::Synced,
        AudioMode::BackgroundOnly,
        AudioMode::ForegroundOnly,
        AudioMode::Both,
        AudioMode::TimedForeground,
        AudioMode::None,
    ];

    #[test]
    fn test_output_duration_is_exact_for_every_mode() {
        let fg = constant_track(100, 1000);
        let bg = constant_track(5000, -500);
        let window = ActiveWindow::new(0.01, Some(0.02));
        for mode in ALL_MODES {
            let out = mix(
                MixInputs {
                    foreground: &fg,
                    background: &bg,
                },
                mode,
                window,
                0.05,
            );
            assert_eq!(out.len(), output_len(0.05), "mode {mode:?}");
        }
    }

    #[test]
    fn test_none_is_silent() {
        let fg = constant_track(100, 1000);
        let out = mix(
            MixInputs {
                foreground: &fg,
                background: &fg,
            },
            AudioMode::None,
            ActiveWindow::new(0.0, None),
            0.01,
        );
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_background_only_trims_and_pads() {
        let bg = constant_track(10, 700);
        let out = mix(
            MixInputs {
                foreground: &[],
                background: &bg,
            },
            AudioMode::BackgroundOnly,
            ActiveWindow::new(0.0, None),
            1.0,
        );
        assert_eq!(out.len(), output_len(1.0));
        assert_eq!(out[0], 700);
        // Beyond the short input: padded with silence.
        assert_eq!(out[10 * CHANNELS], 0);
        assert_eq!(*out.last().unwrap(), 0);
    }

    #[test]
    fn test_timed_foreground_window_boundaries() {
        // 1s output at 44.1kHz; window [0.25, 0.75).
        let fg = constant_track(SAMPLE_RATE as usize, 2000);
        let bg = constant_track(SAMPLE_RATE as usize, -3000);
        let window = ActiveWindow::new(0.25, Some(0.75));
        let out = mix(
            MixInputs {
                foreground: &fg,
                background: &bg,
            },
            AudioMode::TimedForeground,
            window,
            1.0,
        );

        let frame_at = |secs: f64| (secs * SAMPLE_RATE as f64).round() as usize * CHANNELS;
        assert_eq!(out[frame_at(0.1)], -3000, "before window: background");
        assert_eq!(out[frame_at(0.5)], 2000, "inside window: foreground");
        assert_eq!(out[frame_at(0.9)], -3000, "after window: background");
    }

    #[test]
    fn test_timed_foreground_without_background_is_silent_outside() {
        let fg = constant_track(SAMPLE_RATE as usize, 2000);
        let out = mix(
            MixInputs {
                foreground: &fg,
                background: &[],
            },
            AudioMode::TimedForeground,
            ActiveWindow::new(0.5, None),
            1.0,
        );
        assert_eq!(out[0], 0);
        assert_eq!(out[(SAMPLE_RATE as usize / 2 + 100) * CHANNELS], 2000);
    }

    #[test]
    fn test_synced_adds_foreground_inside_window_only() {
        let fg = constant_track(SAMPLE_RATE as usize, 1000);
        let bg = constant_track(SAMPLE_RATE as usize, 500);
        let out = mix(
            MixInputs {
                foreground: &fg,
                background: &bg,
            },
            AudioMode::Synced,
            ActiveWindow::new(0.5, None),
            1.0,
        );
        assert_eq!(out[0], 500);
        assert_eq!(out[(SAMPLE_RATE as usize * 3 / 4) * CHANNELS], 1500);
    }

    #[test]
    fn test_both_rescales_instead_of_clipping() {
        let fg = constant_track(100, 30000);
        let bg = constant_track(100, 30000);
        let out = mix(
            MixInputs {
                foreground: &fg,
                background: &bg,
            },
            AudioMode::Both,
            ActiveWindow::new(0.0, None),
            100.0 / SAMPLE_RATE as f64,
        );
        let peak = out.iter().map(|v| v.unsigned_abs()).max().unwrap();
        assert_eq!(peak, i16::MAX as u16, "rescaled to full scale, not clipped");
    }

    #[test]
    fn test_quiet_mix_is_untouched() {
        let fg = constant_track(50, 100);
        let bg = constant_track(50, 200);
        let out = mix(
            MixInputs {
                foreground: &fg,
                background: &bg,
            },
            AudioMode::Both,
            ActiveWindow::new(0.0, None),
            50.0 / SAMPLE_RATE as f64,
        );
        assert_eq!(out[0], 300);
    }

    proptest! {
        #[test]
        fn prop_output_len_matches_duration(
            fg_frames in 0usize..2000,
            bg_frames in 0usize..2000,
            duration_ms in 0u32..200,
            start_ms in 0u32..300,
        ) {
            let fg = constant_track(fg_frames, 123);
            let bg = constant_track(bg_frames, -321);
            let duration = duration_ms as f64 / 1000.0;
            let window = ActiveWindow::new(start_ms as f64 / 1000.0, None);
            for mode in ALL_MODES {
                let out = mix(
                    MixInputs { foreground: &fg, background: &bg },
                    mode,
                    window,
                    duration,
                );
                prop_assert_eq!(out.len(), output_len(duration));
            }
        }
    }
}
