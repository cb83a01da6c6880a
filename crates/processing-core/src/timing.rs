//! The active-window gate.

use serde::{Deserialize, Serialize};

/// Time window during which the foreground composite is shown.
///
/// The gate is a stateless predicate over the output timestamp: it is
/// recomputed for every frame, so seeking can never leave it drifted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveWindow {
    /// Start of the window in seconds.
    pub start_secs: f64,

    /// End of the window in seconds. `None` means "until the end".
    pub end_secs: Option<f64>,
}

impl ActiveWindow {
    pub fn new(start_secs: f64, end_secs: Option<f64>) -> Self {
        Self {
            start_secs,
            end_secs,
        }
    }

    /// Whether the composite is active at timestamp `t`.
    ///
    /// Active iff `start <= t < end`; with no end, iff `t >= start`.
    #[inline]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_secs && self.end_secs.map_or(true, |end| t < end)
    }

    /// The window end, bounded by `fallback` when absent or later.
    pub fn bounded_end(&self, fallback: f64) -> f64 {
        match self.end_secs {
            Some(end) => end.min(fallback),
            None => fallback,
        }
    }

    /// Window length in seconds given the overall output duration.
    pub fn span_secs(&self, output_duration: f64) -> f64 {
        (self.bounded_end(output_duration) - self.start_secs).max(0.0)
    }
}
