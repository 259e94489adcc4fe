//! Frame rates, time modes and frame-indexed time spans.

use serde::{Deserialize, Serialize};

/// Tolerance used when matching a host frame rate to a standard time mode.
const RATE_EPSILON: f64 = 1e-3;

/// Frame-rate mode of the target document.
///
/// Standard rates map to named modes. Any other rate is carried verbatim in
/// [`TimeMode::Custom`] rather than being rounded to a nearby standard rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    Frames24,
    Frames120,
    Frames100,
    Frames60,
    Frames50,
    Frames48,
    Frames30,
    NtscFullFrame,
    Pal,
    Frames1000,
    FilmFullFrame,
    Frames96,
    Frames72,
    Frames59_94,
    Custom(f64),
}

impl TimeMode {
    const STANDARD: [TimeMode; 14] = [
        TimeMode::Frames24,
        TimeMode::Frames120,
        TimeMode::Frames100,
        TimeMode::Frames60,
        TimeMode::Frames50,
        TimeMode::Frames48,
        TimeMode::Frames30,
        TimeMode::NtscFullFrame,
        TimeMode::Pal,
        TimeMode::Frames1000,
        TimeMode::FilmFullFrame,
        TimeMode::Frames96,
        TimeMode::Frames72,
        TimeMode::Frames59_94,
    ];

    /// Pick the time mode for a host samples-per-second value.
    pub fn from_rate(fps: f64) -> Self {
        Self::STANDARD
            .iter()
            .copied()
            .find(|mode| (mode.frame_rate() - fps).abs() < RATE_EPSILON)
            .unwrap_or(TimeMode::Custom(fps))
    }

    /// Frames per second of this mode.
    pub fn frame_rate(&self) -> f64 {
        match self {
            TimeMode::Frames24 => 24.0,
            TimeMode::Frames120 => 120.0,
            TimeMode::Frames100 => 100.0,
            TimeMode::Frames60 => 60.0,
            TimeMode::Frames50 => 50.0,
            TimeMode::Frames48 => 48.0,
            TimeMode::Frames30 => 30.0,
            TimeMode::NtscFullFrame => 29.97,
            TimeMode::Pal => 25.0,
            TimeMode::Frames1000 => 1000.0,
            TimeMode::FilmFullFrame => 23.976,
            TimeMode::Frames96 => 96.0,
            TimeMode::Frames72 => 72.0,
            TimeMode::Frames59_94 => 59.94,
            TimeMode::Custom(fps) => *fps,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, TimeMode::Custom(_))
    }

    /// Seconds elapsed at `frame`, counting from frame 0.
    pub fn frame_to_seconds(&self, frame: i64) -> f64 {
        frame as f64 / self.frame_rate()
    }
}

impl Default for TimeMode {
    fn default() -> Self {
        TimeMode::Frames24
    }
}

/// An inclusive span of frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: i64,
    pub end: i64,
}

impl TimeSpan {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, frame: i64) -> bool {
        frame >= self.start && frame <= self.end
    }

    /// Number of frames in the span.
    pub fn frame_count(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }

    /// Smallest span covering both spans.
    pub fn union(&self, other: &TimeSpan) -> TimeSpan {
        TimeSpan::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Export time range in host seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// A range of exactly one instant.
    pub fn instant(time: f64) -> Self {
        Self {
            start: time,
            end: time,
        }
    }

    /// Whether the range collapses to a single instant (a static export).
    pub fn is_single_instant(&self) -> bool {
        (self.end - self.start).abs() < 1e-9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_rates() {
        assert_eq!(TimeMode::from_rate(24.0), TimeMode::Frames24);
        assert_eq!(TimeMode::from_rate(29.97), TimeMode::NtscFullFrame);
        assert_eq!(TimeMode::from_rate(23.976), TimeMode::FilmFullFrame);
        assert_eq!(TimeMode::from_rate(25.0), TimeMode::Pal);
        assert_eq!(TimeMode::from_rate(59.94), TimeMode::Frames59_94);
    }

    #[test]
    fn test_unknown_rate_is_custom() {
        let mode = TimeMode::from_rate(23.0);
        assert_eq!(mode, TimeMode::Custom(23.0));
        assert!(mode.is_custom());
        assert_eq!(mode.frame_rate(), 23.0);
        // Close to 24 but not equal: must not round.
        assert!(TimeMode::from_rate(24.5).is_custom());
    }

    #[test]
    fn test_span() {
        let span = TimeSpan::new(1, 48);
        assert_eq!(span.frame_count(), 48);
        assert!(span.contains(48));
        assert!(!span.contains(49));
        assert_eq!(span.union(&TimeSpan::new(40, 60)), TimeSpan::new(1, 60));
        assert_eq!(TimeSpan::new(5, 4).frame_count(), 0);
    }

    #[test]
    fn test_single_instant() {
        assert!(TimeRange::instant(0.5).is_single_instant());
        assert!(!TimeRange::new(0.0, 2.0).is_single_instant());
    }
}
