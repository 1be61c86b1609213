//! # Tuning Indicator Module
//!
//! Buckets a quantized deviation into the coarse feedback a gauge shows:
//! a direction and a small integer intensity.
//!
//! The deviation is read on a percent-of-semitone scale (0..=50). Anything
//! under the dead zone is in tune with intensity 0. Above it, each bucket is
//! `bucket_width_pct` wide, so with the default thresholds the gauge shows
//! 2, 3 or 4.

use crate::config::IndicatorConfig;
use crate::quantizer::RoundingSide;

/// Which side of the displayed note the raw pitch was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Flat,
    Sharp,
    InTune,
}

/// Gauge state for one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningFeedback {
    pub direction: Direction,
    pub intensity: u8,
}

impl TuningFeedback {
    /// In tune, nothing to show. Also used for silent buffers.
    pub const NEUTRAL: TuningFeedback = TuningFeedback {
        direction: Direction::InTune,
        intensity: 0,
    };
}

impl Default for TuningFeedback {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Classifies deviations against configurable thresholds.
#[derive(Debug, Clone)]
pub struct TuningIndicator {
    dead_zone_pct: f64,
    bucket_width_pct: f64,
    max_intensity: u8,
}

impl Default for TuningIndicator {
    fn default() -> Self {
        Self::new(&IndicatorConfig::default())
    }
}

impl TuningIndicator {
    pub fn new(config: &IndicatorConfig) -> Self {
        Self {
            dead_zone_pct: config.dead_zone_pct,
            bucket_width_pct: config.bucket_width_pct,
            max_intensity: config.max_intensity,
        }
    }

    /// Buckets a deviation magnitude into gauge feedback.
    ///
    /// # Arguments
    /// * `deviation_magnitude` - Distance to the displayed note in semitones,
    ///   measured after rounding (so both sides share the `[0, 0.5]` scale)
    /// * `side` - How the quantizer reached the displayed note
    ///
    /// # Returns
    /// * `TuningFeedback::NEUTRAL` inside the dead zone
    /// * `Sharp` when the pitch was rounded down, `Flat` when rounded up,
    ///   with intensity `floor(pct / bucket_width)` kept within
    ///   `1..=max_intensity`
    pub fn classify(&self, deviation_magnitude: f64, side: RoundingSide) -> TuningFeedback {
        let pct = deviation_magnitude * 100.0;
        if pct < self.dead_zone_pct {
            return TuningFeedback::NEUTRAL;
        }

        let bucket = (pct / self.bucket_width_pct).floor();
        // Zero is reserved for the dead zone.
        let intensity = bucket.max(1.0).min(self.max_intensity as f64) as u8;
        let direction = match side {
            RoundingSide::Down => Direction::Sharp,
            RoundingSide::Up => Direction::Flat,
        };

        TuningFeedback {
            direction,
            intensity,
        }
    }
}
