//! # Configuration Module
//!
//! Runtime settings for capture, pitch estimation and the tuning indicator.
//! The defaults reproduce the classic tuner setup: 48 kHz stereo float input
//! read in 1024-frame buffers, a 4096-sample analysis window, and a gauge
//! with a 20% dead zone and 10% buckets.
//!
//! Configs are stored as JSON. Every field has a default, so a partial file
//! only overrides what it names.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, TunerError};

/// Complete tuner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub audio: AudioConfig,
    pub estimator: EstimatorConfig,
    pub indicator: IndicatorConfig,
}

/// Input stream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count requested from the device.
    pub channels: u16,
    /// Frames per buffer handed to the pipeline.
    pub buffer_size: usize,
    /// Buffers that may queue between the device callback and the capture
    /// loop before new ones are dropped as overflow.
    pub channel_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            buffer_size: 1024,
            channel_capacity: 16,
        }
    }
}

/// Pitch estimator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Length of the sliding analysis window in mono samples.
    pub window_size: usize,
    /// RMS below which a window counts as silence.
    pub amplitude_threshold: f32,
    /// Largest normalized YIN difference accepted as a clear period.
    pub clarity_threshold: f32,
    /// Frequency of concert A (MIDI note 69) in Hz.
    pub reference_a4: f32,
    /// Lowest frequency reported as voiced.
    pub min_frequency: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            amplitude_threshold: 0.01,
            clarity_threshold: 0.15,
            reference_a4: 440.0,
            min_frequency: 20.0,
        }
    }
}

/// Tuning gauge thresholds, in percent of a semitone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Deviations below this are reported as in tune.
    pub dead_zone_pct: f64,
    /// Width of one intensity bucket.
    pub bucket_width_pct: f64,
    /// Largest intensity the gauge can show.
    pub max_intensity: u8,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            dead_zone_pct: 20.0,
            bucket_width_pct: 10.0,
            max_intensity: 4,
        }
    }
}

impl TunerConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// The loaded config is validated before it is returned.
    ///
    /// # Arguments
    /// * `path` - File path to load the config from (e.g., "tuner.json")
    ///
    /// # Returns
    /// * `Ok(TunerConfig)` - Successfully loaded and validated config
    /// * `Err(TunerError)` - I/O error, JSON error or invalid values
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: TunerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to a JSON file, pretty printed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }

    /// Checks every value the capture loop depends on.
    ///
    /// Called by the worker before the device is opened, so a bad config
    /// fails at startup instead of inside the loop.
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate must be greater than zero"));
        }
        if audio.channels == 0 {
            return Err(invalid("audio.channels must be greater than zero"));
        }
        if audio.buffer_size == 0 {
            return Err(invalid("audio.buffer_size must be greater than zero"));
        }
        if audio.channel_capacity == 0 {
            return Err(invalid("audio.channel_capacity must be greater than zero"));
        }

        let est = &self.estimator;
        if est.window_size < audio.buffer_size {
            return Err(invalid(format!(
                "estimator.window_size ({}) must hold at least one buffer ({} frames)",
                est.window_size, audio.buffer_size
            )));
        }
        if !(est.reference_a4.is_finite() && est.reference_a4 > 0.0) {
            return Err(invalid("estimator.reference_a4 must be a positive frequency"));
        }
        if !(est.min_frequency.is_finite() && est.min_frequency > 0.0) {
            return Err(invalid("estimator.min_frequency must be a positive frequency"));
        }
        if !(est.amplitude_threshold >= 0.0) {
            return Err(invalid("estimator.amplitude_threshold must not be negative"));
        }
        if !(est.clarity_threshold > 0.0 && est.clarity_threshold <= 1.0) {
            return Err(invalid("estimator.clarity_threshold must be in (0, 1]"));
        }

        let ind = &self.indicator;
        if !(ind.dead_zone_pct.is_finite() && ind.dead_zone_pct > 0.0) {
            return Err(invalid("indicator.dead_zone_pct must be positive"));
        }
        if !(ind.bucket_width_pct.is_finite() && ind.bucket_width_pct > 0.0) {
            return Err(invalid("indicator.bucket_width_pct must be positive"));
        }
        if ind.dead_zone_pct < ind.bucket_width_pct {
            return Err(invalid(format!(
                "indicator.dead_zone_pct ({}) must be at least one bucket wide ({})",
                ind.dead_zone_pct, ind.bucket_width_pct
            )));
        }
        if ind.max_intensity == 0 {
            return Err(invalid("indicator.max_intensity must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> TunerError {
    TunerError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_setup() {
        let config = TunerConfig::default();
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.audio.buffer_size, 1024);
        assert_eq!(config.estimator.window_size, 4096);
        assert_eq!(config.indicator.dead_zone_pct, 20.0);
        assert_eq!(config.indicator.bucket_width_pct, 10.0);
        assert_eq!(config.indicator.max_intensity, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{ "audio": { "sample_rate": 44100 } }"#;
        let config: TunerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.buffer_size, 1024);
        assert_eq!(config.indicator, IndicatorConfig::default());
    }

    #[test]
    fn rejects_zero_buffer_size() {
        let mut config = TunerConfig::default();
        config.audio.buffer_size = 0;
        assert!(matches!(
            config.validate(),
            Err(TunerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_window_smaller_than_buffer() {
        let mut config = TunerConfig::default();
        config.estimator.window_size = 512;
        assert!(matches!(
            config.validate(),
            Err(TunerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_bad_indicator_thresholds() {
        let mut config = TunerConfig::default();
        config.indicator.max_intensity = 0;
        assert!(config.validate().is_err());

        let mut config = TunerConfig::default();
        config.indicator.bucket_width_pct = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_dead_zone_narrower_than_a_bucket() {
        let mut config = TunerConfig::default();
        config.indicator.dead_zone_pct = 5.0;
        config.indicator.bucket_width_pct = 10.0;
        assert!(matches!(
            config.validate(),
            Err(TunerError::InvalidConfig(_))
        ));

        config.indicator.dead_zone_pct = 10.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.json");

        let mut config = TunerConfig::default();
        config.estimator.reference_a4 = 442.0;
        config.save(&path).unwrap();

        let loaded = TunerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "audio": { "channels": 0 } }"#).unwrap();
        assert!(matches!(
            TunerConfig::load(&path),
            Err(TunerError::InvalidConfig(_))
        ));
    }
}
