//! # Pitch Estimation Module
//!
//! Produces the per-buffer `PitchEstimate` the quantizer consumes. The
//! pipeline only depends on the `PitchEstimator` trait; `YinEstimator` is the
//! implementation used for live input and WAV replay.
//!
//! ## Features
//! - Sliding analysis window fed one hop (buffer) at a time
//! - RMS noise gate for silence
//! - YIN period detection with a clarity check against noise
//! - Parabolic interpolation for sub-sample accuracy
//! - Spectrum refinement of the detected frequency
//! - Conversion from Hz to the fractional MIDI scale

use std::collections::VecDeque;

use log::trace;

use crate::config::EstimatorConfig;
use crate::fft::SpectrumAnalyzer;
use crate::quantizer::PitchEstimate;

/// Anything that can turn a mono buffer into a pitch estimate.
pub trait PitchEstimator {
    fn estimate(&mut self, samples: &[f32]) -> PitchEstimate;
}

/// Converts a frequency to a fractional MIDI note number.
///
/// # Arguments
/// * `freq` - Frequency in Hz
/// * `reference_a4` - Frequency of concert A (MIDI note 69) in Hz
pub fn frequency_to_midi(freq: f32, reference_a4: f32) -> f64 {
    69.0 + 12.0 * (freq as f64 / reference_a4 as f64).log2()
}

/// Converts a fractional MIDI note number back to Hz.
pub fn midi_to_frequency(midi: f64, reference_a4: f32) -> f32 {
    (reference_a4 as f64 * 2.0_f64.powf((midi - 69.0) / 12.0)) as f32
}

/// YIN-based estimator over a sliding window.
pub struct YinEstimator {
    config: EstimatorConfig,
    sample_rate: u32,
    window: VecDeque<f32>,
    spectrum: SpectrumAnalyzer,
}

impl YinEstimator {
    pub fn new(config: EstimatorConfig, sample_rate: u32) -> Self {
        let spectrum = SpectrumAnalyzer::new(config.window_size);
        Self {
            window: VecDeque::with_capacity(config.window_size),
            config,
            sample_rate,
            spectrum,
        }
    }

    /// Detects the frequency of the current window, if any.
    fn detect_frequency(&mut self) -> Option<f32> {
        let signal = self.window.make_contiguous();
        let rough = detect_pitch_yin(
            signal,
            self.sample_rate,
            self.config.amplitude_threshold,
            self.config.clarity_threshold,
        )?;
        let magnitudes = self.spectrum.magnitudes(signal);
        let refined = refine_from_spectrum(&magnitudes, rough, self.sample_rate).unwrap_or(rough);
        trace!("yin: {rough:.2} Hz, refined {refined:.2} Hz");

        (refined >= self.config.min_frequency).then_some(refined)
    }
}

impl PitchEstimator for YinEstimator {
    fn estimate(&mut self, samples: &[f32]) -> PitchEstimate {
        self.window.extend(samples.iter().copied());
        let excess = self.window.len().saturating_sub(self.config.window_size);
        self.window.drain(..excess);

        // Not enough history yet for a full analysis window.
        if self.window.len() < self.config.window_size {
            return PitchEstimate::unvoiced();
        }

        match self.detect_frequency() {
            Some(freq) => PitchEstimate::new(frequency_to_midi(freq, self.config.reference_a4)),
            None => PitchEstimate::unvoiced(),
        }
    }
}

/// YIN pitch detection.
///
/// Enhancements over the textbook version:
/// - Octave error prevention by taking the first dip near the global minimum
/// - Noise rejection using a clarity check
/// - Amplitude gating to filter out silence
///
/// # Arguments
/// * `signal` - Mono input signal
/// * `sample_rate` - Sample rate in Hz
/// * `amplitude_threshold` - Minimum RMS for pitch detection
/// * `clarity_threshold` - Largest normalized difference accepted as a period
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - No pitch detected (silence, noise, or invalid signal)
pub fn detect_pitch_yin(
    signal: &[f32],
    sample_rate: u32,
    amplitude_threshold: f32,
    clarity_threshold: f32,
) -> Option<f32> {
    let frame_size = signal.len();
    let half = frame_size / 2;
    if half < 3 {
        return None;
    }

    // --- Noise gate ---
    let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if !rms.is_finite() || rms < amplitude_threshold {
        return None;
    }

    // --- Difference function ---
    let mut yin_buffer = vec![0.0_f32; half];
    for tau in 1..half {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // --- Cumulative mean normalized difference ---
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..half {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // --- First significant dip, walked down to its local minimum ---
    let min_val = yin_buffer
        .iter()
        .skip(1)
        .cloned()
        .fold(f32::INFINITY, f32::min);
    let threshold = min_val + 0.05;

    let mut period = (2..half)
        .find(|&tau| yin_buffer[tau] < threshold && yin_buffer[tau] < yin_buffer[tau - 1])?;
    while period + 1 < half && yin_buffer[period + 1] < yin_buffer[period] {
        period += 1;
    }

    // --- Clarity check ---
    if yin_buffer[period] > clarity_threshold || period + 1 >= half {
        return None;
    }

    // --- Parabolic interpolation ---
    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];
    let period_float = if (y1 - 2.0 * y2 + y3) != 0.0 {
        let peak_shift = (y1 - y3) / (2.0 * (y1 - 2.0 * y2 + y3));
        period as f32 + peak_shift
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;
    if frequency.is_finite() && frequency > 0.0 {
        Some(frequency)
    } else {
        None
    }
}

/// Refines a frequency estimate using a magnitude spectrum.
///
/// Looks for the strongest bin within two bins of the estimate and fits a
/// parabola through the log magnitudes around it.
///
/// # Returns
/// * `Some(refined_freq)` - Refined frequency estimate
/// * `None` - Refinement not possible, use the original estimate
pub fn refine_from_spectrum(
    spectrum_magnitudes: &[f32],
    rough_freq: f32,
    sample_rate: u32,
) -> Option<f32> {
    if rough_freq <= 0.0 || spectrum_magnitudes.len() < 3 {
        return None;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin = (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return None;
    }

    let (offset, _) = spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    let peak_bin = start_bin + offset;
    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return None;
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return None;
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return None;
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let interpolated_bin = peak_bin as f32 + peak_shift;
    let final_freq = (interpolated_bin * sample_rate as f32) / buffer_size as f32;

    (final_freq.is_finite() && final_freq > 0.0).then_some(final_freq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn midi_conversion() {
        assert_abs_diff_eq!(frequency_to_midi(440.0, 440.0), 69.0, epsilon = 1e-9);
        assert_abs_diff_eq!(frequency_to_midi(880.0, 440.0), 81.0, epsilon = 1e-9);
        assert_abs_diff_eq!(frequency_to_midi(442.0, 442.0), 69.0, epsilon = 1e-9);
        assert_abs_diff_eq!(midi_to_frequency(60.0, 440.0), 261.6256, epsilon = 1e-3);
    }

    #[test]
    fn yin_finds_a440() {
        let signal = sine(440.0, 48_000, 4096);
        let freq = detect_pitch_yin(&signal, 48_000, 0.01, 0.15).unwrap();
        assert_abs_diff_eq!(freq, 440.0, epsilon = 2.0);
    }

    #[test]
    fn yin_gates_silence() {
        let signal = vec![0.0; 4096];
        assert_eq!(detect_pitch_yin(&signal, 48_000, 0.01, 0.15), None);
    }

    #[test]
    fn estimator_warms_up_then_reports_midi() {
        let sample_rate = 48_000;
        let mut estimator = YinEstimator::new(EstimatorConfig::default(), sample_rate);
        let signal = sine(440.0, sample_rate, 4096);

        let estimates: Vec<PitchEstimate> =
            signal.chunks(1024).map(|c| estimator.estimate(c)).collect();
        assert!(estimates[..3].iter().all(|e| !e.is_voiced));

        let last = estimates[3];
        assert!(last.is_voiced);
        assert_abs_diff_eq!(last.value, 69.0, epsilon = 0.1);
    }

    #[test]
    fn estimator_reports_silence_as_unvoiced() {
        let mut estimator = YinEstimator::new(EstimatorConfig::default(), 48_000);
        for _ in 0..6 {
            assert!(!estimator.estimate(&[0.0; 1024]).is_voiced);
        }
    }
}
