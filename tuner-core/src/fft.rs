//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for the pitch estimator's refinement step.
//!
//! ## Features
//! - Forward FFT planned once per window size using RustFFT
//! - Hann windowing for reduced spectral leakage
//! - DC offset removal before transforming

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the input buffer to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Reusable forward FFT for a fixed window length.
///
/// Planning is the expensive part of RustFFT, so the plan and the work
/// buffers live as long as the estimator does.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            fft,
            size,
            buffer: vec![Complex::default(); size],
            scratch,
        }
    }

    /// Computes the magnitude spectrum up to the Nyquist frequency.
    ///
    /// The signal is DC-corrected and Hann-windowed first. Shorter signals
    /// are zero padded, longer ones truncated to the planned size.
    ///
    /// # Returns
    /// * `Vec<f32>` - `size / 2` magnitudes, bin `k` at `k * sample_rate / size` Hz
    pub fn magnitudes(&mut self, signal: &[f32]) -> Vec<f32> {
        let len = signal.len().min(self.size);
        let mut processed = signal[..len].to_vec();
        remove_dc_offset(&mut processed);
        apply_hann_window(&mut processed);

        for (slot, sample) in self
            .buffer
            .iter_mut()
            .zip(processed.into_iter().chain(std::iter::repeat(0.0)))
        {
            *slot = Complex { re: sample, im: 0.0 };
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        self.buffer
            .iter()
            .take(self.size / 2)
            .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_at_its_bin() {
        let size = 1024;
        let sample_rate = 8192.0;
        let freq = 512.0; // exactly bin 64
        let signal: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect();

        let mut analyzer = SpectrumAnalyzer::new(size);
        let mags = analyzer.magnitudes(&signal);
        assert_eq!(mags.len(), size / 2);

        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 64);
    }

    #[test]
    fn dc_is_removed() {
        let mut analyzer = SpectrumAnalyzer::new(256);
        let mags = analyzer.magnitudes(&[0.5; 256]);
        assert!(mags[0] < 1e-3);
    }
}
