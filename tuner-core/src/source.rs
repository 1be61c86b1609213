//! # Audio Source Module
//!
//! The capture loop pulls fixed-size buffers from an `AudioSource`. Live
//! input comes from `audio::CpalSource`; this module holds the buffer type,
//! the trait, and the offline sources used for replay and tests.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use log::info;

use crate::error::{Result, TunerError};

/// One block of interleaved samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: 1,
            sample_rate,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Averages interleaved channels into a single mono signal.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// A blocking supplier of audio buffers.
pub trait AudioSource {
    fn sample_rate(&self) -> u32;

    /// Blocks until the next buffer is available.
    ///
    /// # Returns
    /// * `Ok(Some(buffer))` - The next buffer
    /// * `Ok(None)` - The source has ended (stop requested or input exhausted)
    /// * `Err(e)` - The device failed; the caller must not retry
    fn next_buffer(&mut self) -> Result<Option<AudioBuffer>>;

    /// Halts the underlying input. Called once after the loop ends.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Replays buffers held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    sample_rate: u32,
    buffers: VecDeque<AudioBuffer>,
}

impl MemorySource {
    pub fn new(sample_rate: u32, buffers: impl IntoIterator<Item = AudioBuffer>) -> Self {
        Self {
            sample_rate,
            buffers: buffers.into_iter().collect(),
        }
    }

    /// Splits a mono signal into `buffer_size` chunks. The tail may be short.
    pub fn from_signal(signal: &[f32], sample_rate: u32, buffer_size: usize) -> Self {
        let buffers = signal
            .chunks(buffer_size.max(1))
            .map(|chunk| AudioBuffer::mono(chunk.to_vec(), sample_rate));
        Self::new(sample_rate, buffers)
    }

    pub fn remaining(&self) -> usize {
        self.buffers.len()
    }
}

impl AudioSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_buffer(&mut self) -> Result<Option<AudioBuffer>> {
        Ok(self.buffers.pop_front())
    }
}

/// Replays a WAV file in fixed-size buffers.
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    channels: u16,
    sample_rate: u32,
    buffer_size: usize,
    finished: bool,
}

impl WavSource {
    /// Opens a WAV file for replay.
    ///
    /// # Arguments
    /// * `path` - WAV file to read
    /// * `buffer_size` - Frames per emitted buffer
    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(TunerError::InvalidConfig(
                "buffer_size must be greater than zero".into(),
            ));
        }
        let path = path.as_ref();
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        info!(
            "Replaying {}: {} Hz, {} channel(s), {} frames",
            path.display(),
            spec.sample_rate,
            spec.channels,
            reader.duration()
        );
        Ok(Self {
            reader,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            buffer_size,
            finished: false,
        })
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<f32>> {
        let spec = self.reader.spec();
        let samples = match spec.sample_format {
            SampleFormat::Float => self
                .reader
                .samples::<f32>()
                .take(count)
                .collect::<std::result::Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                self.reader
                    .samples::<i32>()
                    .take(count)
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(samples)
    }
}

impl AudioSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_buffer(&mut self) -> Result<Option<AudioBuffer>> {
        if self.finished {
            return Ok(None);
        }
        let wanted = self.buffer_size * self.channels as usize;
        let mut samples = self.read_samples(wanted)?;
        if samples.len() < wanted {
            self.finished = true;
            if samples.is_empty() {
                return Ok(None);
            }
            // Keep every buffer the same length.
            samples.resize(wanted, 0.0);
        }
        Ok(Some(AudioBuffer {
            samples,
            channels: self.channels,
            sample_rate: self.sample_rate,
        }))
    }
}
