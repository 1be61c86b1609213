//! # Audio Capture Module
//!
//! Real-time input through CPAL (Cross-Platform Audio Library).
//!
//! ## Features
//! - Default input device selection
//! - Exact channel count and sample rate matching, failing fast otherwise
//! - Fixed-size buffers handed to the capture loop over a bounded channel
//! - Overflow tolerance: a full channel drops buffers instead of stalling
//!   the device callback
//! - Device stream errors forwarded to the capture loop as fatal

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{error, info, warn};

use crate::config::AudioConfig;
use crate::error::{Result, TunerError};
use crate::source::{AudioBuffer, AudioSource};
use crate::worker::StopToken;

/// How often a blocked `next_buffer` looks at the stop token.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Live input from the default capture device.
///
/// The stream is created and owned by the thread that reads from it; CPAL
/// streams are not `Send` on every platform.
pub struct CpalSource {
    stream: cpal::Stream,
    buffers: Receiver<Vec<f32>>,
    errors: Receiver<String>,
    stop: StopToken,
    channels: u16,
    sample_rate: u32,
    overflows: Arc<AtomicU64>,
}

impl CpalSource {
    /// Opens the default input device and starts streaming.
    ///
    /// This function:
    /// 1. Selects the default audio input device
    /// 2. Picks an `f32` configuration with the requested channel count
    ///    whose rate range contains the requested sample rate
    /// 3. Sets up a callback that slices device data into
    ///    `buffer_size`-frame buffers
    ///
    /// # Arguments
    /// * `config` - Requested stream settings
    /// * `stop` - Token that ends `next_buffer` when set
    ///
    /// # Returns
    /// * `Ok(CpalSource)` - Playing input stream
    /// * `Err(e)` - No device, unsupported configuration, or stream failure
    pub fn open(config: &AudioConfig, stop: StopToken) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(TunerError::NoInputDevice)?;

        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        info!("Using audio input device: {device_name}");

        let configs = device
            .supported_input_configs()
            .map_err(|e| TunerError::Device(e.to_string()))?
            .collect::<Vec<_>>();
        let supported_config =
            find_supported_config(configs, config.channels, config.sample_rate).ok_or_else(
                || {
                    TunerError::UnsupportedConfig(format!(
                        "{device_name} has no f32 input with {} channel(s) at {} Hz",
                        config.channels, config.sample_rate
                    ))
                },
            )?;

        let stream_config: cpal::StreamConfig = supported_config
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .into();
        info!(
            "Selected {} Hz, {} channel(s), {} frames per buffer",
            config.sample_rate, config.channels, config.buffer_size
        );

        let (buffer_tx, buffer_rx) = crossbeam_channel::bounded(config.channel_capacity);
        let (error_tx, error_rx) = crossbeam_channel::bounded(1);
        let overflows = Arc::new(AtomicU64::new(0));

        let samples_per_buffer = config.buffer_size * config.channels as usize;
        let mut slicer = BufferSlicer::new(buffer_tx, samples_per_buffer, overflows.clone());
        let data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| slicer.push(data);
        let err_fn = move |err: cpal::StreamError| {
            error!("An error occurred on the audio stream: {err}");
            let _ = error_tx.try_send(err.to_string());
        };

        let stream = device
            .build_input_stream(&stream_config, data_fn, err_fn, None)
            .map_err(|e| TunerError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| TunerError::Device(e.to_string()))?;

        Ok(Self {
            stream,
            buffers: buffer_rx,
            errors: error_rx,
            stop,
            channels: config.channels,
            sample_rate: config.sample_rate,
            overflows,
        })
    }

    /// Buffers dropped so far because the capture loop fell behind.
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_buffer(&mut self) -> Result<Option<AudioBuffer>> {
        loop {
            if self.stop.is_stopped() {
                return Ok(None);
            }
            crossbeam_channel::select! {
                recv(self.errors) -> msg => {
                    let reason = msg.unwrap_or_else(|_| "error channel closed".to_string());
                    return Err(TunerError::Device(reason));
                },
                recv(self.buffers) -> msg => match msg {
                    Ok(samples) => {
                        return Ok(Some(AudioBuffer {
                            samples,
                            channels: self.channels,
                            sample_rate: self.sample_rate,
                        }));
                    }
                    Err(_) => return Err(TunerError::Device("input stream closed".to_string())),
                },
                default(STOP_POLL_INTERVAL) => {},
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        info!(
            "Stopping input stream ({} buffer(s) dropped to overflow)",
            self.overflow_count()
        );
        self.stream
            .pause()
            .map_err(|e| TunerError::Device(e.to_string()))
    }
}

/// Slices device callback data into fixed-size buffers.
///
/// Incoming samples accumulate until a whole buffer is available. When the
/// capture loop is behind and the channel is full the buffer is dropped and
/// counted; a warning is logged once per overflow burst.
struct BufferSlicer {
    sender: Sender<Vec<f32>>,
    samples_per_buffer: usize,
    pending: Vec<f32>,
    overflows: Arc<AtomicU64>,
    overflowing: bool,
}

impl BufferSlicer {
    fn new(sender: Sender<Vec<f32>>, samples_per_buffer: usize, overflows: Arc<AtomicU64>) -> Self {
        Self {
            sender,
            samples_per_buffer,
            pending: Vec::with_capacity(samples_per_buffer * 2),
            overflows,
            overflowing: false,
        }
    }

    fn push(&mut self, data: &[f32]) {
        self.pending.extend_from_slice(data);

        while self.pending.len() >= self.samples_per_buffer {
            let buffer: Vec<f32> = self.pending.drain(..self.samples_per_buffer).collect();
            match self.sender.try_send(buffer) {
                Ok(()) => self.overflowing = false,
                Err(TrySendError::Full(_)) => {
                    self.overflows.fetch_add(1, Ordering::Relaxed);
                    if !self.overflowing {
                        warn!("Input overflow: capture loop is behind, dropping buffers");
                        self.overflowing = true;
                    }
                }
                // The capture loop is gone; nothing left to feed.
                Err(TrySendError::Disconnected(_)) => self.pending.clear(),
            }
        }
    }
}

/// Finds a supported input configuration for the requested layout.
///
/// Only configurations with the requested channel count, 32-bit float
/// samples and a rate range containing `target_rate` qualify. Among those,
/// the one with the narrowest rate range wins.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    channels: u16,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.channels() == channels && c.sample_format() == cpal::SampleFormat::F32)
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| c.max_sample_rate().0 - c.min_sample_rate().0)
}
