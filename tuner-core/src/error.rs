//! # Error Module
//!
//! Error type shared by every part of the tuner core. Only configuration,
//! device and file failures are errors; an unvoiced buffer is a normal
//! branch of the pipeline and never shows up here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunerError {
    /// A configuration value is out of range. Reported before capture starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The device cannot provide the requested format or sample rate.
    #[error("unsupported audio configuration: {0}")]
    UnsupportedConfig(String),

    #[error("no audio input device available")]
    NoInputDevice,

    /// The input stream failed while running. Fatal to the capture loop.
    #[error("audio device error: {0}")]
    Device(String),

    #[error("WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("capture thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, TunerError>;
