// tuner-core/src/lib.rs

//! The core logic for the real-time tuner.
//! This crate turns audio buffers into tuning feedback: a note label plus a
//! flat/sharp gauge reading for every buffer. It is completely headless
//! and contains no display code.
//!
//! ## Data flow
//! audio source → pitch estimator → quantizer → indicator → `FeedbackFrame`
//! on a channel, one frame per buffer, in buffer order.

pub mod audio;
pub mod config;
pub mod error;
pub mod estimator;
pub mod fft;
pub mod indicator;
pub mod pipeline;
pub mod quantizer;
pub mod source;
pub mod worker;

pub use config::TunerConfig;
pub use error::{Result, TunerError};
pub use indicator::{Direction, TuningFeedback, TuningIndicator};
pub use pipeline::{FeedbackFrame, TunerPipeline, NO_NOTE_LABEL};
pub use quantizer::{quantize, NoteLabel, PitchClass, PitchEstimate, QuantizedNote, RoundingSide};
pub use worker::{LoopExit, StopToken, TunerWorker};
