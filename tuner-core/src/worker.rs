//! # Capture Worker Module
//!
//! Runs the per-buffer pipeline on a dedicated thread and hands every frame
//! to the consumer over a channel.
//!
//! ## Architecture
//! - **Capture thread**: opens the source, then loops read → estimate →
//!   quantize → classify → send, strictly in buffer order
//! - **Consumer**: owns the `Receiver<FeedbackFrame>` and never blocks the
//!   capture thread (the channel is unbounded)
//! - **Shutdown**: a `StopToken` checked every iteration; `TunerWorker::stop`
//!   sets it and joins the thread

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{debug, error, info};

use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::estimator::PitchEstimator;
use crate::indicator::TuningIndicator;
use crate::pipeline::{FeedbackFrame, TunerPipeline};
use crate::source::AudioSource;

/// Shared flag that asks the capture loop to finish.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a capture loop returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The stop token was set.
    Stopped,
    /// The source ran out of buffers.
    SourceEnded,
    /// The consumer dropped its receiver.
    ConsumerGone,
}

/// Drives buffers through the pipeline until told to stop.
///
/// Each iteration checks `stop`, reads one buffer, downmixes it, estimates
/// its pitch, runs the pipeline and sends the frame. A source error ends the
/// loop immediately and is returned to the caller; there is no retry.
///
/// # Returns
/// * `Ok(LoopExit)` - Clean exit and its reason
/// * `Err(e)` - The source failed
pub fn run_capture_loop<S, E>(
    source: &mut S,
    estimator: &mut E,
    pipeline: &mut TunerPipeline,
    sender: &Sender<FeedbackFrame>,
    stop: &StopToken,
) -> Result<LoopExit>
where
    S: AudioSource + ?Sized,
    E: PitchEstimator + ?Sized,
{
    loop {
        if stop.is_stopped() {
            return Ok(LoopExit::Stopped);
        }

        let buffer = match source.next_buffer()? {
            Some(buffer) => buffer,
            // A live source also ends here once the token is set.
            None if stop.is_stopped() => return Ok(LoopExit::Stopped),
            None => return Ok(LoopExit::SourceEnded),
        };

        let mono = buffer.to_mono();
        let estimate = estimator.estimate(&mono);
        let frame = pipeline.process(estimate);

        if sender.send(frame).is_err() {
            debug!("Feedback receiver dropped after buffer {}", frame.sequence);
            return Ok(LoopExit::ConsumerGone);
        }
    }
}

/// Handle to a running capture thread.
#[derive(Debug)]
pub struct TunerWorker {
    stop: StopToken,
    thread_handle: Option<JoinHandle<Result<LoopExit>>>,
}

impl TunerWorker {
    /// Starts the capture thread.
    ///
    /// This function:
    /// 1. Validates the configuration
    /// 2. Spawns the capture thread, which opens the source with `open_source`
    /// 3. Waits until the source is open (or failed to open) before returning
    ///
    /// The source is opened on the capture thread because live input streams
    /// may not be movable between threads.
    ///
    /// # Arguments
    /// * `config` - Tuner settings
    /// * `open_source` - Opens the audio source; receives the worker's stop token
    /// * `estimator` - Pitch estimator for the source's sample rate
    /// * `sender` - Channel the frames are delivered on
    ///
    /// # Returns
    /// * `Ok(TunerWorker)` - The loop is running
    /// * `Err(e)` - Invalid config or the source could not be opened
    pub fn spawn<S, E, F>(
        config: &TunerConfig,
        open_source: F,
        mut estimator: E,
        sender: Sender<FeedbackFrame>,
    ) -> Result<Self>
    where
        S: AudioSource + 'static,
        E: PitchEstimator + Send + 'static,
        F: FnOnce(&StopToken) -> Result<S> + Send + 'static,
    {
        config.validate()?;

        let stop = StopToken::new();
        let thread_stop = stop.clone();
        let mut pipeline = TunerPipeline::new(TuningIndicator::new(&config.indicator));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let thread_handle = thread::Builder::new()
            .name("tuner-capture".to_string())
            .spawn(move || {
                info!("Capture thread starting");
                let mut source = match open_source(&thread_stop) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        error!("Failed to open audio source: {e}");
                        let _ = ready_tx.send(Err(e));
                        return Ok(LoopExit::Stopped);
                    }
                };

                let result = run_capture_loop(
                    &mut source,
                    &mut estimator,
                    &mut pipeline,
                    &sender,
                    &thread_stop,
                );
                match &result {
                    Ok(exit) => info!("Capture loop finished: {exit:?}"),
                    Err(e) => error!("Capture loop failed: {e}"),
                }

                if let Err(e) = source.stop() {
                    error!("Error stopping audio source: {e}");
                }
                drop(source);
                info!("Capture thread finished");
                result
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop,
                thread_handle: Some(thread_handle),
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            // The thread died before reporting.
            Err(_) => {
                let _ = thread_handle.join();
                Err(TunerError::WorkerPanicked)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    /// Stops the loop, releases the source and joins the thread.
    ///
    /// Returns the loop's error if it failed. Calling it again after the
    /// thread has been joined returns `Ok(())`.
    pub fn stop(&mut self) -> Result<()> {
        self.stop.stop();
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(TunerError::WorkerPanicked),
        }
    }

    /// Waits for the loop to end on its own (source exhausted or consumer
    /// gone) and returns how it ended.
    pub fn join(mut self) -> Result<LoopExit> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(LoopExit::Stopped);
        };
        handle.join().map_err(|_| TunerError::WorkerPanicked)?
    }
}

impl Drop for TunerWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Capture worker ended with error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::{Direction, TuningFeedback};
    use crate::quantizer::PitchEstimate;
    use crate::source::{AudioBuffer, MemorySource};

    /// Reads the pitch straight out of the first sample.
    struct FirstSample;

    impl PitchEstimator for FirstSample {
        fn estimate(&mut self, samples: &[f32]) -> PitchEstimate {
            PitchEstimate::new(samples.first().copied().unwrap_or(0.0) as f64)
        }
    }

    fn source(values: &[f32]) -> MemorySource {
        MemorySource::new(
            48_000,
            values.iter().map(|&v| AudioBuffer::mono(vec![v; 4], 48_000)),
        )
    }

    #[test]
    fn loop_delivers_frames_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut pipeline = TunerPipeline::default();
        let exit = run_capture_loop(
            &mut source(&[69.0, 69.3, 0.0, 70.0]),
            &mut FirstSample,
            &mut pipeline,
            &tx,
            &StopToken::new(),
        )
        .unwrap();
        assert_eq!(exit, LoopExit::SourceEnded);

        let frames: Vec<FeedbackFrame> = rx.try_iter().collect();
        let seq: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(seq, [0, 1, 2, 3]);
        assert_eq!(frames[1].feedback.direction, Direction::Sharp);
        assert_eq!(frames[2].label(), "A5");
        assert_eq!(frames[2].feedback, TuningFeedback::NEUTRAL);
        assert_eq!(frames[3].label(), "A#5");
    }

    #[test]
    fn stopped_token_ends_before_reading() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let stop = StopToken::new();
        stop.stop();
        let mut src = source(&[69.0]);
        let exit = run_capture_loop(
            &mut src,
            &mut FirstSample,
            &mut TunerPipeline::default(),
            &tx,
            &stop,
        )
        .unwrap();
        assert_eq!(exit, LoopExit::Stopped);
        assert_eq!(src.remaining(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_receiver_ends_loop() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let exit = run_capture_loop(
            &mut source(&[69.0, 70.0]),
            &mut FirstSample,
            &mut TunerPipeline::default(),
            &tx,
            &StopToken::new(),
        )
        .unwrap();
        assert_eq!(exit, LoopExit::ConsumerGone);
    }

    #[test]
    fn stereo_buffers_are_downmixed() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let buffer = AudioBuffer {
            samples: vec![68.0, 70.0, 68.0, 70.0],
            channels: 2,
            sample_rate: 48_000,
        };
        run_capture_loop(
            &mut MemorySource::new(48_000, [buffer]),
            &mut FirstSample,
            &mut TunerPipeline::default(),
            &tx,
            &StopToken::new(),
        )
        .unwrap();
        assert_eq!(rx.recv().unwrap().label(), "A5");
    }
}
