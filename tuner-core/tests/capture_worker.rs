use std::time::Duration;

use crossbeam_channel::Receiver;
use tuner_core::estimator::{PitchEstimator, YinEstimator, midi_to_frequency};
use tuner_core::source::{AudioBuffer, AudioSource, MemorySource};
use tuner_core::{
    Direction, FeedbackFrame, LoopExit, PitchEstimate, StopToken, TunerConfig, TunerError,
    TunerWorker, TuningFeedback,
};

/// Replays a fixed list of estimates, one per buffer.
struct Scripted(std::vec::IntoIter<f64>);

impl Scripted {
    fn new(values: &[f64]) -> Self {
        Self(values.to_vec().into_iter())
    }
}

impl PitchEstimator for Scripted {
    fn estimate(&mut self, _samples: &[f32]) -> PitchEstimate {
        PitchEstimate::new(self.0.next().unwrap_or(0.0))
    }
}

/// Never ends on its own; yields silence until the stop token is set.
struct Endless {
    stop: StopToken,
}

impl AudioSource for Endless {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn next_buffer(&mut self) -> tuner_core::Result<Option<AudioBuffer>> {
        if self.stop.is_stopped() {
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(1));
        Ok(Some(AudioBuffer::mono(vec![0.0; 16], 48_000)))
    }
}

/// Fails after a number of good buffers.
struct Failing {
    good: usize,
}

impl AudioSource for Failing {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn next_buffer(&mut self) -> tuner_core::Result<Option<AudioBuffer>> {
        if self.good == 0 {
            return Err(TunerError::Device("device unplugged".into()));
        }
        self.good -= 1;
        Ok(Some(AudioBuffer::mono(vec![0.0; 16], 48_000)))
    }
}

fn silent_buffers(count: usize) -> MemorySource {
    MemorySource::new(
        48_000,
        (0..count).map(|_| AudioBuffer::mono(vec![0.0; 16], 48_000)),
    )
}

fn collect(rx: &Receiver<FeedbackFrame>) -> Vec<FeedbackFrame> {
    rx.try_iter().collect()
}

#[test]
fn worker_streams_scenario_in_order() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let values = [69.0, 69.45, 69.55, 0.0];
    let worker = TunerWorker::spawn(
        &TunerConfig::default(),
        move |_stop: &StopToken| Ok(silent_buffers(4)),
        Scripted::new(&values),
        tx,
    )
    .unwrap();

    assert_eq!(worker.join().unwrap(), LoopExit::SourceEnded);

    let frames = collect(&rx);
    let labels: Vec<String> = frames.iter().map(FeedbackFrame::label).collect();
    assert_eq!(labels, ["A5", "A5", "A#5", "A#5"]);
    assert_eq!(frames[0].feedback, TuningFeedback::NEUTRAL);
    assert_eq!(frames[2].feedback.direction, Direction::Flat);
    assert!(frames[2].feedback.intensity >= 2);
    assert_eq!(frames[3].feedback, TuningFeedback::NEUTRAL);

    let seq: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
    assert_eq!(seq, [0, 1, 2, 3]);
}

#[test]
fn invalid_config_fails_before_opening_source() {
    let (tx, _rx) = crossbeam_channel::unbounded();
    let mut config = TunerConfig::default();
    config.audio.sample_rate = 0;

    let result = TunerWorker::spawn(
        &config,
        |_stop: &StopToken| -> tuner_core::Result<MemorySource> {
            panic!("source must not be opened")
        },
        Scripted::new(&[]),
        tx,
    );
    assert!(matches!(result, Err(TunerError::InvalidConfig(_))));
}

#[test]
fn open_failure_is_reported_at_spawn() {
    let (tx, _rx) = crossbeam_channel::unbounded();
    let result = TunerWorker::spawn(
        &TunerConfig::default(),
        |_stop: &StopToken| -> tuner_core::Result<MemorySource> {
            Err(TunerError::UnsupportedConfig("no 48 kHz input".into()))
        },
        Scripted::new(&[]),
        tx,
    );
    assert!(matches!(result, Err(TunerError::UnsupportedConfig(_))));
}

#[test]
fn stop_ends_live_loop_and_is_idempotent() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut worker = TunerWorker::spawn(
        &TunerConfig::default(),
        |stop: &StopToken| Ok(Endless { stop: stop.clone() }),
        Scripted::new(&[]),
        tx,
    )
    .unwrap();

    // Wait for at least one frame so the loop is known to be running.
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(!worker.is_finished());

    worker.stop().unwrap();
    assert!(worker.is_finished());
    worker.stop().unwrap();

    for frame in collect(&rx) {
        assert_eq!(frame.label(), tuner_core::NO_NOTE_LABEL);
    }
}

#[test]
fn device_error_is_fatal() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut worker = TunerWorker::spawn(
        &TunerConfig::default(),
        |_stop: &StopToken| Ok(Failing { good: 2 }),
        Scripted::new(&[60.0, 60.0, 60.0]),
        tx,
    )
    .unwrap();

    // Both good buffers arrive before the loop dies.
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().sequence, 0);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().sequence, 1);

    assert!(matches!(worker.stop(), Err(TunerError::Device(_))));
    assert!(rx.try_recv().is_err());
}

#[test]
fn yin_end_to_end_on_synthetic_tone() {
    let sample_rate = 48_000;
    let config = TunerConfig::default();
    let buffer_size = config.audio.buffer_size;

    // A quarter semitone below D6 (MIDI 74), then silence.
    let freq = midi_to_frequency(73.75, config.estimator.reference_a4);
    let mut signal: Vec<f32> = (0..buffer_size * 8)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
        .collect();
    signal.extend(std::iter::repeat_n(0.0, buffer_size * 4));

    let (tx, rx) = crossbeam_channel::unbounded();
    let estimator = YinEstimator::new(config.estimator.clone(), sample_rate);
    let worker = TunerWorker::spawn(
        &config,
        move |_stop: &StopToken| Ok(MemorySource::from_signal(&signal, sample_rate, buffer_size)),
        estimator,
        tx,
    )
    .unwrap();
    assert_eq!(worker.join().unwrap(), LoopExit::SourceEnded);

    let frames = collect(&rx);
    assert_eq!(frames.len(), 12);

    // Window still filling.
    assert!(frames[..3].iter().all(|f| !f.voiced));

    let tone = &frames[3..8];
    for frame in tone {
        assert!(frame.voiced);
        assert_eq!(frame.label(), "D6");
        assert_eq!(frame.feedback.direction, Direction::Flat);
        assert_eq!(frame.feedback.intensity, 2);
    }

    // Once the window is fully silent the label stays and the gauge resets.
    let last = frames.last().unwrap();
    assert!(!last.voiced);
    assert_eq!(last.label(), "D6");
    assert_eq!(last.feedback, TuningFeedback::NEUTRAL);
}
