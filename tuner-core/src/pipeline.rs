//! # Pipeline Module
//!
//! Per-buffer analysis state. `TunerPipeline` owns the only value that
//! survives from one buffer to the next, the last voiced note, and turns
//! each pitch estimate into a `FeedbackFrame`.
//!
//! On a silent buffer the note label persists but the gauge resets to
//! neutral, so the display keeps the last note without a stale deviation.

use log::trace;

use crate::indicator::{TuningFeedback, TuningIndicator};
use crate::quantizer::{self, NoteLabel, PitchEstimate};

/// Label shown before any buffer has been voiced.
pub const NO_NOTE_LABEL: &str = "--";

/// Everything the presentation layer needs for one buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackFrame {
    /// Zero-based index of the buffer this frame was computed from.
    pub sequence: u64,
    /// Last known note. `None` until the first voiced buffer.
    pub note: Option<NoteLabel>,
    pub feedback: TuningFeedback,
    /// Whether this buffer itself carried a pitch.
    pub voiced: bool,
    /// Deviation from the displayed note in semitones, voiced buffers only.
    pub signed_deviation: Option<f64>,
}

impl FeedbackFrame {
    /// Note label string, or `NO_NOTE_LABEL` before the first note.
    pub fn label(&self) -> String {
        match self.note {
            Some(note) => note.to_string(),
            None => NO_NOTE_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TunerPipeline {
    indicator: TuningIndicator,
    last_note: Option<NoteLabel>,
    sequence: u64,
}

impl TunerPipeline {
    pub fn new(indicator: TuningIndicator) -> Self {
        Self {
            indicator,
            last_note: None,
            sequence: 0,
        }
    }

    pub fn last_note(&self) -> Option<NoteLabel> {
        self.last_note
    }

    /// Runs one buffer's estimate through the quantizer and indicator.
    pub fn process(&mut self, estimate: PitchEstimate) -> FeedbackFrame {
        let sequence = self.sequence;
        self.sequence += 1;

        if !estimate.is_voiced {
            trace!("buffer {sequence}: unvoiced, holding {:?}", self.last_note);
            return FeedbackFrame {
                sequence,
                note: self.last_note,
                feedback: TuningFeedback::NEUTRAL,
                voiced: false,
                signed_deviation: None,
            };
        }

        let note = quantizer::quantize(estimate.value);
        let feedback = self
            .indicator
            .classify(note.deviation_magnitude(), note.rounding_side);
        self.last_note = Some(note.label());

        trace!(
            "buffer {sequence}: {:.3} -> {} {:+.3} {:?}",
            estimate.value,
            note.label(),
            note.signed_deviation,
            feedback
        );

        FeedbackFrame {
            sequence,
            note: self.last_note,
            feedback,
            voiced: true,
            signed_deviation: Some(note.signed_deviation),
        }
    }

    /// Forgets the last note and restarts the buffer count.
    pub fn reset(&mut self) {
        self.last_note = None;
        self.sequence = 0;
    }
}
