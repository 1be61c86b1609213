//! # Terminal Display
//!
//! Renders feedback frames as one text line: flat marks on the left of the
//! note, sharp marks on the right, nothing on either side when in tune.
//!
//! ```text
//!     I I I  A#5            flat
//!            A5   I I       sharp
//!            A5             in tune
//! ```

use std::io::{self, Write};

use tuner_core::{Direction, FeedbackFrame, NoteLabel, TuningFeedback};

/// Width of each gauge column.
const GAUGE_WIDTH: usize = 8;

/// Bar marks for an intensity. The first bucket past the dead zone shows
/// one mark, so intensity `n` draws `n - 1`.
pub fn gauge(intensity: u8) -> String {
    let marks = intensity.saturating_sub(1) as usize;
    vec!["I"; marks].join(" ")
}

pub fn direction_word(direction: Direction) -> &'static str {
    match direction {
        Direction::Flat => "flat",
        Direction::Sharp => "sharp",
        Direction::InTune => "in tune",
    }
}

/// Formats one frame as a display line.
pub fn render_frame(frame: &FeedbackFrame) -> String {
    let bar = gauge(frame.feedback.intensity);
    let (left, right) = match frame.feedback.direction {
        Direction::Flat => (bar, String::new()),
        Direction::Sharp => (String::new(), bar),
        Direction::InTune => (String::new(), String::new()),
    };
    format!(
        "{left:>width$}  {label:<4} {right:<width$}  {word}",
        label = frame.label(),
        word = direction_word(frame.feedback.direction),
        width = GAUGE_WIDTH,
    )
}

/// Writes frames to a terminal, skipping repeats unless asked not to.
pub struct Printer<W: Write> {
    out: W,
    every_frame: bool,
    last_shown: Option<(Option<NoteLabel>, TuningFeedback)>,
    /// Seconds per buffer, for timestamps in replay mode.
    buffer_seconds: Option<f64>,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W, every_frame: bool) -> Self {
        Self {
            out,
            every_frame,
            last_shown: None,
            buffer_seconds: None,
        }
    }

    /// Prefix every line with the buffer's start time.
    pub fn with_timestamps(mut self, buffer_size: usize, sample_rate: u32) -> Self {
        self.buffer_seconds = Some(buffer_size as f64 / sample_rate as f64);
        self
    }

    pub fn show(&mut self, frame: &FeedbackFrame) -> io::Result<()> {
        let state = (frame.note, frame.feedback);
        if !self.every_frame && self.last_shown == Some(state) {
            return Ok(());
        }
        self.last_shown = Some(state);

        if let Some(seconds) = self.buffer_seconds {
            write!(self.out, "{:>8.3}s ", frame.sequence as f64 * seconds)?;
        }
        writeln!(self.out, "{}", render_frame(frame))?;
        self.out.flush()
    }
}
