//! # Pitch Quantizer Module
//!
//! Turns a fractional semitone pitch estimate into a note label and a
//! deviation from that note.
//!
//! Semitone 0 is C0 and every multiple of 12 starts a new octave, so the
//! octave is simply `floor(semitone / 12)`. On the MIDI scale this puts
//! note 69 at `A5` and note 72 at `C6`.
//!
//! ## Rounding rule
//! - A fractional part above one half rounds up to the next semitone
//! - Anything else, including exactly one half, stays on the lower semitone
//! - The carry into the next pitch class and octave falls out of the
//!   Euclidean division of the rounded semitone by 12

use std::fmt;

/// The twelve pitch classes in sharp notation, starting at C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// All pitch classes, indexed by semitone above C.
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Pitch class of a semitone number. Works for negative numbers too.
    pub fn from_semitone(semitone: i64) -> Self {
        Self::ALL[semitone.rem_euclid(12) as usize]
    }

    pub fn label(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A pitch estimate for one buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Fractional semitone number.
    pub value: f64,
    /// Whether the buffer had a usable pitch at all.
    pub is_voiced: bool,
}

impl PitchEstimate {
    /// Wraps a raw estimator value.
    ///
    /// A value is voiced when it is finite and its whole semitone part is at
    /// least 1. Zero, negative, non-finite and sub-semitone values all mean
    /// "no discernible pitch this buffer".
    pub fn new(value: f64) -> Self {
        let is_voiced = value.is_finite() && value.floor() >= 1.0;
        Self { value, is_voiced }
    }

    pub fn unvoiced() -> Self {
        Self {
            value: 0.0,
            is_voiced: false,
        }
    }
}

/// Which way the raw pitch was rounded to reach the displayed note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingSide {
    /// The pitch sat above the displayed note and was rounded down to it.
    Down,
    /// The pitch sat below the displayed note and was rounded up to it.
    Up,
}

/// Note name plus octave, e.g. `A5` or `C#-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteLabel {
    pub pitch_class: PitchClass,
    pub octave: i64,
}

impl NoteLabel {
    /// Label of a whole semitone number. Octave 0 starts at semitone 0.
    pub fn from_semitone(semitone: i64) -> Self {
        Self {
            pitch_class: PitchClass::from_semitone(semitone),
            octave: semitone.div_euclid(12),
        }
    }
}

impl fmt::Display for NoteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

/// Result of quantizing a voiced pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedNote {
    /// The semitone the pitch was rounded to.
    pub nearest_semitone: i64,
    pub name: PitchClass,
    pub octave: i64,
    /// `pitch - nearest_semitone`. Lies in `(-0.5, 0.5]`; the upper bound is
    /// only reached by an exact half, which stays on the lower note.
    pub signed_deviation: f64,
    pub rounding_side: RoundingSide,
}

impl QuantizedNote {
    pub fn label(&self) -> NoteLabel {
        NoteLabel {
            pitch_class: self.name,
            octave: self.octave,
        }
    }

    /// Distance to the displayed note in semitones, in `[0, 0.5]`.
    pub fn deviation_magnitude(&self) -> f64 {
        self.signed_deviation.abs()
    }
}

/// Quantizes a voiced pitch to the nearest semitone.
///
/// Callers must only pass values for which `PitchEstimate::is_voiced` holds;
/// unvoiced buffers take the pipeline's silence branch instead.
///
/// # Arguments
/// * `pitch_value` - Fractional semitone pitch, e.g. from `frequency_to_midi`
///
/// # Returns
/// * `QuantizedNote` - Displayed note, deviation and rounding side
///
/// # Note
/// An exact half semitone stays on the lower note, so `signed_deviation`
/// lies in `(-0.5, 0.5]` rather than `[-0.5, 0.5)`.
pub fn quantize(pitch_value: f64) -> QuantizedNote {
    debug_assert!(pitch_value.is_finite(), "quantize called with {pitch_value}");

    let whole = pitch_value.floor();
    let frac = pitch_value - whole;

    let (nearest, magnitude, rounding_side) = if frac > 0.5 {
        (whole + 1.0, 1.0 - frac, RoundingSide::Up)
    } else {
        (whole, frac, RoundingSide::Down)
    };

    let nearest_semitone = nearest as i64;
    let label = NoteLabel::from_semitone(nearest_semitone);
    let signed_deviation = match rounding_side {
        RoundingSide::Down => magnitude,
        RoundingSide::Up => -magnitude,
    };

    QuantizedNote {
        nearest_semitone,
        name: label.pitch_class,
        octave: label.octave,
        signed_deviation,
        rounding_side,
    }
}
