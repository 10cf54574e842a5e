//! Structural music types
//!
//! The measured hierarchy is `Music` → `Section` → `Staff` → `Beat` →
//! `Voice` → `Chord`. Measures do not own their beats; a [`Section`] keeps a
//! side list of [`Measure`] records that partition its beat range.

use num_rational::Rational32;
use serde::{Deserialize, Serialize};

use crate::models::pitch::Note;

/// A time signature (or partial-measure length). The denominator is a power
/// of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub numerator: i32,
    pub denominator: i32,
}

impl Time {
    pub fn new(numerator: i32, denominator: i32) -> Self {
        Time { numerator, denominator }
    }

    /// The fraction of a whole note this time signature spans.
    pub fn as_rational(self) -> Rational32 {
        Rational32::new(self.numerator, self.denominator)
    }
}

impl Default for Time {
    fn default() -> Self {
        Time::new(4, 4)
    }
}

/// Attributes attached to a single chord.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChordAttrs {
    /// Tempo mark in beats per minute, effective from this chord onward.
    pub tempo: Option<f32>,
}

/// One vertical stack of notes occupying one subdivision of a beat.
///
/// An empty note list is a rest. A `sustained` chord extends the previous
/// sounding chord instead of carrying notes of its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    pub notes: Vec<Note>,
    pub sustained: bool,
    pub attributes: ChordAttrs,
}

/// A monophonic line within one beat: the chords subdividing it evenly.
pub type Voice = Vec<Chord>;

/// Parallel voices sounding within one beat.
pub type Beat = Vec<Voice>;

/// An ordered run of beats on one staff.
pub type Staff = Vec<Beat>;

/// Measure-level attribute announcements: key and time signatures, and the
/// length of a partial (pickup) measure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureAttrs {
    /// Sharps (positive) or flats (negative) in the key signature, in -7..=7.
    pub key: Option<i32>,
    pub time: Option<Time>,
    pub partial: Option<Time>,
}

impl MeasureAttrs {
    pub fn is_null(&self) -> bool {
        self.key.is_none() && self.time.is_none() && self.partial.is_none()
    }

    /// Field-wise overwrite: any field set in `other` wins.
    pub fn merge_with(&mut self, other: &MeasureAttrs) {
        if other.key.is_some() {
            self.key = other.key;
        }
        if other.time.is_some() {
            self.time = other.time;
        }
        if other.partial.is_some() {
            self.partial = other.partial;
        }
    }
}

/// A measure within a section: where it starts and what it announces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub start_beat: usize,
    pub attributes: MeasureAttrs,
}

/// A run of parallel staves sharing one measure structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub staves: Vec<Staff>,
    pub measures: Vec<Measure>,
}

impl Section {
    /// Beat index range `[start, stop)` covered by the given measure.
    pub fn beat_index_range_of_measure(&self, measure: usize) -> (usize, usize) {
        let start = self.measures[measure].start_beat;
        let stop = if self.measures.len() == measure + 1 {
            self.staves[0].len()
        } else {
            self.measures[measure + 1].start_beat
        };
        (start, stop)
    }
}

/// A whole piece: its sections in order.
pub type Music = Vec<Section>;
