//! Pitch representation and interval arithmetic
//!
//! Notes are spelled (base letter, octave, accidental) rather than stored as
//! raw semitone counts, so transposition has to preserve the diatonic
//! spelling: moving a C up a major third yields an E, not an F flat.

use serde::{Deserialize, Serialize};

/// Semitone value of each base letter within an octave.
const BASE_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// The seven base letters, in staff order starting from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NoteBase {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteBase {
    /// Diatonic index: C is 0, B is 6.
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Inverse of [`NoteBase::index`], taking any integer modulo 7.
    pub fn from_index(index: i32) -> Self {
        use NoteBase::*;
        [C, D, E, F, G, A, B][index.rem_euclid(7) as usize]
    }
}

/// A spelled pitch. `accidental` counts sharps (positive) or flats (negative);
/// double accidentals are `±2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub base: NoteBase,
    pub octave: i32,
    pub accidental: i32,
}

impl Note {
    pub fn new(base: NoteBase, octave: i32, accidental: i32) -> Self {
        Note { base, octave, accidental }
    }

    /// MIDI pitch number, if the note lies within the representable range
    /// 0..=127 (C-1 through G9).
    pub fn midi_pitch(self) -> Option<u8> {
        let value = BASE_SEMITONES[self.base.index() as usize] + self.accidental + (self.octave + 1) * 12;
        u8::try_from(value).ok().filter(|&v| v <= 127)
    }

    /// Transpose up by a number of semitones, choosing the spelling that
    /// matches the corresponding diatonic interval.
    pub fn transposed_up(self, semitones: i32) -> Self {
        if semitones == 0 {
            return self;
        }
        if semitones < 0 {
            return self.transposed_down(-semitones);
        }
        // Diatonic step count for each semitone offset within an octave
        const STEPS_UP: [i32; 12] = [0, 0, 1, 1, 2, 3, 3, 4, 4, 5, 5, 6];
        let mut result = self;
        result.octave += semitones / 12;
        let semitones = semitones % 12;
        transpose_spelled(result, semitones, STEPS_UP[semitones as usize])
    }

    /// Transpose down by a number of semitones; see [`Note::transposed_up`].
    pub fn transposed_down(self, semitones: i32) -> Self {
        if semitones == 0 {
            return self;
        }
        if semitones < 0 {
            return self.transposed_up(-semitones);
        }
        const STEPS_DOWN: [i32; 12] = [0, 0, -1, -1, -2, -3, -3, -4, -4, -5, -5, -6];
        let mut result = self;
        result.octave -= semitones / 12;
        let semitones = semitones % 12;
        transpose_spelled(result, -semitones, STEPS_DOWN[semitones as usize])
    }

    /// Transpose up by a diatonic interval.
    pub fn transposed_up_by(self, interval: Interval) -> Self {
        transpose_spelled(self, interval.semitones(), interval.number as i32 - 1)
    }

    /// Transpose down by a diatonic interval.
    pub fn transposed_down_by(self, interval: Interval) -> Self {
        transpose_spelled(self, -interval.semitones(), -(interval.number as i32 - 1))
    }
}

/// Move `note` by `steps` base letters and adjust the accidental so the
/// result is `semitones` away from the input, then fold triple (or worse)
/// accidentals back into a neighboring letter.
fn transpose_spelled(note: Note, semitones: i32, steps: i32) -> Note {
    normalize_multi_accidentals(transpose_pure(note, semitones, steps))
}

fn transpose_pure(note: Note, semitones: i32, steps: i32) -> Note {
    let old_base = note.base.index();
    let new_base = (old_base + steps).rem_euclid(7);
    let octave_diff = (old_base + steps - new_base) / 7;
    let accidental_diff =
        BASE_SEMITONES[old_base as usize] + semitones - BASE_SEMITONES[new_base as usize] - octave_diff * 12;
    Note {
        base: NoteBase::from_index(new_base),
        octave: note.octave + octave_diff,
        accidental: note.accidental + accidental_diff,
    }
}

fn normalize_multi_accidentals(note: Note) -> Note {
    if note.accidental >= 3 {
        transpose_pure(note, 0, 1)
    } else if note.accidental <= -3 {
        transpose_pure(note, 0, -1)
    } else {
        note
    }
}

/// Interval quality, ordered from most contracted to most expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntervalQuality {
    Diminished,
    Minor,
    Perfect,
    Major,
    Augmented,
}

/// A diatonic interval: a number (1 = unison, 2 = second, ...) plus a quality.
///
/// Unisons, fourths, fifths and octaves take diminished/perfect/augmented;
/// the other numbers take diminished/minor/major/augmented. [`Interval::new`]
/// rejects the mismatched combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub number: u32,
    pub quality: IntervalQuality,
}

impl Interval {
    /// Build a validated interval. `number` must be at least 1.
    pub fn new(number: u32, quality: IntervalQuality) -> Option<Self> {
        if number == 0 {
            return None;
        }
        let interval = Interval { number, quality };
        match quality {
            IntervalQuality::Perfect if !interval.is_perfect_class() => None,
            IntervalQuality::Minor | IntervalQuality::Major if interval.is_perfect_class() => None,
            _ => Some(interval),
        }
    }

    /// Whether the interval number belongs to the perfect class
    /// (unison, fourth, fifth and their compounds).
    pub fn is_perfect_class(self) -> bool {
        matches!((self.number - 1) % 7, 0 | 3 | 4)
    }

    /// Width of the interval in semitones.
    pub fn semitones(self) -> i32 {
        let steps = (self.number - 1) as i32;
        let base = BASE_SEMITONES[(steps % 7) as usize] + steps / 7 * 12;
        let adjustment = match self.quality {
            IntervalQuality::Diminished if self.is_perfect_class() => -1,
            IntervalQuality::Diminished => -2,
            IntervalQuality::Minor => -1,
            IntervalQuality::Perfect | IntervalQuality::Major => 0,
            IntervalQuality::Augmented => 1,
        };
        base + adjustment
    }
}
