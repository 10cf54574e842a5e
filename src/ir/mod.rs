//! Engraving intermediate representation
//!
//! Bridges the measured music model to the LilyPond emitter. The IR is
//! staff-major: each staff unrolls every section's measures into a flat run
//! of [`LyMeasure`]s whose voices hold [`LyChord`]s positioned by rational
//! beat offsets. Three passes produce it:
//!
//! 1. [`builder`] unrolls staves and resolves sustains into ties.
//! 2. [`clef`] decides where clef changes go.
//! 3. [`duration`] splits chords until every duration is spellable, inserting
//!    ties and tuplet brackets.

pub mod builder;
pub mod clef;
pub mod duration;

use num_rational::Rational32;
use serde::{Deserialize, Serialize};

use crate::models::{Chord, MeasureAttrs, Music, Time};

/// Clefs the engraver may pick, ordered from lowest to highest register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Clef {
    #[default]
    None,
    BassOttavaBassa,
    Bass,
    Treble,
    TrebleOttava,
}

/// Position of a chord within its tuplet bracket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TupletPos {
    #[default]
    None,
    Head,
    Last,
}

/// Tuplet bracket attributes carried by each member chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupletAttrs {
    /// How much the durations inside the bracket are compressed, e.g. 3/2
    /// for a triplet.
    pub ratio: Rational32,
    pub pos: TupletPos,
}

impl Default for TupletAttrs {
    fn default() -> Self {
        TupletAttrs { ratio: Rational32::from_integer(1), pos: TupletPos::None }
    }
}

/// A positioned event within a measure's voice.
///
/// `chord` is `None` for a spacer (the voice is simply absent here); a chord
/// with no notes is a rest. Unlike the parser's `Chord`, `sustained` here
/// means the chord ties *into the next one*.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyChord {
    /// Offset from the measure start, in beats.
    pub start: Rational32,
    pub tuplet: TupletAttrs,
    pub chord: Option<Chord>,
    pub clef_change: Clef,
}

impl Default for LyChord {
    fn default() -> Self {
        LyChord {
            start: Rational32::from_integer(0),
            tuplet: TupletAttrs::default(),
            chord: None,
            clef_change: Clef::None,
        }
    }
}

pub type LyVoice = Vec<LyChord>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LyMeasure {
    pub current_time: Time,
    pub current_partial: Time,
    pub attributes: MeasureAttrs,
    pub voices: Vec<LyVoice>,
}

pub type LyStaff = Vec<LyMeasure>;
pub type LyMusic = Vec<LyStaff>;

/// Lower measured music into the engraving form.
pub fn convert_to_ly(music: Music) -> LyMusic {
    let mut ly = builder::unroll(music);
    for staff in &mut ly {
        clef::place_clef_changes(staff);
        for measure in staff {
            duration::partition_measure(measure);
        }
    }
    ly
}
