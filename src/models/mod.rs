//! Core data model for parsed music
//!
//! Bottom-up: pitches and intervals in [`pitch`], then the structural types
//! (chords, beats, measures, sections) in [`notation`].

pub mod notation;
pub mod pitch;

pub use notation::{Beat, Chord, ChordAttrs, Measure, MeasureAttrs, Music, Section, Staff, Time, Voice};
pub use pitch::{Interval, IntervalQuality, Note, NoteBase};
