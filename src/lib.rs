//! lilt — a compiler from compact textual music notation to LilyPond
//!
//! The input language packs beats, voices and staves into a terse ASCII
//! form with a small macro facility. This crate turns such text into
//! engraved LilyPond source in five stages: macro preprocessing, parsing,
//! measurization, lowering to an engraving IR (clef placement and duration
//! partitioning), and token emission.
//!
//! The two public entry points mirror the pipeline's ends:
//!
//! ```
//! let music = lilt::parse_music("%3/4%C,E,G,").unwrap();
//! let mut out = Vec::new();
//! lilt::export_to_lilypond(&mut out, music).unwrap();
//! assert!(String::from_utf8(out).unwrap().contains("\\time 3/4"));
//! ```

pub mod error;
pub mod ir;
pub mod models;
pub mod parse;
pub mod renderers;

pub use error::{NotationError, Result};
pub use models::{Chord, Measure, MeasureAttrs, Music, Note, NoteBase, Section, Time};
pub use parse::parse_music;
pub use renderers::lilypond::export_to_lilypond;
