//! Output back ends
//!
//! Only LilyPond for now; the engraving IR in [`crate::ir`] is the input
//! surface any further back end would consume.

pub mod lilypond;
