//! LilyPond rendering
//!
//! [`export_to_lilypond`] lowers measured music through the engraving IR and
//! serializes it; [`export`] holds the token formatter and [`writer`] the
//! indentation plumbing.

pub mod export;
pub mod writer;

use std::io::{self, Write};

use crate::ir::convert_to_ly;
use crate::models::Music;

pub use export::write_ly_music;
pub use writer::IndentedWriter;

/// Engrave measured music as LilyPond source into `out`.
pub fn export_to_lilypond(out: &mut dyn Write, music: Music) -> io::Result<()> {
    let ly = convert_to_ly(music);
    log::debug!("engraving {} staff/staves", ly.len());
    write_ly_music(out, &ly)
}
