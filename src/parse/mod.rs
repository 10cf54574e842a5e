//! Text → measured music
//!
//! The three front-end stages chained by [`parse_music`]: macro expansion
//! ([`preprocessor`]), recursive descent over the flat text ([`grammar`]),
//! and measure grouping ([`measurize`]).

pub mod grammar;
pub mod measurize;
pub mod preprocessor;

pub use grammar::{BeatWithAttrs, Parser, UnmeasuredMusic, UnmeasuredSection, UnmeasuredStaff};
pub use measurize::Measurizer;
pub use preprocessor::{PreprocessedText, Preprocessor, TextPosition};

use crate::error::Result;
use crate::models::Music;

/// Parse source text into measured music.
pub fn parse_music(text: &str) -> Result<Music> {
    let preprocessed = Preprocessor::new(text).process()?;
    let unmeasured = Parser::new(preprocessed).parse()?;
    let music = Measurizer::new(unmeasured).process()?;
    log::debug!(
        "parsed {} section(s), {} measure(s)",
        music.len(),
        music.iter().map(|s| s.measures.len()).sum::<usize>()
    );
    Ok(music)
}
