//! Error types for the notation pipeline
//!
//! One taxonomy covers every stage. Each variant carries a fully rendered
//! human-readable message including the source position (with macro expansion
//! chains where applicable), so errors can be surfaced verbatim at the
//! pipeline boundary.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NotationError>;

/// Every failure the pipeline can report.
///
/// Preprocessor, parser and measurizer variants are user-facing diagnostics;
/// the engraving passes are expected to uphold their invariants internally
/// and have no variants here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotationError {
    // Preprocessor
    #[error("{0}")]
    MacroUnclosed(String),
    #[error("{0}")]
    MacroNoColon(String),
    #[error("{0}")]
    MacroNameInvalid(String),
    #[error("{0}")]
    MacroUndefined(String),
    #[error("{0}")]
    MacroExpansionTooLarge(String),

    // Parser
    #[error("{0}")]
    UnclosedBlock(String),
    #[error("{0}")]
    NestedBlock(String),
    #[error("{0}")]
    EmptyAttribute(String),
    #[error("{0}")]
    BadTimeSignature(String),
    #[error("{0}")]
    BadKeySignature(String),
    #[error("{0}")]
    BadTempo(String),
    #[error("{0}")]
    BadTransposition(String),
    #[error("{0}")]
    AttributeMisplaced(String),
    #[error("{0}")]
    BeatUnterminated(String),
    #[error("{0}")]
    ChordUnterminated(String),
    #[error("{0}")]
    ParensInRestOrSustain(String),
    #[error("{0}")]
    BadNoteBase(String),
    #[error("{0}")]
    BadOctave(String),
    #[error("{0}")]
    NoteOutOfRange(String),

    // Measurizer
    #[error("{0}")]
    IncompleteMeasure(String),
    #[error("{0}")]
    InconsistentAttrsAcrossStaves(String),
}
