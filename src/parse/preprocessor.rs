//! Macro preprocessor
//!
//! Reduces the raw source, which may contain `!name: body!` macro definitions
//! and `*name*` references, into a flat macro-free character sequence. Every
//! character of the output is mapped back to its origin: either a source
//! line/column, or an offset inside a macro body (transitively, for nested
//! expansions). Later stages use this map to point diagnostics at the right
//! place even through macro expansion chains.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{NotationError, Result};

/// Upper bound on the expanded size of the main text and of each macro body.
/// Checked at every append so nested references cannot blow up exponentially.
pub const DEFAULT_MAX_MACRO_LENGTH: usize = 65_535;

/// Origin of one preprocessed character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextPosition {
    /// The end-of-input marker appended after the last character.
    #[default]
    Eof,
    /// A character retained directly from the source.
    Source { line: usize, column: usize },
    /// A character spliced in from a macro body: entry index plus the offset
    /// within that body.
    InMacro { entry: usize, offset: usize },
}

/// A run of expanded text with one origin record per byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMap {
    /// Macro name; empty for the main preprocessed text.
    pub name: String,
    pub content: String,
    /// Where the macro definition begins (always a source position).
    pub definition: TextPosition,
    pub positions: Vec<TextPosition>,
}

/// The preprocessor's output: the flat text plus the macro table used to
/// resolve provenance. Shadowed macro bodies stay in `entries` so positions
/// recorded before the shadowing still resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessedText {
    pub text: TextMap,
    pub entries: Vec<TextMap>,
    /// Active macro names, mapping to the newest entry of that name.
    pub macros: HashMap<String, usize>,
}

impl PreprocessedText {
    /// Render a position as human-readable text, reproducing the macro
    /// expansion chain for nested origins.
    pub fn position_string(&self, pos: TextPosition) -> String {
        match pos {
            TextPosition::Eof => "at the end of input".to_owned(),
            TextPosition::Source { line, column } => format!("at line {line}, column {column}"),
            TextPosition::InMacro { entry, offset } => {
                let map = &self.entries[entry];
                match map.positions[offset] {
                    inner @ TextPosition::InMacro { .. } => format!(
                        "in macro '{}', defined {},\n{}",
                        map.name,
                        self.position_string(map.definition),
                        self.position_string(inner)
                    ),
                    TextPosition::Source { line, column } => {
                        format!("in macro '{}', at line {line}, column {column}", map.name)
                    }
                    TextPosition::Eof => format!("in macro '{}', at the end of input", map.name),
                }
            }
        }
    }
}

/// Expands macros in a source text. See the module docs for the syntax.
pub struct Preprocessor {
    stripped: String,
    original_pos: Vec<TextPosition>,
    max_macro_length: usize,
}

impl Preprocessor {
    pub fn new(text: &str) -> Self {
        Self::with_limit(text, DEFAULT_MAX_MACRO_LENGTH)
    }

    pub fn with_limit(text: &str, max_macro_length: usize) -> Self {
        let (stripped, original_pos) = strip_whitespace(text);
        Preprocessor { stripped, original_pos, max_macro_length }
    }

    /// Run the expansion, producing the flat text and its provenance map.
    pub fn process(self) -> Result<PreprocessedText> {
        let mut out = PreprocessedText::default();
        let mut cursor = 0;
        while cursor < self.stripped.len() {
            let Some(idx) = find_any(&self.stripped, cursor, &['!', '*']) else {
                self.append_text(&mut out.text, cursor, self.stripped.len())?;
                break;
            };
            self.append_text(&mut out.text, cursor, idx)?;
            if self.stripped.as_bytes()[idx] == b'!' {
                cursor = self.consume_macro_def(&mut out, idx)?;
            } else {
                let (name_start, name_end) = self.consume_macro_ref(idx, self.stripped.len())?;
                self.append_macro(&out.entries, &out.macros, &mut out.text, name_start, name_end)?;
                cursor = name_end + 1;
            }
        }
        // EOF mark so positions one past the end still resolve
        out.text.positions.push(TextPosition::Eof);
        Ok(out)
    }

    fn append_text(&self, map: &mut TextMap, start: usize, end: usize) -> Result<()> {
        if map.content.len() + (end - start) > self.max_macro_length {
            return Err(self.too_large_error(map, start));
        }
        map.content.push_str(&self.stripped[start..end]);
        map.positions.extend_from_slice(&self.original_pos[start..end]);
        Ok(())
    }

    fn append_macro(
        &self,
        entries: &[TextMap],
        macros: &HashMap<String, usize>,
        map: &mut TextMap,
        name_start: usize,
        name_end: usize,
    ) -> Result<()> {
        let name = &self.stripped[name_start..name_end];
        let Some(&entry) = macros.get(name) else {
            return Err(NotationError::MacroUndefined(format!(
                "Referenced macro '{}' is not yet defined, {}",
                name,
                self.source_pos_string(name_start)
            )));
        };
        let body = &entries[entry];
        if map.content.len() + body.content.len() > self.max_macro_length {
            return Err(self.too_large_error(map, name_start));
        }
        map.content.push_str(&body.content);
        map.positions
            .extend((0..body.content.len()).map(|offset| TextPosition::InMacro { entry, offset }));
        Ok(())
    }

    /// Parse a `!name: body!` definition starting at `bang`. Returns the
    /// offset just past the closing `!`.
    fn consume_macro_def(&self, out: &mut PreprocessedText, bang: usize) -> Result<usize> {
        let def_pos = self.source_pos_string(bang);
        let Some(close) = find_any(&self.stripped, bang + 1, &['!']) else {
            return Err(NotationError::MacroUnclosed(format!(
                "Macro definition is not closed with another '!' {def_pos}"
            )));
        };
        let Some(colon) = find_any(&self.stripped[..close], bang + 1, &[':']) else {
            return Err(NotationError::MacroNoColon(format!(
                "No ':' found to separate macro name and content, {def_pos}"
            )));
        };
        self.validate_macro_name(bang + 1, colon)?;
        let name = self.stripped[bang + 1..colon].to_owned();

        let mut map = TextMap {
            name: name.clone(),
            definition: self.original_pos[bang],
            ..TextMap::default()
        };
        let mut cursor = colon + 1;
        while cursor < close {
            let Some(star) = find_any(&self.stripped[..close], cursor, &['*']) else {
                self.append_text(&mut map, cursor, close)?;
                break;
            };
            self.append_text(&mut map, cursor, star)?;
            let (name_start, name_end) = self.consume_macro_ref(star, close)?;
            self.append_macro(&out.entries, &out.macros, &mut map, name_start, name_end)?;
            cursor = name_end + 1;
        }

        out.entries.push(map);
        out.macros.insert(name, out.entries.len() - 1);
        Ok(close + 1)
    }

    /// Parse a `*name*` reference starting at `star`, looking no further than
    /// `limit`. Returns the name's byte range.
    fn consume_macro_ref(&self, star: usize, limit: usize) -> Result<(usize, usize)> {
        let Some(close) = find_any(&self.stripped[..limit], star + 1, &['*']) else {
            return Err(NotationError::MacroUnclosed(format!(
                "Macro reference is not closed with another '*' {}",
                self.source_pos_string(star)
            )));
        };
        Ok((star + 1, close))
    }

    fn validate_macro_name(&self, start: usize, end: usize) -> Result<()> {
        let name = &self.stripped[start..end];
        let pos = self.source_pos_string(start);
        if name.is_empty() {
            return Err(NotationError::MacroNameInvalid(format!("Macro name is empty {pos}")));
        }
        let valid = name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if !valid || name.as_bytes()[0].is_ascii_digit() {
            return Err(NotationError::MacroNameInvalid(format!(
                "Macro name {name} is not a valid identifier (containing only ASCII alphanumeric \
                 characters and underscores, not starting with a digit), defined {pos}"
            )));
        }
        Ok(())
    }

    fn too_large_error(&self, map: &TextMap, at: usize) -> NotationError {
        let what = if map.name.is_empty() {
            "Preprocessed text".to_owned()
        } else {
            format!("Macro '{}'", map.name)
        };
        NotationError::MacroExpansionTooLarge(format!(
            "{} expands exceeding the character limit of {}, {}",
            what,
            self.max_macro_length,
            self.source_pos_string(at)
        ))
    }

    fn source_pos_string(&self, offset: usize) -> String {
        match self.original_pos.get(offset) {
            Some(TextPosition::Source { line, column }) => format!("at line {line}, column {column}"),
            _ => "at the end of input".to_owned(),
        }
    }
}

/// Drop whitespace while recording the line/column of every retained byte.
/// CR is ignored entirely, LF starts a new line, a space advances one column
/// and a tab advances four.
fn strip_whitespace(text: &str) -> (String, Vec<TextPosition>) {
    let mut stripped = String::with_capacity(text.len());
    let mut positions = Vec::with_capacity(text.len());
    let mut line = 1usize;
    let mut column = 1usize;
    for ch in text.chars() {
        match ch {
            '\r' => {}
            '\n' => {
                line += 1;
                column = 1;
            }
            ' ' => column += 1,
            '\t' => column += 4,
            _ => {
                stripped.push(ch);
                for _ in 0..ch.len_utf8() {
                    positions.push(TextPosition::Source { line, column });
                }
                column += 1;
            }
        }
    }
    (stripped, positions)
}

/// First occurrence of any of `needles` in `text` at or after `from`.
fn find_any(text: &str, from: usize, needles: &[char]) -> Option<usize> {
    text[from..].find(needles).map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn process(text: &str) -> PreprocessedText {
        Preprocessor::new(text).process().expect("preprocessing failed")
    }

    #[test]
    fn empty_input_yields_empty_text() {
        let out = process("");
        assert_eq!(out.text.content, "");
        assert_eq!(out.text.positions, vec![TextPosition::Eof]);
    }

    #[test]
    fn whitespace_only_input_reduces_to_nothing() {
        let out = process("  \t\r\n  \n");
        assert_eq!(out.text.content, "");
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let out = process("AB\n\tC");
        assert_eq!(out.text.content, "ABC");
        assert_eq!(
            out.text.positions,
            vec![
                TextPosition::Source { line: 1, column: 1 },
                TextPosition::Source { line: 1, column: 2 },
                TextPosition::Source { line: 2, column: 5 },
                TextPosition::Eof,
            ]
        );
    }

    #[test]
    fn macro_definition_and_reference_expand() {
        let out = process("!a: CDE,!*a**a*");
        assert_eq!(out.text.content, "CDE,CDE,");
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].content, "CDE,");
        // Every output character resolves into the macro body
        assert!(matches!(out.text.positions[0], TextPosition::InMacro { entry: 0, offset: 0 }));
    }

    #[test]
    fn macros_nest_and_preserve_provenance() {
        let out = process("!a: C!\n!b: *a*D!\n*b*");
        assert_eq!(out.text.content, "CD");
        let rendered = out.position_string(out.text.positions[0]);
        assert!(rendered.starts_with("in macro 'b', defined at line 2, column 1"), "{rendered}");
        assert!(rendered.contains("in macro 'a'"), "{rendered}");
    }

    #[test]
    fn shadowing_keeps_old_entries() {
        let out = process("!a: C!*a*!a: D!*a*");
        assert_eq!(out.text.content, "CD");
        assert_eq!(out.entries.len(), 2);
        assert_eq!(out.macros["a"], 1);
    }

    #[test]
    fn undefined_macro_reference_fails() {
        let err = Preprocessor::new("*nope*").process().unwrap_err();
        assert!(matches!(err, NotationError::MacroUndefined(_)), "{err}");
        assert!(err.to_string().contains("'nope'"));
    }

    #[test]
    fn unclosed_definition_and_reference_fail() {
        assert!(matches!(
            Preprocessor::new("!a: C").process().unwrap_err(),
            NotationError::MacroUnclosed(_)
        ));
        assert!(matches!(
            Preprocessor::new("*a").process().unwrap_err(),
            NotationError::MacroUnclosed(_)
        ));
    }

    #[test]
    fn definition_without_colon_fails() {
        assert!(matches!(
            Preprocessor::new("!abc!").process().unwrap_err(),
            NotationError::MacroNoColon(_)
        ));
    }

    #[test]
    fn invalid_macro_names_fail() {
        for text in ["!: C!", "!1a: C!", "!a-b: C!"] {
            assert!(matches!(
                Preprocessor::new(text).process().unwrap_err(),
                NotationError::MacroNameInvalid(_)
            ), "{text}");
        }
    }

    #[test]
    fn expansion_size_is_bounded() {
        // Each reference doubles the text; the bound must trip mid-expansion
        let text = "!a: CDEFGAB!\n!b: *a**a*!\n!c: *b**b*!\n*c**c**c*";
        let err = Preprocessor::with_limit(text, 64).process().unwrap_err();
        assert!(matches!(err, NotationError::MacroExpansionTooLarge(_)), "{err}");
    }

    #[test]
    fn bound_applies_to_macro_bodies_too() {
        let err = Preprocessor::with_limit("!a: CDEFG!!b: *a**a**a*!", 12)
            .process()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Macro 'b'"), "{message}");
    }
}
