//! Recursive-descent parser for the beat notation
//!
//! Consumes preprocessed text (no whitespace, no macros) and produces
//! unmeasured music: sections of staves, each staff an ordered run of beats
//! where every beat carries its parallel voices plus any measure attributes
//! announced at its boundary. Measure grouping happens later, in
//! [`crate::parse::measurize`].
//!
//! The parser keeps a little running state: pending measure attributes,
//! pending chord attributes (tempo), the active transposition, and the
//! current written octave. All of it travels on the parser value itself.

use serde::{Deserialize, Serialize};

use crate::error::{NotationError, Result};
use crate::models::{Beat, Chord, ChordAttrs, Interval, IntervalQuality, MeasureAttrs, Note, NoteBase, Time};
use crate::parse::preprocessor::PreprocessedText;

/// A beat as parsed: its voices plus the measure attributes announced right
/// before it.
///
/// A *null* beat has no chords in any voice. Null beats are placeholders for
/// end-of-beat attributes and for aligning voices of different lengths; they
/// are resolved (attributes re-pended, voices filled with rests) before the
/// staff is finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatWithAttrs {
    pub beat: Beat,
    pub attrs: MeasureAttrs,
}

impl BeatWithAttrs {
    pub fn is_null(&self) -> bool {
        self.beat.iter().all(Vec::is_empty)
    }

    pub fn replace_nulls_with_rests(&mut self) {
        for voice in &mut self.beat {
            if voice.is_empty() {
                voice.push(Chord::default());
            }
        }
    }
}

pub type UnmeasuredStaff = Vec<BeatWithAttrs>;
pub type UnmeasuredSection = Vec<UnmeasuredStaff>;
pub type UnmeasuredMusic = Vec<UnmeasuredSection>;

/// The transposition applied to every parsed note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transposition {
    interval: Interval,
    up: bool,
}

impl Default for Transposition {
    fn default() -> Self {
        Transposition {
            interval: Interval { number: 1, quality: IntervalQuality::Perfect },
            up: true,
        }
    }
}

/// A byte range within the preprocessed text. Spans never cross the
/// multi-byte boundary of a character because every delimiter is ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn is_empty(self) -> bool {
        self.start >= self.end
    }
}

pub struct Parser {
    text: PreprocessedText,
    music: UnmeasuredMusic,
    measure_attrs: MeasureAttrs,
    chord_attrs: ChordAttrs,
    transposition: Transposition,
    octave: i32,
}

impl Parser {
    pub fn new(text: PreprocessedText) -> Self {
        Parser {
            text,
            music: Vec::new(),
            measure_attrs: MeasureAttrs::default(),
            chord_attrs: ChordAttrs::default(),
            transposition: Transposition::default(),
            octave: 4,
        }
    }

    pub fn parse(mut self) -> Result<UnmeasuredMusic> {
        // The first measure defaults to common time unless overridden
        self.measure_attrs.time = Some(Time::new(4, 4));
        let mut text = Span { start: 0, end: self.content().len() };
        while !text.is_empty() {
            let section = self.isolate_current_section(&mut text)?;
            self.parse_section(section)?;
        }
        Ok(self.music)
    }

    fn content(&self) -> &str {
        &self.text.text.content
    }

    fn s(&self, span: Span) -> &str {
        &self.text.text.content[span.start..span.end]
    }

    fn byte_at(&self, offset: usize) -> u8 {
        self.content().as_bytes()[offset]
    }

    fn pos_string(&self, offset: usize) -> String {
        let pos = self.text.text.positions.get(offset).copied().unwrap_or_default();
        self.text.position_string(pos)
    }

    /// First occurrence of any of `needles` within `span`.
    fn find_any(&self, span: Span, needles: &[char]) -> Option<usize> {
        self.content()[span.start..span.end].find(needles).map(|i| i + span.start)
    }

    fn split_spans(&self, text: Span, sep: u8) -> Vec<Span> {
        let bytes = self.content().as_bytes();
        let mut parts = Vec::new();
        let mut start = text.start;
        for i in text.start..text.end {
            if bytes[i] == sep {
                parts.push(Span { start, end: i });
                start = i + 1;
            }
        }
        parts.push(Span { start, end: text.end });
        parts
    }

    fn consume_byte(&self, text: &mut Span, byte: u8) -> bool {
        if !text.is_empty() && self.byte_at(text.start) == byte {
            text.start += 1;
            true
        } else {
            false
        }
    }

    fn consume_str(&self, text: &mut Span, prefix: &str) -> bool {
        if self.s(*text).starts_with(prefix) {
            text.start += prefix.len();
            true
        } else {
            false
        }
    }

    // Sections

    fn isolate_current_section(&self, text: &mut Span) -> Result<Span> {
        // Braced section
        if self.byte_at(text.start) == b'{' {
            let Some(idx) = self.find_any(*text, &['}']) else {
                return Err(NotationError::UnclosedBlock(format!(
                    "A section is not closed by a right curly brace '}}', starting {}",
                    self.pos_string(text.start)
                )));
            };
            let res = Span { start: text.start + 1, end: idx };
            text.start = idx + 1;
            return Ok(res);
        }
        // Brace-omitted section
        let idx = self.find_any(*text, &['{']).unwrap_or(text.end);
        let res = Span { start: text.start, end: idx };
        text.start = idx;
        Ok(res)
    }

    fn parse_section(&mut self, text: Span) -> Result<()> {
        if let Some(idx) = self.find_any(text, &['{']) {
            return Err(NotationError::NestedBlock(format!(
                "Sections are not nestable, but found '{{' in a section {}",
                self.pos_string(idx)
            )));
        }
        let mut section = UnmeasuredSection::new();
        let mut text = text;
        while !text.is_empty() {
            let staff = self.isolate_current_staff(&mut text)?;
            self.parse_staff(staff, &mut section)?;
        }
        // A section with no staves (only attributes) is dropped
        if !section.is_empty() {
            self.music.push(section);
        }
        Ok(())
    }

    // Staves

    fn isolate_current_staff(&self, text: &mut Span) -> Result<Span> {
        let mut idx = text.start;
        loop {
            let Some(i) = self.find_any(Span { start: idx, end: text.end }, &['[', ';']) else {
                let res = *text;
                text.start = text.end;
                return Ok(res);
            };
            // '[' starts a voiced segment; skip over it
            if self.byte_at(i) == b'[' {
                let Some(closing) = self.find_any(Span { start: i + 1, end: text.end }, &['[', ']']) else {
                    return Err(NotationError::UnclosedBlock(format!(
                        "A voiced segment is not closed by ']', starting {}",
                        self.pos_string(i)
                    )));
                };
                if self.byte_at(closing) == b'[' {
                    return Err(NotationError::NestedBlock(format!(
                        "Voices are not nestable, but found '[' in a voice {}",
                        self.pos_string(i)
                    )));
                }
                idx = closing + 1;
                continue;
            }
            // We have found a semicolon
            let res = Span { start: text.start, end: i };
            text.start = i + 1;
            return Ok(res);
        }
    }

    fn parse_staff(&mut self, text: Span, section: &mut UnmeasuredSection) -> Result<()> {
        let mut staff: UnmeasuredStaff = Vec::new();
        let mut text = text;
        while !text.is_empty() {
            let segment = self.isolate_current_voiced_segment(&mut text)?;
            self.parse_voiced_segment(segment, &mut staff)?;
        }
        // A staff containing only attribute-carrying null beats is dropped;
        // its attributes already moved back into the pending state
        if !(staff.is_empty() || staff[0].beat.is_empty()) {
            section.push(staff);
        }
        Ok(())
    }

    // Voiced segments

    fn isolate_current_voiced_segment(&self, text: &mut Span) -> Result<Span> {
        // Multi-voiced segment: the delimiters were validated while the staff
        // was isolated
        if self.byte_at(text.start) == b'[' {
            let Some(idx) = self.find_any(Span { start: text.start + 1, end: text.end }, &[']']) else {
                return Err(NotationError::UnclosedBlock(format!(
                    "A voiced segment is not closed by ']', starting {}",
                    self.pos_string(text.start)
                )));
            };
            let res = Span { start: text.start + 1, end: idx };
            text.start = idx + 1;
            return Ok(res);
        }
        let idx = self.find_any(*text, &['[']).unwrap_or(text.end);
        let res = Span { start: text.start, end: idx };
        text.start = idx;
        Ok(res)
    }

    fn parse_voiced_segment(&mut self, text: Span, staff: &mut UnmeasuredStaff) -> Result<()> {
        let starting_beat = staff.len();
        for (i, voice) in self.split_spans(text, b';').into_iter().enumerate() {
            self.parse_voice(voice, staff, starting_beat, i)?;
        }
        // If the last beat is a null beat, move its measure attributes back
        // into the pending state and drop the beat
        if let Some(last) = staff.last_mut() {
            if last.is_null() {
                self.measure_attrs = std::mem::take(&mut last.attrs);
                staff.pop();
            }
        }
        // Fill remaining null beats with rests
        for beat in &mut staff[starting_beat..] {
            beat.replace_nulls_with_rests();
        }
        Ok(())
    }

    fn parse_voice(
        &mut self,
        text: Span,
        staff: &mut UnmeasuredStaff,
        starting_beat: usize,
        voice_idx: usize,
    ) -> Result<()> {
        let mut beat_idx = starting_beat;
        let mut should_add_null_beat = false;
        let mut text = text;

        while !text.is_empty() {
            let beat_span = self.isolate_current_beat_in_voice(&mut text)?;
            ensure_beat(staff, beat_idx, voice_idx);
            self.parse_beat_in_voice(beat_span, &mut staff[beat_idx], voice_idx)?;
            // Only a normal trailing beat needs an extra null beat to carry
            // leftover attributes
            should_add_null_beat = !staff[beat_idx].beat[voice_idx].is_empty();
            beat_idx += 1;
        }

        if should_add_null_beat && !self.measure_attrs.is_null() {
            ensure_beat(staff, beat_idx, voice_idx);
            let attrs = std::mem::take(&mut self.measure_attrs);
            staff[beat_idx].attrs.merge_with(&attrs);
            beat_idx += 1;
        }

        // Fill up the current voice with null beats
        while beat_idx < staff.len() {
            staff[beat_idx].beat.push(Vec::new());
            beat_idx += 1;
        }
        Ok(())
    }

    // Beats

    fn isolate_current_beat_in_voice(&self, text: &mut Span) -> Result<Span> {
        let mut idx = text.start;
        loop {
            // Commas inside attribute blocks don't delimit beats
            let Some(i) = self.find_any(Span { start: idx, end: text.end }, &['%', ',']) else {
                let res = *text;
                text.start = text.end;
                return Ok(res);
            };
            if self.byte_at(i) == b'%' {
                let Some(closing) = self.find_any(Span { start: i + 1, end: text.end }, &['%']) else {
                    return Err(NotationError::UnclosedBlock(format!(
                        "Attribute specification block is not closed with another '%', beginning {}",
                        self.pos_string(i)
                    )));
                };
                idx = closing + 1;
                continue;
            }
            // Include the comma in the beat's span
            let res = Span { start: text.start, end: i + 1 };
            text.start = i + 1;
            return Ok(res);
        }
    }

    fn parse_beat_in_voice(&mut self, text: Span, beat: &mut BeatWithAttrs, voice_idx: usize) -> Result<()> {
        let mut text = text;
        while !(text.is_empty() || self.s(text) == ",") {
            if self.parse_attributes(&mut text)? {
                continue;
            }
            let chord = self.parse_chord(&mut text)?;
            beat.beat[voice_idx].push(chord);
            if beat.beat[voice_idx].len() == 1 {
                // Chord at the start of a beat consumes the pending attributes
                let attrs = std::mem::take(&mut self.measure_attrs);
                beat.attrs.merge_with(&attrs);
            } else {
                // Measure attributes may not appear mid-beat
                self.ensure_no_measure_attributes(text.start)?;
            }
        }

        if !text.is_empty() && self.s(text) == "," && beat.beat[voice_idx].is_empty() {
            // An empty delimited beat becomes a rest
            let chord = Chord {
                attributes: std::mem::take(&mut self.chord_attrs),
                ..Chord::default()
            };
            beat.beat[voice_idx].push(chord);
            let attrs = std::mem::take(&mut self.measure_attrs);
            beat.attrs.merge_with(&attrs);
        } else if text.is_empty() {
            if !beat.beat[voice_idx].is_empty() {
                return Err(NotationError::BeatUnterminated(format!(
                    "A beat should end with a comma, but a beat ends unexpectedly without the comma {}",
                    self.pos_string(text.start)
                )));
            }
            // Apply measure attributes to the null beat
            let attrs = std::mem::take(&mut self.measure_attrs);
            beat.attrs.merge_with(&attrs);
        }
        Ok(())
    }

    // Attributes

    fn parse_attributes(&mut self, text: &mut Span) -> Result<bool> {
        if self.byte_at(text.start) != b'%' {
            return Ok(false);
        }
        let Some(idx) = self.find_any(Span { start: text.start + 1, end: text.end }, &['%']) else {
            return Err(NotationError::UnclosedBlock(format!(
                "Attribute specification block is not closed with another '%', beginning {}",
                self.pos_string(text.start)
            )));
        };
        let attrs_view = Span { start: text.start + 1, end: idx };
        text.start = idx + 1;
        for attr in self.split_spans(attrs_view, b',') {
            self.parse_one_attribute(attr)?;
        }
        Ok(true)
    }

    fn parse_one_attribute(&mut self, text: Span) -> Result<()> {
        if text.is_empty() {
            return Err(NotationError::EmptyAttribute(format!(
                "Empty attribute found {}",
                self.pos_string(text.start)
            )));
        }
        let first = self.byte_at(text.start);
        if first == b'+' || first == b'-' {
            self.parse_transposition(text)
        } else if self.find_any(text, &['/']).is_some() {
            self.parse_time_signature(text)
        } else if matches!(self.byte_at(text.end - 1), b's' | b'f') {
            self.parse_key_signature(text)
        } else {
            self.parse_tempo(text)
        }
    }

    fn parse_transposition(&mut self, text: Span) -> Result<()> {
        let up = self.byte_at(text.start) == b'+';
        let mut t = Span { start: text.start + 1, end: text.end };
        if t.is_empty() {
            return Err(NotationError::BadTransposition(format!(
                "Transposition specifier unexpectedly ends {}",
                self.pos_string(t.start)
            )));
        }

        let quality = match self.byte_at(t.start) {
            b'd' => IntervalQuality::Diminished,
            b'm' => IntervalQuality::Minor,
            b'P' => IntervalQuality::Perfect,
            b'M' => IntervalQuality::Major,
            b'A' => IntervalQuality::Augmented,
            other => {
                return Err(NotationError::BadTransposition(format!(
                    "Expecting interval quality abbreviation, only 'd' for diminished, 'm' for minor, \
                     'P' for perfect, 'M' for major, and 'A' for augmented is accepted, but found '{}' {}",
                    other as char,
                    self.pos_string(t.start)
                )))
            }
        };
        t.start += 1;

        let number = match self.s(t).parse::<u32>() {
            Ok(n) if (1..=8).contains(&n) => n,
            _ => {
                return Err(NotationError::BadTransposition(format!(
                    "Expecting an integer between 1 and 8 for the diatonic number of the \
                     transposition interval, but found '{}' {}",
                    self.s(t),
                    self.pos_string(t.start)
                )))
            }
        };

        let Some(interval) = Interval::new(number, quality) else {
            return Err(NotationError::BadTransposition(format!(
                "The interval quality does not fit the diatonic number {} (unisons, fourths and \
                 fifths take diminished, perfect or augmented; other numbers take diminished, \
                 minor, major or augmented), {}",
                number,
                self.pos_string(text.start)
            )));
        };
        self.transposition = Transposition { interval, up };
        Ok(())
    }

    fn parse_time_signature(&mut self, text: Span) -> Result<()> {
        let slash = self.find_any(text, &['/']).expect("checked by the caller");
        let partial = text.end > slash + 2 && self.byte_at(slash + 1) == b'/';
        let num_span = Span { start: text.start, end: slash };
        let den_span = Span { start: slash + if partial { 2 } else { 1 }, end: text.end };

        let check_number = |span: Span, name: &str| -> Result<i32> {
            match self.s(span).parse::<i32>() {
                Ok(n) if (1..=128).contains(&n) => Ok(n),
                _ => Err(NotationError::BadTimeSignature(format!(
                    "The {} of a time signature should be a positive integer no greater than 128, \
                     but got '{}' {}",
                    name,
                    self.s(span),
                    self.pos_string(span.start)
                ))),
            }
        };
        let num = check_number(num_span, "numerator")?;
        let den = check_number(den_span, "denominator")?;

        if !(den as u32).is_power_of_two() {
            return Err(NotationError::BadTimeSignature(format!(
                "The denominator of a time signature should be a power of 2, but got {} {}",
                den,
                self.pos_string(den_span.start)
            )));
        }

        let time = Time::new(num, den);
        if partial {
            self.measure_attrs.partial = Some(time);
        } else {
            self.measure_attrs.time = Some(time);
        }
        Ok(())
    }

    fn parse_key_signature(&mut self, text: Span) -> Result<()> {
        let suffix = self.byte_at(text.end - 1);
        let sign = if suffix == b's' { 1 } else { -1 };
        let t = Span { start: text.start, end: text.end - 1 };
        let Ok(num) = self.s(t).parse::<i32>() else {
            return Err(NotationError::BadKeySignature(format!(
                "A key signature specification should be a number followed by 's' or 'f' to \
                 indicate the amount of sharps or flats in that key signature, but got {}{} {}",
                self.s(t),
                suffix as char,
                self.pos_string(t.start)
            )));
        };
        if !(0..=7).contains(&num) {
            return Err(NotationError::BadKeySignature(format!(
                "The amount of sharps or flats in a key signature should be between 0 and 7, \
                 but got {} {}",
                num,
                self.pos_string(t.start)
            )));
        }
        self.measure_attrs.key = Some(num * sign);
        Ok(())
    }

    fn parse_tempo(&mut self, text: Span) -> Result<()> {
        let Ok(tempo) = self.s(text).parse::<f32>() else {
            return Err(NotationError::BadTempo(format!(
                "Unknown attribute '{}' {}",
                self.s(text),
                self.pos_string(text.start)
            )));
        };
        if !(10.0..=1000.0).contains(&tempo) {
            return Err(NotationError::BadTempo(format!(
                "Tempo markings should be between 10 and 1000, but got {} {}",
                tempo,
                self.pos_string(text.start)
            )));
        }
        self.chord_attrs.tempo = Some(tempo);
        Ok(())
    }

    fn ensure_no_measure_attributes(&self, offset: usize) -> Result<()> {
        if self.measure_attrs.time.is_some() || self.measure_attrs.partial.is_some() {
            return Err(NotationError::AttributeMisplaced(format!(
                "Time signatures should only appear at the beginning of bars, but got a time \
                 signature before a chord in the middle of a beat {}",
                self.pos_string(offset)
            )));
        }
        if self.measure_attrs.key.is_some() {
            return Err(NotationError::AttributeMisplaced(format!(
                "Key signatures should only appear at the beginning of bars, but got a key \
                 signature before a chord in the middle of a beat {}",
                self.pos_string(offset)
            )));
        }
        Ok(())
    }

    // Chords and notes

    fn parse_chord(&mut self, text: &mut Span) -> Result<Chord> {
        let mut chord = Chord {
            attributes: std::mem::take(&mut self.chord_attrs),
            ..Chord::default()
        };
        // Rest
        if self.consume_byte(text, b'.') {
            return Ok(chord);
        }
        // Sustain
        if self.consume_byte(text, b'-') {
            chord.sustained = true;
            return Ok(chord);
        }
        // Multi-note chord
        if self.consume_byte(text, b'(') {
            while !self.consume_byte(text, b')') {
                let note = self.parse_note(text)?;
                chord.notes.push(note);
            }
            return Ok(chord);
        }
        // Single note
        let note = self.parse_note(text)?;
        chord.notes.push(note);
        Ok(chord)
    }

    fn parse_note(&mut self, text: &mut Span) -> Result<Note> {
        if text.is_empty() {
            return Err(NotationError::ChordUnterminated(format!(
                "Expecting a note in the chord, but the beat unexpectedly ends {}",
                self.pos_string(text.start)
            )));
        }
        let first = self.byte_at(text.start);
        if first == b'.' || first == b'-' {
            return Err(NotationError::ParensInRestOrSustain(format!(
                "A chord enclosed with parentheses '()' should not contain rests '.' or sustain \
                 markings '-', but got one {}",
                self.pos_string(text.start)
            )));
        }
        if !(b'A'..=b'G').contains(&first) {
            return Err(NotationError::BadNoteBase(format!(
                "The base of a note should be an upper-cased letter from A to G, but got {} {}",
                first as char,
                self.pos_string(text.start)
            )));
        }

        let full_start = text.start;
        const BASES: [NoteBase; 7] = [
            NoteBase::A,
            NoteBase::B,
            NoteBase::C,
            NoteBase::D,
            NoteBase::E,
            NoteBase::F,
            NoteBase::G,
        ];
        let base = BASES[(first - b'A') as usize];
        text.start += 1;

        let accidental = if self.consume_byte(text, b'x') {
            2
        } else if self.consume_byte(text, b'#') {
            1
        } else if self.consume_str(text, "bb") {
            -2
        } else if self.consume_byte(text, b'b') {
            -1
        } else {
            0
        };

        if let Some(span) = self.consume_int(text) {
            let octave = match self.s(span).parse::<i32>() {
                Ok(o) if (-2..=10).contains(&o) => o,
                _ => {
                    return Err(NotationError::BadOctave(format!(
                        "Octave specifier should be an integer between -2 and 10, but got {} {}",
                        self.s(span),
                        self.pos_string(full_start)
                    )))
                }
            };
            self.octave = octave;
        }

        let mut octave_diff = 0;
        while !text.is_empty() {
            match self.byte_at(text.start) {
                b'<' => octave_diff -= 1,
                b'>' => octave_diff += 1,
                _ => break,
            }
            text.start += 1;
        }

        let written = Note::new(base, self.octave + octave_diff, accidental);
        let note = if self.transposition.up {
            written.transposed_up_by(self.transposition.interval)
        } else {
            written.transposed_down_by(self.transposition.interval)
        };
        if note.midi_pitch().is_none() {
            let lexeme = &self.content()[full_start..text.start];
            return Err(NotationError::NoteOutOfRange(format!(
                "The note {} applied with a transposition of {} semitone(s) {} gets a pitch id \
                 out of the range 0 to 127, {}",
                lexeme,
                self.transposition.interval.semitones(),
                if self.transposition.up { "upwards" } else { "downwards" },
                self.pos_string(full_start)
            )));
        }
        Ok(note)
    }

    /// Consume a leading (possibly negative) integer literal, returning its
    /// span. Consumes nothing when no digits follow.
    fn consume_int(&self, text: &mut Span) -> Option<Span> {
        let bytes = self.content().as_bytes();
        let mut i = text.start;
        if i < text.end && bytes[i] == b'-' {
            i += 1;
        }
        let digits_start = i;
        while i < text.end && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_start {
            return None;
        }
        let span = Span { start: text.start, end: i };
        text.start = i;
        Some(span)
    }
}

/// Make sure beat `idx` exists and already knows about voices `0..=voice_idx`,
/// padding earlier-created voices with null entries as needed.
fn ensure_beat(staff: &mut UnmeasuredStaff, idx: usize, voice_idx: usize) {
    if idx >= staff.len() {
        staff.push(BeatWithAttrs::default());
    }
    let beat = &mut staff[idx];
    while beat.beat.len() <= voice_idx {
        beat.beat.push(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parse::preprocessor::Preprocessor;

    fn parse(text: &str) -> UnmeasuredMusic {
        try_parse(text).expect("parsing failed")
    }

    fn try_parse(text: &str) -> Result<UnmeasuredMusic> {
        Parser::new(Preprocessor::new(text).process()?).parse()
    }

    fn single_note(music: &UnmeasuredMusic, beat: usize) -> Note {
        music[0][0][beat].beat[0][0].notes[0]
    }

    #[test]
    fn empty_input_is_empty_music() {
        assert_eq!(parse(""), Vec::<UnmeasuredSection>::new());
    }

    #[test]
    fn single_beat_carries_default_time() {
        let music = parse("C,");
        assert_eq!(music.len(), 1);
        assert_eq!(music[0].len(), 1);
        let staff = &music[0][0];
        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].attrs.time, Some(Time::new(4, 4)));
        assert_eq!(staff[0].beat, vec![vec![Chord {
            notes: vec![Note::new(NoteBase::C, 4, 0)],
            ..Chord::default()
        }]]);
    }

    #[test]
    fn octave_state_persists_between_notes() {
        let music = parse("C5,D,C3>,E,");
        assert_eq!(single_note(&music, 0).octave, 5);
        assert_eq!(single_note(&music, 1).octave, 5);
        // '>' shifts only the one note; the running octave stays 3
        assert_eq!(single_note(&music, 2).octave, 4);
        assert_eq!(single_note(&music, 3).octave, 3);
    }

    #[test]
    fn accidentals_parse() {
        let music = parse("C#,Db,Ex,Fbb,");
        assert_eq!(single_note(&music, 0).accidental, 1);
        assert_eq!(single_note(&music, 1).accidental, -1);
        assert_eq!(single_note(&music, 2).accidental, 2);
        assert_eq!(single_note(&music, 3).accidental, -2);
    }

    #[test]
    fn rests_sustains_and_chords() {
        let music = parse(".,-,(CEG),");
        let staff = &music[0][0];
        assert!(staff[0].beat[0][0].notes.is_empty());
        assert!(!staff[0].beat[0][0].sustained);
        assert!(staff[1].beat[0][0].sustained);
        assert_eq!(staff[2].beat[0][0].notes.len(), 3);
    }

    #[test]
    fn empty_beat_is_a_rest() {
        let music = parse("C,,D,");
        let staff = &music[0][0];
        assert_eq!(staff.len(), 3);
        assert!(staff[1].beat[0][0].notes.is_empty());
    }

    #[test]
    fn tempo_attaches_to_next_chord() {
        let music = parse("%120%C,D,");
        let staff = &music[0][0];
        assert_eq!(staff[0].beat[0][0].attributes.tempo, Some(120.0));
        assert_eq!(staff[1].beat[0][0].attributes.tempo, None);
    }

    #[test]
    fn time_and_key_attributes_pend_to_the_beat() {
        let music = parse("%3/4,2f%C,E,G,");
        let staff = &music[0][0];
        assert_eq!(staff[0].attrs.time, Some(Time::new(3, 4)));
        assert_eq!(staff[0].attrs.key, Some(-2));
        assert!(staff[1].attrs.is_null());
    }

    #[test]
    fn partial_measure_attribute() {
        let music = parse("%1//4%C,%3/4%D,E,F,");
        let staff = &music[0][0];
        assert_eq!(staff[0].attrs.partial, Some(Time::new(1, 4)));
        assert_eq!(staff[1].attrs.time, Some(Time::new(3, 4)));
    }

    #[test]
    fn trailing_attributes_carry_into_next_staff() {
        let music = parse("C,%3/4%;D,");
        let section = &music[0];
        assert_eq!(section.len(), 2);
        assert_eq!(section[0].len(), 1, "null beat should be dropped");
        assert_eq!(section[1][0].attrs.time, Some(Time::new(3, 4)));
    }

    #[test]
    fn transposition_applies_to_following_notes() {
        let music = parse("C,%+P5%C,%-M2%C,");
        assert_eq!(single_note(&music, 0), Note::new(NoteBase::C, 4, 0));
        assert_eq!(single_note(&music, 1), Note::new(NoteBase::G, 4, 0));
        assert_eq!(single_note(&music, 2), Note::new(NoteBase::B, 3, -1));
    }

    #[test]
    fn voices_in_segment_align_by_padding() {
        let music = parse("[C,D,E,;F,]");
        let staff = &music[0][0];
        assert_eq!(staff.len(), 3);
        for beat in staff {
            assert_eq!(beat.beat.len(), 2);
        }
        // Voice 2 only has one real beat; the rest are filled with rests
        assert!(staff[1].beat[1][0].notes.is_empty());
        assert!(staff[2].beat[1][0].notes.is_empty());
    }

    #[test]
    fn multiple_staves_split_on_semicolon() {
        let music = parse("C,D,;E,F,");
        assert_eq!(music[0].len(), 2);
        assert_eq!(music[0][0].len(), 2);
        assert_eq!(music[0][1].len(), 2);
    }

    #[test]
    fn sections_split_on_braces() {
        let music = parse("{C,}{D,}E,");
        assert_eq!(music.len(), 3);
    }

    #[test]
    fn nested_braces_fail() {
        assert!(matches!(try_parse("{C,{D,}}").unwrap_err(), NotationError::NestedBlock(_)));
    }

    #[test]
    fn nested_voices_fail() {
        assert!(matches!(try_parse("[C,[D,]]").unwrap_err(), NotationError::NestedBlock(_)));
    }

    #[test]
    fn missing_comma_fails() {
        assert!(matches!(try_parse("C").unwrap_err(), NotationError::BeatUnterminated(_)));
    }

    #[test]
    fn rest_inside_parens_fails() {
        assert!(matches!(try_parse("(C.),").unwrap_err(), NotationError::ParensInRestOrSustain(_)));
    }

    #[test]
    fn bad_note_base_fails() {
        assert!(matches!(try_parse("H,").unwrap_err(), NotationError::BadNoteBase(_)));
    }

    #[test]
    fn bad_octave_fails() {
        assert!(matches!(try_parse("C11,").unwrap_err(), NotationError::BadOctave(_)));
        assert!(matches!(try_parse("C-3,").unwrap_err(), NotationError::BadOctave(_)));
    }

    #[test]
    fn attribute_mid_beat_fails() {
        let err = try_parse("(C)%3/4%(D),").unwrap_err();
        assert!(matches!(err, NotationError::AttributeMisplaced(_)), "{err}");
    }

    #[test]
    fn bad_time_signatures_fail() {
        for text in ["%0/4%C,", "%4/3%C,", "%4/129%C,", "%x/4%C,"] {
            assert!(matches!(try_parse(text).unwrap_err(), NotationError::BadTimeSignature(_)), "{text}");
        }
    }

    #[test]
    fn bad_key_signatures_fail() {
        for text in ["%8s%C,", "%xf%C,"] {
            assert!(matches!(try_parse(text).unwrap_err(), NotationError::BadKeySignature(_)), "{text}");
        }
    }

    #[test]
    fn bad_tempo_fails() {
        for text in ["%5%C,", "%1001%C,", "%blah%C,"] {
            assert!(matches!(try_parse(text).unwrap_err(), NotationError::BadTempo(_)), "{text}");
        }
    }

    #[test]
    fn bad_transpositions_fail() {
        for text in ["%+%C,", "%+q3%C,", "%+M9%C,", "%+P3%C,", "%+M5%C,"] {
            assert!(matches!(try_parse(text).unwrap_err(), NotationError::BadTransposition(_)), "{text}");
        }
    }

    #[test]
    fn out_of_range_notes_fail() {
        let err = try_parse("%-P8%C-2,").unwrap_err();
        assert!(matches!(err, NotationError::NoteOutOfRange(_)), "{err}");
    }

    #[test]
    fn empty_attribute_fails() {
        assert!(matches!(try_parse("%%C,").unwrap_err(), NotationError::EmptyAttribute(_)));
        assert!(matches!(try_parse("%120,%C,").unwrap_err(), NotationError::EmptyAttribute(_)));
    }
}
