//! LilyPond source formatter
//!
//! Mechanical serialization of the engraving IR into LilyPond tokens. All
//! musical decisions were made by the earlier passes; the only state kept
//! here is the clef currently in effect, so redundant `\clef`/`\ottava`
//! marks are dropped at the token level too.

use std::io::{self, Write};

use num_rational::Rational32;

use crate::ir::{Clef, LyMeasure, LyMusic, LyStaff, LyVoice, TupletPos};
use crate::models::{Chord, MeasureAttrs, Note, Time};
use crate::renderers::lilypond::writer::IndentedWriter;

/// Key signature names indexed by `key + 7` (flats negative, sharps positive).
const KEY_NAMES: [&str; 15] = [
    "cf", "gf", "df", "af", "ef", "bf", "f", "c", "g", "d", "a", "e", "b", "fs", "cs",
];

/// Spellings of whole-note multiples; empty entries are not single notes.
const LONG_DURATION_NAMES: [&str; 8] =
    ["", "1", "\\breve", "\\breve.", "\\longa", "", "\\longa.", "\\longa.."];

pub fn write_ly_music(out: &mut dyn Write, music: &LyMusic) -> io::Result<()> {
    LyFormatter::new(out).write(music)
}

struct LyFormatter<'a> {
    file: IndentedWriter<'a>,
    current_clef: Clef,
}

impl<'a> LyFormatter<'a> {
    fn new(out: &'a mut dyn Write) -> Self {
        LyFormatter { file: IndentedWriter::new(out), current_clef: Clef::None }
    }

    fn write(&mut self, music: &LyMusic) -> io::Result<()> {
        self.file.println("\\version \"2.22.1\"")?;
        self.file.println("\\language \"english\"")?;

        self.file.open_scope("singleVoice = ")?;
        self.file.println("\\stemNeutral")?;
        self.file.println("\\tieNeutral")?;
        self.file.println("\\dotsNeutral")?;
        self.file.println("\\tupletNeutral")?;
        self.file.println("\\override Rest.voiced-position = 0")?;
        self.file.close_scope()?;

        self.file.open_scope("\\score")?;
        {
            self.file.open_scope("\\layout")?;
            {
                self.file.open_scope("\\context")?;
                self.file.println("\\Staff")?;
                self.file.println("\\override VerticalAxisGroup #'remove-first = ##t")?;
                self.file.println("\\consists \"Merge_rests_engraver\"")?;
                self.file.close_scope()?;

                self.file.open_scope("\\context")?;
                self.file.println("\\PianoStaff")?;
                self.file.println("\\remove \"Keep_alive_together_engraver\"")?;
                self.file.close_scope()?;
            }
            self.file.close_scope()?;

            self.file.open_scope("\\midi")?;
            self.file.close_scope()?;

            self.file.open_scope("")?;
            {
                self.file.open_scope("\\new PianoStaff")?;
                self.file.println("<<")?;
                for staff in music {
                    self.file.open_scope("\\new Staff")?;
                    self.file.println("\\numericTimeSignature")?;
                    self.write_staff(staff)?;
                    self.file.close_scope()?;
                }
                self.file.println(">>")?;
                self.file.close_scope()?;
            }
            self.file.close_scope()?;
        }
        self.file.close_scope()
    }

    fn write_staff(&mut self, staff: &LyStaff) -> io::Result<()> {
        self.current_clef = Clef::None;
        let n_max_voices = staff.iter().map(|m| m.voices.len()).max().unwrap_or(0);
        for measure in staff {
            self.write_measure_attributes(&measure.attributes)?;
            self.write_measure(measure, n_max_voices)?;
        }
        Ok(())
    }

    fn write_measure_attributes(&mut self, attrs: &MeasureAttrs) -> io::Result<()> {
        if let Some(time) = attrs.time {
            self.file.println(&format!("\\time {}/{}", time.numerator, time.denominator))?;
        }
        if let Some(partial) = attrs.partial {
            self.file.println(&format!("\\partial {}*{}", partial.denominator, partial.numerator))?;
        }
        if let Some(key) = attrs.key {
            self.file.println(&format!("\\key {} \\major", KEY_NAMES[(key + 7) as usize]))?;
        }
        Ok(())
    }

    fn write_measure(&mut self, measure: &LyMeasure, n_max_voices: usize) -> io::Result<()> {
        let n_sounding = measure.voices.iter().filter(|v| is_sounding_voice(v)).count();
        if n_sounding == 0 {
            // A full-measure rest, shared by all voices
            return self.file.println(&format!(
                "R{}*{}",
                measure.current_partial.denominator, measure.current_partial.numerator
            ));
        }

        self.file.print("<< ")?;
        for (i, voice) in measure.voices.iter().enumerate() {
            if i != 0 {
                self.file.println("\\\\")?;
            }
            self.file.print("{ ")?;
            if is_sounding_voice(voice) {
                if n_sounding == 1 {
                    self.file.print("\\singleVoice ")?;
                }
                self.write_voice(voice, measure.current_partial)?;
            } else {
                self.file.print(&format!(
                    "s{}*{}",
                    measure.current_partial.denominator, measure.current_partial.numerator
                ))?;
            }
            self.file.print("} ")?;
        }
        // Pad so every measure exposes the same voice count to LilyPond
        let padding = "\\".repeat(2 * (n_max_voices - measure.voices.len()));
        self.file.println(&format!("{padding}>>"))
    }

    fn write_voice(&mut self, voice: &LyVoice, measure_time: Time) -> io::Result<()> {
        let mut in_tuplet = false;
        for (idx, chord) in voice.iter().enumerate() {
            self.write_clef(chord.clef_change)?;

            if chord.tuplet.pos == TupletPos::Head && !in_tuplet {
                in_tuplet = true;
                let ratio = chord.tuplet.ratio;
                if !(*ratio.denom() as u32).is_power_of_two() {
                    self.file
                        .print("\\once \\override TupletNumber.text = #tuplet-number::calc-fraction-text ")?;
                }
                self.file.print(&format!("\\tuplet {}/{} {{ ", ratio.numer(), ratio.denom()))?;
            }

            let end = if idx + 1 == voice.len() {
                Rational32::from_integer(measure_time.numerator)
            } else {
                voice[idx + 1].start
            };
            let duration = (end - chord.start) / measure_time.denominator * chord.tuplet.ratio;
            self.write_chord_with_duration(&chord.chord, duration)?;

            if chord.tuplet.pos == TupletPos::Last {
                self.file.print("} ")?;
                in_tuplet = false;
            }
        }
        Ok(())
    }

    fn write_clef(&mut self, clef: Clef) -> io::Result<()> {
        if clef == Clef::None {
            return Ok(());
        }
        let is_treble = derived_from_treble(clef);
        if self.current_clef == Clef::None || is_treble != derived_from_treble(self.current_clef) {
            self.file.print(&format!("\\clef {} ", if is_treble { "treble" } else { "bass" }))?;
        }
        let ottava = ottava_marking(clef);
        if ottava != ottava_marking(self.current_clef) {
            self.file.print(&format!("\\ottava #{ottava} "))?;
        }
        self.current_clef = clef;
        Ok(())
    }

    fn write_chord_with_duration(&mut self, chord: &Option<Chord>, duration: Rational32) -> io::Result<()> {
        self.write_chord_notes(chord)?;
        self.write_duration(duration)?;
        if let Some(chord) = chord {
            if chord.sustained {
                self.file.print("~ ")?;
            }
        }
        Ok(())
    }

    fn write_chord_notes(&mut self, chord: &Option<Chord>) -> io::Result<()> {
        let Some(chord) = chord else {
            // Spacer
            return self.file.print("s");
        };

        if let Some(tempo) = chord.attributes.tempo {
            self.file.print(&format!("\\tempo 4={} ", tempo as i32))?;
        }

        if chord.notes.is_empty() {
            return self.file.print("r");
        }

        if chord.notes.len() > 1 {
            self.file.print("< ")?;
        }
        for &note in &chord.notes {
            self.write_note(note)?;
        }
        if chord.notes.len() > 1 {
            self.file.print("> ")?;
        }
        Ok(())
    }

    fn write_note(&mut self, note: Note) -> io::Result<()> {
        const BASE_NAMES: [char; 7] = ['c', 'd', 'e', 'f', 'g', 'a', 'b'];
        const ACCIDENTALS: [&str; 5] = ["ff", "f", "", "s", "ss"];

        let base = BASE_NAMES[note.base.index() as usize];
        let accidental = ACCIDENTALS[(note.accidental + 2) as usize];
        let delta = note.octave - 3;
        let octave = if delta > 0 {
            "'".repeat(delta as usize)
        } else {
            ",".repeat(-delta as usize)
        };
        self.file.print(&format!("{base}{accidental}{octave} "))
    }

    fn write_duration(&mut self, duration: Rational32) -> io::Result<()> {
        match spell_duration(duration) {
            Some(spelled) => self.file.print(&format!("{spelled} ")),
            None => {
                // Unspellable durations indicate a partitioner bug; emit a
                // raw multiplier so the output still compiles
                log::warn!("unspellable duration {duration}, emitting a raw multiplier");
                self.file.print(&format!("1*{}/{} ", duration.numer(), duration.denom()))
            }
        }
    }
}

fn is_sounding_voice(voice: &LyVoice) -> bool {
    voice
        .iter()
        .any(|c| c.chord.as_ref().is_some_and(|chord| !chord.notes.is_empty()))
}

fn ottava_marking(clef: Clef) -> i32 {
    match clef {
        Clef::BassOttavaBassa => -1,
        Clef::TrebleOttava => 1,
        _ => 0,
    }
}

fn derived_from_treble(clef: Clef) -> bool {
    matches!(clef, Clef::Treble | Clef::TrebleOttava)
}

/// Spell a duration (in whole notes) as a single LilyPond duration token.
fn spell_duration(duration: Rational32) -> Option<String> {
    let den = *duration.denom();
    if !(den as u32).is_power_of_two() {
        return None;
    }

    // Whole-note multiples
    if den == 1 {
        return long_duration_name(*duration.numer()).map(str::to_owned);
    }

    // Plain powers of two
    if *duration.numer() == 1 {
        return Some(den.to_string());
    }

    // Dotted durations: base * (2 - 2^-dots)
    let delta = Rational32::new(1, den);
    let rounded = (duration + delta) / 2;
    let multi = rounded / delta;
    if !multi.is_integer() || !(multi.to_integer() as u32).is_power_of_two() {
        return None;
    }
    let dots = (multi.to_integer() as u32).ilog2() as usize;

    let base = if *rounded.denom() == 1 {
        long_duration_name(*rounded.numer())?.to_owned()
    } else {
        rounded.denom().to_string()
    };
    Some(format!("{base}{}", ".".repeat(dots)))
}

fn long_duration_name(numer: i32) -> Option<&'static str> {
    // Five whole notes cannot be one dotted note; the partitioner is
    // expected to have split such durations already
    debug_assert_ne!(numer, 5, "a five-whole-note duration escaped the partitioner");
    if !(1..=7).contains(&numer) || numer == 5 {
        return None;
    }
    Some(LONG_DURATION_NAMES[numer as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i32, d: i32) -> Rational32 {
        Rational32::new(n, d)
    }

    #[test]
    fn plain_durations_spell_as_numbers() {
        assert_eq!(spell_duration(r(1, 4)).as_deref(), Some("4"));
        assert_eq!(spell_duration(r(1, 16)).as_deref(), Some("16"));
        assert_eq!(spell_duration(r(1, 1)).as_deref(), Some("1"));
    }

    #[test]
    fn long_durations_spell_with_names() {
        assert_eq!(spell_duration(r(2, 1)).as_deref(), Some("\\breve"));
        assert_eq!(spell_duration(r(3, 1)).as_deref(), Some("\\breve."));
        assert_eq!(spell_duration(r(4, 1)).as_deref(), Some("\\longa"));
        assert_eq!(spell_duration(r(6, 1)).as_deref(), Some("\\longa."));
        assert_eq!(spell_duration(r(7, 1)).as_deref(), Some("\\longa.."));
    }

    #[test]
    fn dotted_durations_add_dots() {
        assert_eq!(spell_duration(r(3, 8)).as_deref(), Some("4."));
        assert_eq!(spell_duration(r(7, 32)).as_deref(), Some("8.."));
        assert_eq!(spell_duration(r(3, 2)).as_deref(), Some("1."));
        assert_eq!(spell_duration(r(7, 2)).as_deref(), Some("\\breve.."));
    }

    #[test]
    fn unspellable_durations_fall_back() {
        assert_eq!(spell_duration(r(5, 8)), None);
        assert_eq!(spell_duration(r(1, 3)), None);
        assert_eq!(spell_duration(r(9, 1)), None);
    }
}
