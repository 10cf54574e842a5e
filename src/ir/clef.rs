//! Clef-change placement
//!
//! Works on staff positions only: the base letter and octave of a note,
//! accidentals ignored. A clef change is granted when the active clef cannot
//! acceptably render a chord (some note would need more than three ledger
//! lines, or would sit on the wrong side of an ottava clef), and the change
//! is then anchored at the musically nicest spot available: an earlier clef
//! change is reused, else a whole-beat position, else the chord itself.
//!
//! To avoid back references between chords and their measures, the pass
//! first extracts a side list of (handle, range) records, then writes the
//! decisions back through the handles.

use num_rational::Rational32;
use num_traits::Zero;

use crate::ir::{Clef, LyStaff};
use crate::models::{Note, NoteBase};

/// Inclusive range of staff positions, low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NoteRange {
    low: Note,
    high: Note,
}

/// Staff position of a note: diatonic steps from C0, accidentals ignored.
fn staff_position(note: Note) -> i32 {
    note.octave * 7 + note.base.index()
}

fn note_at(position: i32) -> Note {
    Note::new(NoteBase::from_index(position.rem_euclid(7)), position.div_euclid(7), 0)
}

fn average_note(lhs: Note, rhs: Note) -> Note {
    note_at((staff_position(lhs) + staff_position(rhs)) / 2)
}

fn below(lhs: Note, rhs: Note) -> bool {
    staff_position(lhs) < staff_position(rhs)
}

fn merge_range(lhs: NoteRange, rhs: NoteRange) -> NoteRange {
    NoteRange {
        low: if below(lhs.low, rhs.low) { lhs.low } else { rhs.low },
        high: if below(lhs.high, rhs.high) { rhs.high } else { lhs.high },
    }
}

fn note(base: NoteBase, octave: i32) -> Note {
    Note::new(base, octave, 0)
}

/// The five-line window of each clef.
fn in_staff_range(clef: Clef) -> NoteRange {
    use NoteBase::*;
    match clef {
        Clef::BassOttavaBassa => NoteRange { low: note(G, 1), high: note(A, 2) },
        Clef::Bass => NoteRange { low: note(G, 2), high: note(A, 3) },
        Clef::Treble => NoteRange { low: note(E, 4), high: note(F, 5) },
        Clef::TrebleOttava => NoteRange { low: note(E, 5), high: note(F, 6) },
        // The "none" clef accepts nothing
        Clef::None => NoteRange { low: note(D, 0), high: note(C, 0) },
    }
}

fn ledger_lines(n: Note, clef: Clef) -> i32 {
    let range = in_staff_range(clef);
    let pos = staff_position(n);
    let low = staff_position(range.low);
    let high = staff_position(range.high);
    if pos < low {
        (low - pos) / 2
    } else if pos > high {
        (pos - high) / 2
    } else {
        0
    }
}

/// Pitches needing at most three ledger lines, and not extending away from
/// the octave-alteration direction of an ottava clef.
fn acceptable_range(clef: Clef) -> NoteRange {
    use NoteBase::*;
    match clef {
        Clef::BassOttavaBassa => NoteRange { low: note(C, -1), high: note(B, 2) },
        Clef::Bass => NoteRange { low: note(G, 1), high: note(A, 4) },
        Clef::Treble => NoteRange { low: note(E, 3), high: note(F, 6) },
        Clef::TrebleOttava => NoteRange { low: note(D, 5), high: note(G, 9) },
        Clef::None => NoteRange { low: note(D, 0), high: note(C, 0) },
    }
}

fn in_range(n: Note, range: NoteRange) -> bool {
    !below(n, range.low) && !below(range.high, n)
}

fn note_acceptable(n: Note, clef: Clef) -> bool {
    in_range(n, acceptable_range(clef))
}

fn range_acceptable(range: NoteRange, clef: Clef) -> bool {
    (note_acceptable(range.low, clef) && note_acceptable(range.high, clef))
        || note_acceptable(average_note(range.low, range.high), clef)
}

fn preferred_clef_for_note(n: Note) -> Clef {
    use NoteBase::*;
    if below(note(B, 5), n) {
        Clef::TrebleOttava // C6 and above
    } else if below(note(B, 3), n) {
        Clef::Treble // C4 and above
    } else if below(note(B, 1), n) {
        Clef::Bass // C2 and above
    } else {
        Clef::BassOttavaBassa
    }
}

fn preferred_clef(range: NoteRange) -> Clef {
    if staff_position(range.low) == staff_position(range.high) {
        return preferred_clef_for_note(range.low);
    }
    let low_pref = preferred_clef_for_note(range.low);
    let high_pref = preferred_clef_for_note(range.high);
    if low_pref == high_pref {
        return low_pref;
    }
    let low_acceptable = note_acceptable(range.high, low_pref);
    let high_acceptable = note_acceptable(range.low, high_pref);
    if low_acceptable != high_acceptable {
        // Only one covers the whole range
        return if low_acceptable { low_pref } else { high_pref };
    }
    if !low_acceptable && !high_acceptable {
        return preferred_clef_for_note(average_note(range.low, range.high));
    }
    // Both cover the range; pick the one with fewer ledger lines
    let ledger_low = ledger_lines(range.low, low_pref) + ledger_lines(range.high, low_pref);
    let ledger_high = ledger_lines(range.low, high_pref) + ledger_lines(range.high, high_pref);
    if ledger_low < ledger_high {
        low_pref
    } else {
        high_pref
    }
}

/// Handle to a chord in the staff plus its merged note range.
#[derive(Debug, Clone, Copy)]
struct ChordInfo {
    voice: usize,
    index: usize,
    start: Rational32,
    range: NoteRange,
}

/// Sounding chords of one measure, in start order.
struct MeasureChords {
    chords: Vec<ChordInfo>,
}

/// Place clef changes across a whole staff.
pub fn place_clef_changes(staff: &mut LyStaff) {
    let mut measures = extract_and_sort_chords(staff);
    for measure in &mut measures {
        merge_simultaneous_chords(&mut measure.chords);
    }
    find_clef_changes(staff, &measures);
    adjust_clef_changes(staff, &measures);
}

fn extract_and_sort_chords(staff: &LyStaff) -> Vec<MeasureChords> {
    let mut measures = Vec::with_capacity(staff.len());
    for in_measure in staff {
        let mut chords = Vec::new();
        for (v, voice) in in_measure.voices.iter().enumerate() {
            for (c, ly_chord) in voice.iter().enumerate() {
                let Some(chord) = &ly_chord.chord else { continue };
                if chord.notes.is_empty() {
                    continue;
                }
                let mut low = chord.notes[0];
                let mut high = chord.notes[0];
                for &n in &chord.notes[1..] {
                    if below(n, low) {
                        low = n;
                    }
                    if below(high, n) {
                        high = n;
                    }
                }
                chords.push(ChordInfo {
                    voice: v,
                    index: c,
                    start: ly_chord.start,
                    range: NoteRange { low, high },
                });
            }
        }
        chords.sort_by_key(|info| info.start);
        measures.push(MeasureChords { chords });
    }
    measures
}

fn merge_simultaneous_chords(chords: &mut Vec<ChordInfo>) {
    chords.dedup_by(|cur, prev| {
        if prev.start == cur.start {
            prev.range = merge_range(prev.range, cur.range);
            true
        } else {
            false
        }
    });
}

fn find_clef_changes(staff: &mut LyStaff, measures: &[MeasureChords]) {
    let clef_of = |staff: &LyStaff, m: usize, info: &ChordInfo| staff[m].voices[info.voice][info.index].clef_change;

    let mut current = Clef::None;
    for (i, measure) in measures.iter().enumerate() {
        for (j, chord) in measure.chords.iter().enumerate() {
            // Only grant a change when the active clef stops being acceptable
            if range_acceptable(chord.range, current) {
                continue;
            }
            current = preferred_clef(chord.range);

            // Anchor preference (highest to lowest): an earlier clef change
            // (overwrite it), the start of this measure, a whole beat in this
            // measure, the chord itself
            let anchor = 'anchor: {
                let mut info = (i, j);
                for k in (0..=j).rev() {
                    let ch = &measure.chords[k];
                    if !range_acceptable(ch.range, current) {
                        break 'anchor info;
                    }
                    if clef_of(staff, i, ch) != Clef::None {
                        break 'anchor (i, k);
                    }
                    // A whole beat; k == 0 also covers the first chord of the
                    // staff being preceded only by rests
                    if k == 0 || ch.start.is_integer() {
                        info = (i, k);
                    }
                }
                // Keep walking back through earlier measures looking for the
                // previous clef change to take over
                for m in (0..i).rev() {
                    for k in (0..measures[m].chords.len()).rev() {
                        let ch = &measures[m].chords[k];
                        if !range_acceptable(ch.range, current) {
                            break 'anchor info;
                        }
                        if clef_of(staff, m, ch) != Clef::None {
                            break 'anchor (m, k);
                        }
                    }
                }
                info
            };

            let (m, k) = anchor;
            let target = &measures[m].chords[k];
            staff[m].voices[target.voice][target.index].clef_change = current;
        }
    }
}

/// If a measure's first sounding chord is preceded only by rests or spacers,
/// show its clef change at the measure start instead.
fn adjust_clef_changes(staff: &mut LyStaff, measures: &[MeasureChords]) {
    for (i, measure) in measures.iter().enumerate() {
        let Some(first) = measure.chords.first() else { continue };
        if first.start.is_zero() {
            continue;
        }
        let clef = std::mem::replace(&mut staff[i].voices[first.voice][first.index].clef_change, Clef::None);
        for voice in &mut staff[i].voices {
            if let Some(chord) = voice.first_mut() {
                chord.clef_change = clef;
                break;
            }
        }
    }
}
