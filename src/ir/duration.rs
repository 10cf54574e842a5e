//! Duration partitioning
//!
//! Splits each measure's voices until every chord covers a duration LilyPond
//! can spell: a power-of-two note value, possibly dotted, possibly inside a
//! tuplet bracket. Splitting inserts a copy of the chord at the cut position
//! and ties the two halves together.
//!
//! Two mechanisms cooperate:
//!
//! - *Grouping*: the time signature dictates group boundaries (a 7/8 measure
//!   splits 4+3, a 5/8 measure 3+2, compound and plain regular measures form
//!   one group). A cut is forced at every group end so no chord crosses it.
//! - *Tuplet spans*: maximal runs of chords at non-power-of-two positions.
//!   Each span gets a power-of-two grid derived from the gcd of its chord
//!   spacings, surplus grid points are thinned out again, the bracket ratio
//!   is normalized to an odd numerator over a power of two, and any compound
//!   duration left inside the bracket is split into spellable pieces.

use num_integer::Integer;
use num_rational::Rational32;
use num_traits::Zero;

use crate::ir::{LyChord, LyMeasure, LyVoice, TupletAttrs, TupletPos};
use crate::models::{ChordAttrs, Time};

/// Partition every voice of a measure.
pub fn partition_measure(measure: &mut LyMeasure) {
    let partitioner = Partitioner {
        time: measure.current_time,
        partial: measure.current_partial,
    };
    let mut voices = std::mem::take(&mut measure.voices);
    for voice in &mut voices {
        partitioner.partition_voice(voice);
    }
    measure.voices = voices;
}

struct Partitioner {
    time: Time,
    partial: Time,
}

impl Partitioner {
    fn partition_voice(&self, voice: &mut LyVoice) {
        merge_adjacent_rests(voice);
        self.partition_tuplets(voice);

        // Group boundaries, in beats relative to the nominal measure grid:
        // a partial measure is aligned so its *end* matches the grid
        let n_beats = self.time.numerator;
        let initial = (self.partial.as_rational() - self.time.as_rational()) * self.time.denominator;
        let last = self.partial.as_rational() * self.time.denominator;

        let mut ends = Vec::new();
        if matches!(odd_factor(n_beats), 1 | 3) {
            // Plain regular (4/4, 2/4) or compound (6/8, 12/8): one group.
            // No internal cuts, which also keeps syncopated runs like
            // 8th-4th-4th-4th-8th in one piece
            ends.push(last);
        } else if n_beats % 3 == 0 {
            let mut i = 3;
            while i <= n_beats {
                ends.push(initial + i);
                i += 3;
            }
        } else if n_beats % 3 == 1 {
            // A leading regular group of four, then threes (7/8 as 4+3)
            ends.push(initial + 4);
            let mut i = 7;
            while i <= n_beats {
                ends.push(initial + i);
                i += 3;
            }
        } else {
            // Threes, then a trailing regular group of two (5/8 as 3+2)
            let mut i = 3;
            while i <= n_beats - 2 {
                ends.push(initial + i);
                i += 3;
            }
            ends.push(last);
        }

        for end in ends {
            if end <= Rational32::zero() {
                continue;
            }
            self.break_at(voice, end);
        }
    }

    /// Split the chord spanning `pos` into two tied halves. Does nothing at
    /// the measure end, at existing chord starts, or before the first chord.
    fn break_at(&self, voice: &mut LyVoice, pos: Rational32) {
        if pos == self.partial.as_rational() * self.time.denominator {
            return;
        }
        let idx = voice.iter().position(|c| c.start >= pos).unwrap_or(voice.len());
        if idx < voice.len() && voice[idx].start == pos {
            return;
        }
        let Some(prev_idx) = idx.checked_sub(1) else { return };

        let mut inserted = voice[prev_idx].clone();
        inserted.start = pos;
        if let Some(chord) = &mut inserted.chord {
            chord.attributes = ChordAttrs::default();
        }
        let prev = &mut voice[prev_idx];
        if prev.tuplet.pos == TupletPos::Last {
            // The tail keeps the closing bracket marker
            prev.tuplet.pos = TupletPos::Head;
            inserted.tuplet.pos = TupletPos::Last;
        }
        if let Some(chord) = &mut prev.chord {
            chord.sustained = true;
        }
        voice.insert(idx, inserted);
    }

    // Tuplets

    fn partition_tuplets(&self, voice: &mut LyVoice) {
        // First pass: place tie cuts so each span can carry one bracket
        let mut cursor = 0;
        while let Some((begin, end)) = next_tuplet_span(voice, cursor) {
            let mut positions = self.collect_positions(voice, begin, end);
            fill_break_points(&mut positions);
            while thin_break_points_once(&mut positions) {}
            for p in &positions {
                if p.kind == PosKind::Break {
                    self.break_at(voice, p.start);
                }
            }
            cursor = end;
        }
        // Second pass: assign bracket ratios, then cut oversized durations
        // down to spellable sizes
        let mut cursor = 0;
        while let Some((begin, end)) = next_tuplet_span(voice, cursor) {
            self.assign_tuplet_ratios(voice, begin, end);
            self.split_compound_durations(voice, begin, end);
            cursor = end;
        }
    }

    /// Positions of the chords in `voice[begin..end]` plus the span's end
    /// position, all marked as chord entries.
    fn collect_positions(&self, voice: &LyVoice, begin: usize, end: usize) -> Vec<Position> {
        let mut positions: Vec<Position> = voice[begin..end]
            .iter()
            .map(|c| Position { start: c.start, kind: PosKind::Chord })
            .collect();
        let terminal = if end == voice.len() {
            Rational32::from_integer(self.partial.numerator)
        } else {
            voice[end].start
        };
        positions.push(Position { start: terminal, kind: PosKind::Chord });
        positions
    }

    fn assign_tuplet_ratios(&self, voice: &mut LyVoice, begin: usize, end: usize) {
        let period = positions_gcd(&self.collect_positions(voice, begin, end));
        let mut ratio = period.recip();
        if ratio.denom() > ratio.numer() {
            ratio = ratio * rational_bit_ceil(period);
        }
        // Normalize to an odd numerator over a power of two, e.g. 3/2, 5/4, 7/4
        ratio = ratio / Rational32::from_integer((rational_bit_ceil(ratio) / 2).max(1));

        for chord in &mut voice[begin..end] {
            chord.tuplet = TupletAttrs { ratio, pos: TupletPos::Head };
        }
        voice[end - 1].tuplet.pos = TupletPos::Last;
    }

    /// Inside one bracket, durations longer than four grid units (except
    /// six, which spells as a dotted note) or with an unspellable unit count
    /// are cut into pieces a single (possibly dotted) note can cover.
    fn split_compound_durations(&self, voice: &mut LyVoice, begin: usize, end: usize) {
        let four = Rational32::from_integer(4);
        let six = Rational32::from_integer(6);
        let factor = Rational32::from_integer(self.partial.denominator) / voice[begin].tuplet.ratio;

        let mut breaks = Vec::new();
        for i in begin..end {
            let mut pos = voice[i].start;
            let end_pos = if i + 1 == voice.len() {
                Rational32::from_integer(self.partial.numerator)
            } else {
                voice[i + 1].start
            };
            let mut diff = (end_pos - pos) / factor;
            while diff > four && diff != six {
                diff -= four;
                pos += four * factor;
                breaks.push(pos);
            }
            while *diff.numer() > 4 && *diff.numer() != 6 {
                let dur = Rational32::new(bit_floor(*diff.numer()), *diff.denom());
                diff -= dur;
                pos += dur * factor;
                breaks.push(pos);
            }
        }
        for p in breaks {
            self.break_at(voice, p);
        }
    }
}

/// Chords at power-of-two positions don't need a tuplet.
fn is_regular(chord: &LyChord) -> bool {
    (*chord.start.denom() as u32).is_power_of_two()
}

/// The next maximal run of irregularly positioned chords at or after
/// `cursor`, widened by the regular chord just before it. Returns
/// `(begin, end)` with `voice[end]` the first regular chord after the run.
fn next_tuplet_span(voice: &LyVoice, cursor: usize) -> Option<(usize, usize)> {
    let first = (cursor..voice.len()).find(|&k| !is_regular(&voice[k]))?;
    let end = ((first + 1)..voice.len())
        .find(|&k| is_regular(&voice[k]))
        .unwrap_or(voice.len());
    Some((first.saturating_sub(1), end))
}

fn merge_adjacent_rests(voice: &mut LyVoice) {
    voice.dedup_by(|cur, prev| both_rest_or_spacer(prev, cur));
}

fn both_rest_or_spacer(lhs: &LyChord, rhs: &LyChord) -> bool {
    match (&lhs.chord, &rhs.chord) {
        (None, None) => true,
        (Some(l), Some(r)) => l.notes.is_empty() && r.notes.is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PosKind {
    Chord,
    Break,
    Placeholder,
}

#[derive(Debug, Clone, Copy)]
struct Position {
    start: Rational32,
    kind: PosKind,
}

/// Gcd of adjacent position differences, taken over chord entries and the
/// two ends of the slice.
fn positions_gcd(positions: &[Position]) -> Rational32 {
    let mut res = Rational32::zero();
    let mut prev: Option<Rational32> = None;
    for (i, p) in positions.iter().enumerate() {
        let endpoint = i == 0 || i + 1 == positions.len();
        if p.kind != PosKind::Chord && !endpoint {
            continue;
        }
        if let Some(prev_start) = prev {
            let diff = p.start - prev_start;
            res = if res.is_zero() { diff } else { rational_gcd(diff, res) };
        }
        prev = Some(p.start);
    }
    res
}

/// Gcd over rationals: numerator gcd over the common (lcm) denominator.
fn rational_gcd(lhs: Rational32, rhs: Rational32) -> Rational32 {
    let den = lhs.denom().lcm(rhs.denom());
    let ln = lhs.numer() * (den / lhs.denom());
    let rn = rhs.numer() * (den / rhs.denom());
    Rational32::new(ln.gcd(&rn), den)
}

/// Insert candidate break points on a regular grid spanning the positions.
/// The grid period is the position gcd with the odd part of its denominator
/// removed, so the grid always sits on power-of-two subdivisions.
fn fill_break_points(positions: &mut Vec<Position>) {
    let period = positions_gcd(positions);
    let period = period * odd_factor(*period.denom());

    let begin = positions[0].start;
    let end = positions[positions.len() - 1].start;
    let mut p = begin + period;
    while p < end {
        positions.push(Position { start: p, kind: PosKind::Break });
        p += period;
    }
    positions.sort_by_key(|p| p.start);
}

/// One thinning round: among all pairs of regular non-placeholder positions,
/// find the sub-span whose own gcd leaves the most break points off-grid and
/// demote those to placeholders. Returns whether anything was demoted.
fn thin_break_points_once(positions: &mut [Position]) -> bool {
    let is_regular_marker =
        |p: &Position| p.kind != PosKind::Placeholder && (*p.start.denom() as u32).is_power_of_two();

    let mut best: Option<(usize, usize)> = None;
    let mut max_removed = 0usize;
    for b in 0..positions.len() {
        if !is_regular_marker(&positions[b]) {
            continue;
        }
        for e in b + 1..positions.len() {
            if !is_regular_marker(&positions[e]) {
                continue;
            }
            let mut count = 0;
            for_each_offgrid_break(&mut positions[b..=e], |_| count += 1);
            if count > max_removed {
                max_removed = count;
                best = Some((b, e));
            }
        }
    }

    let Some((b, e)) = best else { return false };
    for_each_offgrid_break(&mut positions[b..=e], |p| p.kind = PosKind::Placeholder);
    true
}

fn for_each_offgrid_break(sub: &mut [Position], mut f: impl FnMut(&mut Position)) {
    if sub.len() <= 1 {
        return;
    }
    let period = positions_gcd(sub);
    let base = sub[0].start;
    let len = sub.len();
    for p in &mut sub[1..len - 1] {
        if p.kind != PosKind::Break {
            continue;
        }
        if !((p.start - base) / period).is_integer() {
            f(p);
        }
    }
}

/// Largest power of two not exceeding `value`.
fn bit_floor(value: i32) -> i32 {
    debug_assert!(value > 0);
    1 << (31 - (value as u32).leading_zeros())
}

/// Smallest power of two at least the ceiling of `value`.
fn rational_bit_ceil(value: Rational32) -> i32 {
    let num = *value.numer();
    let den = *value.denom();
    let ceil = num / den + i32::from(num % den != 0);
    (ceil as u32).next_power_of_two() as i32
}

/// `value` with its trailing power-of-two factor removed.
fn odd_factor(value: i32) -> i32 {
    let v = value as u32;
    (v >> v.trailing_zeros()) as i32
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::convert_to_ly;
    use crate::parse::parse_music;

    fn lower(text: &str) -> crate::ir::LyMusic {
        convert_to_ly(parse_music(text).expect("parse failed"))
    }

    fn r(n: i32, d: i32) -> Rational32 {
        Rational32::new(n, d)
    }

    fn starts(voice: &LyVoice) -> Vec<Rational32> {
        voice.iter().map(|c| c.start).collect()
    }

    #[test]
    fn helpers() {
        assert_eq!(odd_factor(12), 3);
        assert_eq!(odd_factor(8), 1);
        assert_eq!(bit_floor(7), 4);
        assert_eq!(rational_bit_ceil(r(4, 3)), 2);
        assert_eq!(rational_bit_ceil(r(5, 1)), 8);
        assert_eq!(rational_gcd(r(1, 3), r(1, 6)), r(1, 6));
        assert_eq!(rational_gcd(r(2, 3), r(1, 2)), r(1, 6));
    }

    #[test]
    fn seven_eight_splits_four_plus_three() {
        let ly = lower("%7/8%C,-,-,-,-,-,-,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(starts(voice), vec![r(0, 1), r(4, 1)]);
        assert!(voice[0].chord.as_ref().unwrap().sustained, "tied across the group cut");
        assert!(!voice[1].chord.as_ref().unwrap().sustained);
    }

    #[test]
    fn five_eight_splits_three_plus_two() {
        let ly = lower("%5/8%C,-,-,-,-,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(starts(voice), vec![r(0, 1), r(3, 1)]);
    }

    #[test]
    fn compound_measures_stay_whole() {
        let ly = lower("%6/8%C,-,-,-,-,-,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(starts(voice), vec![r(0, 1)]);
    }

    #[test]
    fn syncopated_four_beat_run_is_not_cut() {
        let ly = lower("CD,-E,-F,-G,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(starts(voice), vec![r(0, 1), r(1, 2), r(3, 2), r(5, 2), r(7, 2)]);
        assert!(voice.iter().all(|c| !c.chord.as_ref().unwrap().sustained));
    }

    #[test]
    fn triplet_gets_three_over_two() {
        let ly = lower("CDE,F,G,A,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(starts(voice)[..3], [r(0, 1), r(1, 3), r(2, 3)]);
        let ratio = r(3, 2);
        assert_eq!(voice[0].tuplet, TupletAttrs { ratio, pos: TupletPos::Head });
        assert_eq!(voice[1].tuplet, TupletAttrs { ratio, pos: TupletPos::Head });
        assert_eq!(voice[2].tuplet, TupletAttrs { ratio, pos: TupletPos::Last });
        assert_eq!(voice[3].tuplet.pos, TupletPos::None);
    }

    #[test]
    fn quintuplet_gets_five_over_four() {
        let ly = lower("CDEGA,C,D,E,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(voice[0].tuplet.ratio, r(5, 4));
        assert_eq!(voice[4].tuplet.pos, TupletPos::Last);
    }

    #[test]
    fn septuplet_gets_seven_over_four() {
        let ly = lower("CDEFGAB,C,D,E,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(voice[0].tuplet.ratio, r(7, 4));
    }

    #[test]
    fn uneven_tuplet_positions_share_one_bracket() {
        // A beat with chords at 0 and 2/3 next to quarter subdivisions and a
        // second voice; contrived on purpose. Check the whole thing still
        // partitions into strictly increasing positions
        let ly = lower("(C)-(D),[(E)(F)(G)(A),;C,]C,D,E,");
        for staff in &ly {
            for measure in staff {
                for voice in &measure.voices {
                    for pair in voice.windows(2) {
                        assert!(pair[0].start < pair[1].start);
                    }
                }
            }
        }
    }

    #[test]
    fn adjacent_rests_merge() {
        let ly = lower(".,.,.,.,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(starts(voice), vec![r(0, 1)]);
        assert!(voice[0].chord.as_ref().unwrap().notes.is_empty());
    }

    #[test]
    fn rest_and_note_do_not_merge() {
        let ly = lower(".,C,.,.,");
        let voice = &ly[0][0].voices[0];
        assert_eq!(starts(voice), vec![r(0, 1), r(1, 1), r(2, 1)]);
    }

    #[test]
    fn partial_measure_aligns_group_ends() {
        // A one-beat pickup under 4/4: single group ending at the measure end
        let ly = lower("%1//4%C,D,E,F,G,");
        let staff = &ly[0];
        assert_eq!(staff.len(), 2);
        assert_eq!(starts(&staff[0].voices[0]), vec![r(0, 1)]);
        assert_eq!(starts(&staff[1].voices[0]), vec![r(0, 1), r(1, 1), r(2, 1), r(3, 1)]);
    }

    #[test]
    fn long_tuplet_note_is_cut_to_spellable_pieces() {
        // One beat subdivided in thirteen, the last chord held over most of
        // it: durations inside the bracket must stay spellable
        let ly = lower("(C)--(D)(E)--------,C,D,E,");
        let voice = &ly[0][0].voices[0];
        for pair in voice.windows(2) {
            assert!(pair[0].start < pair[1].start);
        }
        // Every in-bracket duration has a spellable unit count
        let factor = Rational32::from_integer(4) / voice[0].tuplet.ratio;
        for pair in voice.windows(2) {
            if pair[0].tuplet.pos == TupletPos::None {
                continue;
            }
            let diff = (pair[1].start - pair[0].start) / factor;
            assert!(diff <= Rational32::from_integer(4) || diff == Rational32::from_integer(6));
            assert!(matches!(*diff.numer(), 1 | 2 | 3 | 4 | 6), "unit count {diff}");
        }
    }
}
