//! Measurization: grouping the beat stream into measures
//!
//! Walks every section's beats left to right under the running time
//! signature, collecting measure attributes announced on any staff and
//! checking that the staves agree. Staves of different lengths are padded
//! with rests so each section comes out rectangular.

use crate::error::{NotationError, Result};
use crate::models::{Chord, Measure, MeasureAttrs, Music, Section, Time};
use crate::parse::grammar::{UnmeasuredMusic, UnmeasuredSection};

pub struct Measurizer {
    input: UnmeasuredMusic,
    time: Time,
    n_measures: usize,
}

impl Measurizer {
    pub fn new(input: UnmeasuredMusic) -> Self {
        Measurizer { input, time: Time::new(4, 4), n_measures: 0 }
    }

    pub fn process(mut self) -> Result<Music> {
        let mut music = Music::new();
        let input = std::mem::take(&mut self.input);
        let n_sections = input.len();
        for (idx, section) in input.into_iter().enumerate() {
            let is_last = idx + 1 == n_sections;
            music.push(self.convert_section(section, is_last)?);
        }
        Ok(music)
    }

    fn convert_section(&mut self, mut input: UnmeasuredSection, is_last: bool) -> Result<Section> {
        let mut res = Section::default();
        let mut partial = self.time;
        let mut beat_of_measure = 0usize;

        let n_beats = input.iter().map(Vec::len).max().unwrap_or(0);
        res.staves = vec![vec![Vec::new(); n_beats]; input.len()];

        // Sweep beat-by-beat across all staves at once, so simultaneous
        // attribute announcements can be reconciled
        for i in 0..n_beats {
            let mut attrs = MeasureAttrs::default();
            for (j, in_staff) in input.iter_mut().enumerate() {
                if i >= in_staff.len() {
                    // This staff ends early; pad with a rest
                    res.staves[j][i] = vec![vec![Chord::default()]];
                    continue;
                }
                let in_beat = &mut in_staff[i];
                if beat_of_measure != 0 && !in_beat.attrs.is_null() {
                    let pos = format!(
                        "on beat {}, measure {} with {}/{} time",
                        beat_of_measure + 1,
                        self.n_measures,
                        partial.numerator,
                        partial.denominator
                    );
                    let message = if in_beat.attrs.time.is_some() || in_beat.attrs.partial.is_some() {
                        format!(
                            "Time signatures should only appear at the beginning of measures, \
                             but got a time signature {pos}"
                        )
                    } else {
                        format!(
                            "Key signatures should only appear at the beginning of measures, \
                             but got a key signature {pos}"
                        )
                    };
                    return Err(NotationError::AttributeMisplaced(message));
                }
                merge_checked(&mut attrs, &in_beat.attrs, i, self.n_measures)?;
                res.staves[j][i] = std::mem::take(&mut in_beat.beat);
            }

            if beat_of_measure == 0 {
                res.measures.push(Measure { start_beat: i, attributes: attrs });
                if let Some(time) = attrs.time {
                    self.time = time;
                }
                if let Some(p) = attrs.partial {
                    // Partial measures don't count toward the measure number
                    partial = p;
                } else {
                    partial = self.time;
                    self.n_measures += 1;
                }
            }
            beat_of_measure += 1;
            if beat_of_measure == partial.numerator as usize {
                beat_of_measure = 0;
            }
        }

        if beat_of_measure != 0 {
            if !is_last {
                return Err(NotationError::IncompleteMeasure(format!(
                    "The section ends on an incomplete measure, beat {} of measure {} with {}/{} time",
                    beat_of_measure, self.n_measures, partial.numerator, partial.denominator
                )));
            }
            // The piece may trail off mid-measure; fill the remainder with
            // rest beats so the measure spans its announced length
            for _ in beat_of_measure..partial.numerator as usize {
                for staff in &mut res.staves {
                    staff.push(vec![vec![Chord::default()]]);
                }
            }
        }

        Ok(res)
    }
}

/// Field-wise merge of simultaneous announcements, rejecting staves that
/// disagree on the same field.
fn merge_checked(into: &mut MeasureAttrs, from: &MeasureAttrs, beat: usize, measure: usize) -> Result<()> {
    fn check<T: PartialEq + Copy + std::fmt::Debug>(
        into: &mut Option<T>,
        from: Option<T>,
        what: &str,
        beat: usize,
        measure: usize,
    ) -> Result<()> {
        let Some(value) = from else { return Ok(()) };
        if let Some(existing) = *into {
            if existing != value {
                return Err(NotationError::InconsistentAttrsAcrossStaves(format!(
                    "Staves announce conflicting {what} values ({existing:?} vs {value:?}) \
                     on beat {beat} of measure {measure}",
                )));
            }
        }
        *into = Some(value);
        Ok(())
    }
    check(&mut into.key, from.key, "key signature", beat, measure)?;
    check(&mut into.time, from.time, "time signature", beat, measure)?;
    check(&mut into.partial, from.partial, "partial measure length", beat, measure)
}
