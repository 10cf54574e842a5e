//! Staff unrolling and sustain resolution
//!
//! Flattens the section/measure structure into one run of measures per staff
//! index. Voices are positioned chord by chord: the k-th of n chords in a
//! beat starts at `beat + k/n`. Sustain markers are resolved here:
//!
//! - against an earlier chord in the same measure, the sustain is dropped
//!   (the earlier chord's duration simply extends);
//! - against the final chord of the previous measure, the notes are copied
//!   over and the predecessor is marked as tying into this one;
//! - with nothing to sustain, the marker degrades to a rest.

use num_rational::Rational32;

use crate::ir::{LyChord, LyMeasure, LyMusic, LyStaff};
use crate::models::{Beat, Music, Time};

/// Unroll every staff index of the piece. The staff count is the maximum
/// over all sections; sections without a given staff contribute empty
/// measures.
pub fn unroll(mut music: Music) -> LyMusic {
    let n_staves = music.iter().map(|sec| sec.staves.len()).max().unwrap_or(0);
    let mut res = LyMusic::with_capacity(n_staves);
    for idx in 0..n_staves {
        res.push(unroll_staff(&mut music, idx));
    }
    res
}

fn unroll_staff(music: &mut Music, idx: usize) -> LyStaff {
    let mut res = LyStaff::new();
    let mut time = Time::new(4, 4);
    for sec in music.iter_mut() {
        for j in 0..sec.measures.len() {
            let attrs = sec.measures[j].attributes;
            if let Some(t) = attrs.time {
                time = t;
            }
            let partial = attrs.partial.unwrap_or(time);

            res.push(LyMeasure {
                current_time: time,
                current_partial: partial,
                attributes: attrs,
                voices: Vec::new(),
            });
            if sec.staves.len() <= idx {
                // Section without this staff: an empty measure
                continue;
            }

            let (begin, end) = sec.beat_index_range_of_measure(j);
            let in_beats = &mut sec.staves[idx][begin..end];
            let split_idx = res.len() - 1;
            let (earlier, current) = res.split_at_mut(split_idx);
            unroll_voices(&mut current[0], in_beats, earlier.last_mut());
        }
    }
    res
}

fn unroll_voices(measure: &mut LyMeasure, in_beats: &mut [Beat], mut last_measure: Option<&mut LyMeasure>) {
    let n_voices = in_beats.iter().map(Vec::len).max().unwrap_or(0);
    measure.voices.resize_with(n_voices, Vec::new);
    for (i, in_beat) in in_beats.iter_mut().enumerate() {
        let voices_in_beat = in_beat.len();
        for (j, in_voice) in in_beat.iter_mut().enumerate() {
            let subdivision = in_voice.len() as i32;
            for (k, in_chord) in in_voice.drain(..).enumerate() {
                let mut in_chord = in_chord;
                let start = Rational32::from_integer(i as i32) + Rational32::new(k as i32, subdivision);
                if in_chord.sustained {
                    let voice = &measure.voices[j];
                    if let Some(last) = voice.last() {
                        if last.chord.is_some() {
                            // Sustain the last chord by dropping this marker;
                            // its duration stretches over the gap
                            continue;
                        }
                    } else if let Some(last_measure) = last_measure.as_deref_mut() {
                        // Sustain the final chord of the previous measure, if
                        // that chord is not a rest or a spacer
                        if let Some(prev) = last_measure.voices.get_mut(j).and_then(|v| v.last_mut()) {
                            if let Some(prev_chord) = &mut prev.chord {
                                if !prev_chord.notes.is_empty() {
                                    in_chord.notes = prev_chord.notes.clone();
                                    prev_chord.sustained = true;
                                }
                            }
                        }
                    }
                    // The marker becomes a plain chord: either it inherited
                    // notes above, or it stays note-less and renders a rest
                    in_chord.sustained = false;
                }
                measure.voices[j].push(LyChord {
                    start,
                    chord: Some(in_chord),
                    ..LyChord::default()
                });
            }
        }
        // Voices this beat doesn't mention get a spacer
        for j in voices_in_beat..n_voices {
            measure.voices[j].push(LyChord {
                start: Rational32::from_integer(i as i32),
                ..LyChord::default()
            });
        }
    }
}
