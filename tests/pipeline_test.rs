// End-to-end tests: notation text in, LilyPond source out

use lilt::{export_to_lilypond, parse_music};

/// Convert notation text and collapse all whitespace runs, so assertions
/// are indifferent to indentation and line breaks.
fn convert(text: &str) -> String {
    let music = parse_music(text).expect("parsing failed");
    let mut out = Vec::new();
    export_to_lilypond(&mut out, music).expect("engraving failed");
    let rendered = String::from_utf8(out).expect("emitter produced invalid UTF-8");
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[test]
fn empty_input_emits_preamble_and_empty_score() {
    let out = convert("");
    assert!(out.contains("\\version \"2.22.1\""), "{out}");
    assert!(out.contains("\\language \"english\""), "{out}");
    assert!(out.contains("\\new PianoStaff"), "{out}");
    assert!(out.contains("\\score"), "{out}");
    assert!(!out.contains("\\new Staff"), "{out}");
}

#[test]
fn single_beat_fills_the_measure_with_rests() {
    let out = convert("C,");
    assert!(out.contains("\\time 4/4"), "{out}");
    assert!(out.contains("\\singleVoice \\clef treble c' 4 r2."), "{out}");
}

#[test]
fn held_note_with_tempo_collapses_to_a_whole_note() {
    let out = convert("%120%\nC,-,-,-,");
    assert!(out.contains("\\tempo 4=120 c' 1"), "{out}");
    assert!(!out.contains('~'), "{out}");
}

#[test]
fn macro_expansion_yields_two_triplets() {
    let out = convert("!a: CDE,!\n*a**a*");
    let triplet = "\\tuplet 3/2 { c' 8 d' 8 e' 8 }";
    assert_eq!(out.matches(triplet).count(), 2, "{out}");
    assert!(out.contains("r2"), "{out}");
}

#[test]
fn three_four_measure_of_quarters() {
    let out = convert("%3/4%\nC,E,G,");
    assert!(out.contains("\\time 3/4"), "{out}");
    assert!(out.contains("c' 4 e' 4 g' 4"), "{out}");
    assert!(!out.contains('~'), "{out}");
    assert!(!out.contains("\\tuplet"), "{out}");
}

#[test]
fn seven_eight_spells_eighths_without_ties() {
    let out = convert("%7/8%\nC,D,E,F,G,A,B,");
    assert!(out.contains("\\time 7/8"), "{out}");
    assert!(out.contains("c' 8 d' 8 e' 8 f' 8 g' 8 a' 8 b' 8"), "{out}");
    assert!(!out.contains('~'), "{out}");
}

#[test]
fn seven_eight_held_note_ties_at_the_group_boundary() {
    let out = convert("%7/8%C,-,-,-,-,-,-,");
    assert!(out.contains("c' 2 ~ c' 4."), "{out}");
}

#[test]
fn sustain_across_the_barline_ties() {
    let out = convert("C,D,E,F,-,G,A,B,");
    assert!(out.contains("f' 4 ~"), "{out}");
    assert_eq!(out.matches("f' 4").count(), 2, "{out}");
}

#[test]
fn syncopated_four_beat_shape_is_kept_whole() {
    let out = convert("CD,-E,-F,-G,");
    assert!(out.contains("c' 8 d' 4 e' 4 f' 4 g' 8"), "{out}");
    assert!(!out.contains('~'), "{out}");
}

#[test]
fn key_signatures_use_the_name_table() {
    assert!(convert("%3s%C,D,E,F,").contains("\\key a \\major"));
    assert!(convert("%2f%C,D,E,F,").contains("\\key bf \\major"));
    assert!(convert("%0s%C,D,E,F,").contains("\\key c \\major"));
}

#[test]
fn partial_measures_emit_partial() {
    let out = convert("%1//4%C,%4/4%D,E,F,G,");
    assert!(out.contains("\\partial 4*1"), "{out}");
    assert!(out.contains("\\clef treble c' 4"), "{out}");
}

#[test]
fn all_rest_measures_use_multi_measure_rests() {
    let out = convert(".,.,.,.,");
    assert!(out.contains("R4*4"), "{out}");
}

#[test]
fn multi_voice_measures_use_voice_separators() {
    let out = convert("[C,;E,]D,F,G,");
    assert!(out.contains("<< {"), "{out}");
    assert!(out.contains("\\\\"), "{out}");
    assert!(out.contains("e' 4 s2."), "{out}");
    assert!(!out.contains("\\singleVoice"), "{out}");
}

#[test]
fn voice_counts_are_padded_across_measures() {
    let out = convert("[C,;E,]D,F,G,C,D,E,F,");
    assert!(out.contains("} \\\\>>"), "{out}");
}

#[test]
fn multiple_staves_emit_multiple_staff_blocks() {
    let out = convert("C,D,E,F,;C2,D2,E2,F2,");
    assert_eq!(out.matches("\\new Staff").count(), 2, "{out}");
    assert!(out.contains("\\numericTimeSignature"), "{out}");
}

#[test]
fn clefs_and_ottava_marks() {
    let out = convert("C2,D2,E2,F2,");
    assert!(out.contains("\\clef bass"), "{out}");
    assert!(out.contains("c, 4 d, 4 e, 4 f, 4"), "{out}");

    let out = convert("C7,D7,E7,F7,");
    assert!(out.contains("\\clef treble \\ottava #1"), "{out}");

    let out = convert("C1,D1,E1,F1,");
    assert!(out.contains("\\clef bass \\ottava #-1"), "{out}");
}

#[test]
fn chords_and_accidentals_spell_out() {
    let out = convert("(CEG),C#,Db,");
    assert!(out.contains("< c' e' g' > 4"), "{out}");
    assert!(out.contains("cs' 4"), "{out}");
    assert!(out.contains("df' 4"), "{out}");
}

#[test]
fn quintuplet_marks_non_power_of_two_denominator() {
    let out = convert("CDEGA,C,D,E,");
    assert!(out.contains("\\tuplet 5/4 {"), "{out}");
}

#[test]
fn transposed_input_engraves_transposed() {
    let out = convert("%+M2%C,D,E,F,");
    assert!(out.contains("d' 4 e' 4 fs' 4 g' 4"), "{out}");
}

#[test]
fn sections_concatenate_measures() {
    let out = convert("{C,D,E,F,}{%3/4%G,A,B,}");
    assert!(out.contains("\\time 3/4"), "{out}");
    assert!(out.contains("c' 4 d' 4 e' 4 f' 4"), "{out}");
    assert!(out.contains("g' 4 a' 4 b' 4"), "{out}");
}

#[test]
fn diagnostics_name_the_position() {
    let err = parse_music("C,\nH,").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("line 2, column 1"), "{message}");

    let err = parse_music("!a: X,!\n*a*").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("in macro 'a'"), "{message}");
}

#[test]
fn error_reports_no_partial_output() {
    assert!(parse_music("C,D,{").is_err());
    assert!(parse_music("*undefined*").is_err());
}
