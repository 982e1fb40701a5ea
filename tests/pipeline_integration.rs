//! Exercises a multi-filter pipeline end to end through the public API,
//! the way a mapping with several configured filters behaves in sequence.

use midi_router_core::filter::chord::ChordTemplate;
use midi_router_core::filter::{run_pipeline, ChordFilter, Filter, TransposeFilter, VelocityFilter, VelocityMode};
use midi_router_core::message::{Message, MessageFields, MessageType, Payload};

fn note_on(channel: u8, note: u8, velocity: u8) -> Message {
    Message::from_properties(
        MessageType::NoteOn,
        Some(channel),
        MessageFields {
            note: Some(note),
            velocity: Some(velocity),
            ..Default::default()
        },
    )
    .unwrap()
}

#[test]
fn transpose_then_chord_fans_out_every_voice_shifted() {
    let mut filters = vec![
        Filter::Transpose(TransposeFilter {
            step: 1,
            paused: false,
            toggle: None,
        }),
        Filter::Chord(ChordFilter {
            chord: ChordTemplate::Minor3,
            paused: false,
            toggle: None,
        }),
    ];
    // note 48 transposed up one octave to 60, then fanned into a minor
    // triad: 60, 63, 67.
    let out = run_pipeline(&mut filters, note_on(0, 48, 90));
    let notes: Vec<u8> = out
        .iter()
        .map(|m| match m.payload() {
            Payload::NoteOn { note, .. } => *note,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(notes, vec![60, 63, 67]);
    for m in &out {
        match m.payload() {
            Payload::NoteOn { velocity, .. } => assert_eq!(*velocity, 90),
            _ => unreachable!(),
        }
    }
}

#[test]
fn velocity_drop_mode_removes_out_of_range_notes_while_others_pass() {
    let mut filters = vec![Filter::Velocity(VelocityFilter {
        min: 40,
        max: 100,
        mode: VelocityMode::Drop,
        paused: false,
        toggle: None,
    })];
    assert!(run_pipeline(&mut filters, note_on(0, 60, 10)).is_empty());
    let out = run_pipeline(&mut filters, note_on(0, 60, 70));
    assert_eq!(out.len(), 1);
}

#[test]
fn chord_fan_out_messages_are_independent_copies() {
    let mut filters = vec![Filter::Chord(ChordFilter {
        chord: ChordTemplate::Major3,
        paused: false,
        toggle: None,
    })];
    let out = run_pipeline(&mut filters, note_on(0, 60, 100));
    let mutated = out[0].with_note(0);
    match out[1].payload() {
        Payload::NoteOn { note, .. } => assert_eq!(*note, 64),
        _ => unreachable!(),
    }
    match mutated.payload() {
        Payload::NoteOn { note, .. } => assert_eq!(*note, 0),
        _ => unreachable!(),
    }
}
