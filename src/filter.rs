//! Filter pipeline (C3): each mapping owns an ordered list of `Filter`s.
//! A message is threaded through the list; each filter returns one of four
//! outcomes (pass unchanged, fan out to several, drop, or consume outright)
//! and the pipeline's "frontier" — the set of messages still in flight —
//! is updated accordingly before moving to the next filter.

pub mod adjuster;
pub mod chord;

use crate::message::{Message, MessageType, Payload};
use adjuster::{AdjusterRule, TriggerValue};
use chord::ChordTemplate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a single filter does with one message.
pub enum FilterResult {
    /// Replace the message with exactly one (possibly unchanged).
    Single(Message),
    /// Replace the message with several (chord fan-out).
    Fanout(Vec<Message>),
    /// Remove the message from the frontier; nothing downstream sees it.
    Drop,
    /// An adjuster matched: the message is swallowed and never reaches the
    /// rest of the pipeline or the outputs.
    Consumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityMode {
    Clip,
    Drop,
    Scaled,
}

/// An optional CC-bound toggle that flips a filter's `paused` flag. Not
/// part of the documented JSON schema; a filter's config may opt in with
/// a `toggle: { controller: N }` key, so by default it's inert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleConfig {
    pub controller: u8,
}

pub struct ChannelFilter {
    pub whitelist: Vec<u8>,
    pub blacklist: Vec<u8>,
    pub remap: HashMap<u8, u8>,
    pub paused: bool,
    pub toggle: Option<ToggleConfig>,
}

pub struct MessageTypeFilter {
    pub whitelist: Vec<MessageType>,
    pub blacklist: Vec<MessageType>,
    pub paused: bool,
    pub toggle: Option<ToggleConfig>,
}

pub struct VelocityFilter {
    pub min: u8,
    pub max: u8,
    pub mode: VelocityMode,
    pub paused: bool,
    pub toggle: Option<ToggleConfig>,
}

pub struct TransposeFilter {
    pub step: i8,
    pub paused: bool,
    pub toggle: Option<ToggleConfig>,
}

pub struct ChordFilter {
    pub chord: ChordTemplate,
    pub paused: bool,
    pub toggle: Option<ToggleConfig>,
}

pub enum Filter {
    Channel(ChannelFilter),
    MessageType(MessageTypeFilter),
    Velocity(VelocityFilter),
    Transpose(TransposeFilter),
    Chord(ChordFilter),
}

impl Filter {
    fn toggle(&self) -> &Option<ToggleConfig> {
        match self {
            Filter::Channel(f) => &f.toggle,
            Filter::MessageType(f) => &f.toggle,
            Filter::Velocity(f) => &f.toggle,
            Filter::Transpose(f) => &f.toggle,
            Filter::Chord(f) => &f.toggle,
        }
    }

    fn paused(&self) -> bool {
        match self {
            Filter::Channel(f) => f.paused,
            Filter::MessageType(f) => f.paused,
            Filter::Velocity(f) => f.paused,
            Filter::Transpose(f) => f.paused,
            Filter::Chord(f) => f.paused,
        }
    }

    fn set_paused(&mut self, value: bool) {
        match self {
            Filter::Channel(f) => f.paused = value,
            Filter::MessageType(f) => f.paused = value,
            Filter::Velocity(f) => f.paused = value,
            Filter::Transpose(f) => f.paused = value,
            Filter::Chord(f) => f.paused = value,
        }
    }

    /// Every filter carries an implicit toggle adjuster: a CC matching the
    /// configured controller number (any channel, value >= 64 counts as
    /// "on") flips `paused` and consumes the message outright so it never
    /// reaches the rest of the pipeline.
    fn check_toggle(&mut self, msg: &Message) -> bool {
        let controller = match self.toggle() {
            Some(cfg) => cfg.controller,
            None => return false,
        };
        let rule = AdjusterRule::new(
            "toggle",
            MessageType::ControlChange,
            vec![("controller", TriggerValue::Equals(controller as i64))],
            "value",
            false,
        );
        match rule.fire(msg) {
            Some(value) => {
                if value >= 64 {
                    let was_paused = self.paused();
                    self.set_paused(!was_paused);
                }
                true
            }
            None => false,
        }
    }

    pub fn apply(&mut self, msg: &Message) -> FilterResult {
        if self.check_toggle(msg) {
            return FilterResult::Consumed;
        }
        if self.paused() {
            return FilterResult::Single(msg.clone());
        }
        self.process(msg)
    }

    fn process(&mut self, msg: &Message) -> FilterResult {
        match self {
            Filter::Channel(f) => process_channel(f, msg),
            Filter::MessageType(f) => process_message_type(f, msg),
            Filter::Velocity(f) => process_velocity(f, msg),
            Filter::Transpose(f) => process_transpose(f, msg),
            Filter::Chord(f) => process_chord(f, msg),
        }
    }
}

fn process_channel(f: &ChannelFilter, msg: &Message) -> FilterResult {
    let Some(channel) = msg.channel() else {
        return FilterResult::Single(msg.clone());
    };
    if !f.whitelist.is_empty() && !f.whitelist.contains(&channel) {
        return FilterResult::Drop;
    }
    if f.blacklist.contains(&channel) {
        return FilterResult::Drop;
    }
    match f.remap.get(&channel) {
        Some(&to) => FilterResult::Single(msg.with_channel(to)),
        None => FilterResult::Single(msg.clone()),
    }
}

fn process_message_type(f: &MessageTypeFilter, msg: &Message) -> FilterResult {
    let kind = msg.kind();
    if !f.whitelist.is_empty() && !f.whitelist.contains(&kind) {
        return FilterResult::Drop;
    }
    if f.blacklist.contains(&kind) {
        return FilterResult::Drop;
    }
    FilterResult::Single(msg.clone())
}

fn process_velocity(f: &VelocityFilter, msg: &Message) -> FilterResult {
    let velocity = match msg.payload() {
        Payload::NoteOn { velocity, .. } | Payload::NoteOff { velocity, .. } => *velocity,
        _ => return FilterResult::Single(msg.clone()),
    };
    match f.mode {
        VelocityMode::Clip if velocity >= f.min && velocity <= f.max => FilterResult::Single(msg.clone()),
        VelocityMode::Drop if velocity >= f.min && velocity <= f.max => FilterResult::Single(msg.clone()),
        VelocityMode::Clip => {
            let clamped = velocity.clamp(f.min, f.max);
            FilterResult::Single(msg.with_velocity(clamped))
        }
        VelocityMode::Drop => FilterResult::Drop,
        VelocityMode::Scaled => {
            // Integer floor division, not `f64::round`: at the top of the
            // range (e.g. min=0 max=63, v=127) round-half-up would produce
            // 64, one past `max` and in violation of `min <= out <= max`.
            let span = f.max as u32 - f.min as u32 + 1;
            let scaled = (velocity as u32 * span / 128 + f.min as u32).clamp(0, 127) as u8;
            FilterResult::Single(msg.with_velocity(scaled))
        }
    }
}

fn process_transpose(f: &TransposeFilter, msg: &Message) -> FilterResult {
    let note = match msg.payload() {
        Payload::NoteOn { note, .. } | Payload::NoteOff { note, .. } | Payload::PolyAftertouch { note, .. } => *note,
        _ => return FilterResult::Single(msg.clone()),
    };
    // `step` is in octaves, not semitones: +/-10 spans +/-120 semitones.
    let shifted = (note as i16 + f.step as i16 * 12).clamp(0, 127) as u8;
    FilterResult::Single(msg.with_note(shifted))
}

fn process_chord(f: &ChordFilter, msg: &Message) -> FilterResult {
    let note = match msg.payload() {
        Payload::NoteOn { note, .. } | Payload::NoteOff { note, .. } => *note,
        _ => return FilterResult::Single(msg.clone()),
    };
    let offsets = f.chord.offsets();
    if offsets.is_empty() {
        return FilterResult::Single(msg.clone());
    }
    let voiced: Vec<Message> = offsets
        .iter()
        .filter_map(|offset| {
            let shifted = note as i16 + *offset as i16;
            if (0..=127).contains(&shifted) {
                Some(msg.with_note(shifted as u8))
            } else {
                None
            }
        })
        .collect();
    if voiced.is_empty() {
        FilterResult::Drop
    } else {
        FilterResult::Fanout(voiced)
    }
}

/// Threads `msg` through the whole pipeline, applying the frontier/
/// fan-out/drop/consumed algebra: each filter runs on every message
/// currently in the frontier, and a `Consumed` from any filter on any
/// in-flight message short-circuits the whole pipeline (the adjuster that
/// consumed it has already done its job).
pub fn run_pipeline(filters: &mut [Filter], msg: Message) -> Vec<Message> {
    let mut frontier = vec![msg];
    for filter in filters.iter_mut() {
        let mut next = Vec::with_capacity(frontier.len());
        for m in frontier {
            match filter.apply(&m) {
                FilterResult::Single(out) => next.push(out),
                FilterResult::Fanout(outs) => next.extend(outs),
                FilterResult::Drop => {}
                FilterResult::Consumed => return Vec::new(),
            }
        }
        if next.is_empty() {
            return Vec::new();
        }
        frontier = next;
    }
    frontier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageFields;

    fn note_on(note: u8, velocity: u8) -> Message {
        Message::from_properties(
            MessageType::NoteOn,
            Some(0),
            MessageFields {
                note: Some(note),
                velocity: Some(velocity),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn transpose_clamps_without_overflow() {
        let mut filters = vec![Filter::Transpose(TransposeFilter {
            step: 10,
            paused: false,
            toggle: None,
        })];
        let out = run_pipeline(&mut filters, note_on(120, 100));
        assert_eq!(out.len(), 1);
        match out[0].payload() {
            Payload::NoteOn { note, .. } => assert_eq!(*note, 127),
            _ => panic!("expected NoteOn"),
        }
    }

    #[test]
    fn transpose_matches_worked_example() {
        // step=-2 (octaves) on note=23: 23 - 24 = -1, clamped to 0.
        let mut filters = vec![Filter::Transpose(TransposeFilter {
            step: -2,
            paused: false,
            toggle: None,
        })];
        let out = run_pipeline(&mut filters, note_on(23, 100));
        match out[0].payload() {
            Payload::NoteOn { note, .. } => assert_eq!(*note, 0),
            _ => panic!("expected NoteOn"),
        }
    }

    #[test]
    fn chord_drops_out_of_range_voices_without_clamping() {
        let mut filters = vec![Filter::Chord(ChordFilter {
            chord: ChordTemplate::Major7th,
            paused: false,
            toggle: None,
        })];
        // note 120 + 11 (major7th top voice) = 131, out of range and must
        // be silently dropped, not clamped to 127.
        let out = run_pipeline(&mut filters, note_on(120, 100));
        let notes: Vec<u8> = out
            .iter()
            .map(|m| match m.payload() {
                Payload::NoteOn { note, .. } => *note,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(notes, vec![120, 124, 127]);
    }

    #[test]
    fn chord_major3_matches_worked_example() {
        let mut filters = vec![Filter::Chord(ChordFilter {
            chord: ChordTemplate::Major3,
            paused: false,
            toggle: None,
        })];
        let out = run_pipeline(&mut filters, note_on(60, 100));
        assert_eq!(out.len(), 3);
        let voiced: Vec<(u8, u8, Option<u8>)> = out
            .iter()
            .map(|m| match m.payload() {
                Payload::NoteOn { note, velocity } => (*note, *velocity, m.channel()),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(voiced, vec![(60, 100, Some(0)), (64, 100, Some(0)), (67, 100, Some(0))]);
    }

    #[test]
    fn velocity_scaled_mode_is_monotonic() {
        let mut f = VelocityFilter {
            min: 20,
            max: 100,
            mode: VelocityMode::Scaled,
            paused: false,
            toggle: None,
        };
        let low = match process_velocity(&f, &note_on(60, 10)) {
            FilterResult::Single(m) => match m.payload() {
                Payload::NoteOn { velocity, .. } => *velocity,
                _ => unreachable!(),
            },
            _ => panic!(),
        };
        f.min = 20;
        let high = match process_velocity(&f, &note_on(60, 127)) {
            FilterResult::Single(m) => match m.payload() {
                Payload::NoteOn { velocity, .. } => *velocity,
                _ => unreachable!(),
            },
            _ => panic!(),
        };
        assert!(high >= low);
    }

    #[test]
    fn velocity_scaled_matches_worked_example() {
        let f = VelocityFilter {
            min: 0,
            max: 63,
            mode: VelocityMode::Scaled,
            paused: false,
            toggle: None,
        };
        let velocity_out = |v: u8| match process_velocity(&f, &note_on(60, v)) {
            FilterResult::Single(m) => match m.payload() {
                Payload::NoteOn { velocity, .. } => *velocity,
                _ => unreachable!(),
            },
            _ => panic!(),
        };
        assert_eq!(velocity_out(127), 63);
        assert_eq!(velocity_out(0), 0);
        assert_eq!(velocity_out(64), 32);
    }

    #[test]
    fn channel_whitelist_drops_unlisted_channels() {
        let mut filters = vec![Filter::Channel(ChannelFilter {
            whitelist: vec![2],
            blacklist: vec![],
            remap: HashMap::new(),
            paused: false,
            toggle: None,
        })];
        let out = run_pipeline(&mut filters, note_on(60, 100));
        assert!(out.is_empty());
    }

    #[test]
    fn paused_filter_passes_through_unchanged() {
        let mut filters = vec![Filter::Transpose(TransposeFilter {
            step: 5,
            paused: true,
            toggle: None,
        })];
        let out = run_pipeline(&mut filters, note_on(60, 100));
        assert_eq!(out.len(), 1);
        match out[0].payload() {
            Payload::NoteOn { note, .. } => assert_eq!(*note, 60),
            _ => panic!(),
        }
    }
}
