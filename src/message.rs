//! Wire-level MIDI message model: parsing, construction, and serialization.
//!
//! A [`Message`] pairs a [`MessageType`] with the type-specific payload
//! fields spec'd for that type. Construction always goes through
//! [`Message::from_bytes`] or [`Message::from_properties`] so the cached
//! byte form (`bytes()`) never drifts from the logical fields.

pub mod constants;

use crate::error::RouterError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of message kinds this router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    NoteOn,
    NoteOff,
    PolyAftertouch,
    ControlChange,
    ProgramChange,
    ChannelAftertouch,
    PitchBend,
    SysEx,
    Clock,
    Start,
    Stop,
    Continue,
    SongPosition,
    Undefined,
}

impl MessageType {
    /// Maps a status byte's high nibble (or a full system byte) to its type.
    pub fn from_status(status: u8) -> Self {
        match status {
            constants::CLOCK => MessageType::Clock,
            constants::START => MessageType::Start,
            constants::STOP => MessageType::Stop,
            constants::CONTINUE => MessageType::Continue,
            constants::SONG_POSITION => MessageType::SongPosition,
            constants::SYSEX_START => MessageType::SysEx,
            _ => match status & 0xF0 {
                constants::NOTE_ON => MessageType::NoteOn,
                constants::NOTE_OFF => MessageType::NoteOff,
                constants::POLY_AFTERTOUCH => MessageType::PolyAftertouch,
                constants::CONTROL_CHANGE => MessageType::ControlChange,
                constants::PROGRAM_CHANGE => MessageType::ProgramChange,
                constants::CHANNEL_AFTERTOUCH => MessageType::ChannelAftertouch,
                constants::PITCH_BEND => MessageType::PitchBend,
                _ => MessageType::Undefined,
            },
        }
    }

    pub fn type_string(&self) -> &'static str {
        match self {
            MessageType::NoteOn => "note_on",
            MessageType::NoteOff => "note_off",
            MessageType::PolyAftertouch => "poly_aftertouch",
            MessageType::ControlChange => "control_change",
            MessageType::ProgramChange => "program_change",
            MessageType::ChannelAftertouch => "channel_aftertouch",
            MessageType::PitchBend => "pitch_bend",
            MessageType::SysEx => "sysex",
            MessageType::Clock => "clock",
            MessageType::Start => "start",
            MessageType::Stop => "stop",
            MessageType::Continue => "continue",
            MessageType::SongPosition => "song_position",
            MessageType::Undefined => "undefined",
        }
    }

    pub fn from_type_string(s: &str) -> Option<Self> {
        Some(match s {
            "note_on" => MessageType::NoteOn,
            "note_off" => MessageType::NoteOff,
            "poly_aftertouch" => MessageType::PolyAftertouch,
            "control_change" => MessageType::ControlChange,
            "program_change" => MessageType::ProgramChange,
            "channel_aftertouch" => MessageType::ChannelAftertouch,
            "pitch_bend" => MessageType::PitchBend,
            "sysex" => MessageType::SysEx,
            "clock" => MessageType::Clock,
            "start" => MessageType::Start,
            "stop" => MessageType::Stop,
            "continue" => MessageType::Continue,
            "song_position" => MessageType::SongPosition,
            _ => return None,
        })
    }

    /// Whether the string names a type this router can filter/route on.
    pub fn is_type_valid(s: &str) -> bool {
        Self::from_type_string(s).is_some()
    }

    /// System-common/realtime types carry no channel nibble.
    pub fn is_channel_scoped(&self) -> bool {
        !matches!(
            self,
            MessageType::SysEx
                | MessageType::Clock
                | MessageType::Start
                | MessageType::Stop
                | MessageType::Continue
                | MessageType::SongPosition
                | MessageType::Undefined
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_string())
    }
}

/// Type-specific payload. `channel` lives on [`Message`] itself since every
/// channel-scoped variant carries it identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    PolyAftertouch { note: u8, value: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelAftertouch { value: u8 },
    PitchBend { value: u16 },
    SysEx { data: Vec<u8> },
    Clock,
    Start,
    Stop,
    Continue,
    SongPosition { beats: u16 },
    Undefined { status: u8, data: Vec<u8> },
}

/// A set of optional fields used to build a [`Message`] for a given
/// [`MessageType`] without committing to a payload shape up front.
#[derive(Debug, Clone, Default)]
pub struct MessageFields {
    pub note: Option<u8>,
    pub velocity: Option<u8>,
    pub controller: Option<u8>,
    pub value: Option<u8>,
    pub program: Option<u8>,
    pub pitch_bend: Option<u16>,
    pub beats: Option<u16>,
    pub sysex: Option<Vec<u8>>,
}

/// A fully-formed MIDI message: a payload plus the channel it was
/// addressed to (`None` for system-common/realtime messages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    payload: Payload,
    channel: Option<u8>,
    bytes: Vec<u8>,
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match &self.payload {
            Payload::NoteOn { .. } => MessageType::NoteOn,
            Payload::NoteOff { .. } => MessageType::NoteOff,
            Payload::PolyAftertouch { .. } => MessageType::PolyAftertouch,
            Payload::ControlChange { .. } => MessageType::ControlChange,
            Payload::ProgramChange { .. } => MessageType::ProgramChange,
            Payload::ChannelAftertouch { .. } => MessageType::ChannelAftertouch,
            Payload::PitchBend { .. } => MessageType::PitchBend,
            Payload::SysEx { .. } => MessageType::SysEx,
            Payload::Clock => MessageType::Clock,
            Payload::Start => MessageType::Start,
            Payload::Stop => MessageType::Stop,
            Payload::Continue => MessageType::Continue,
            Payload::SongPosition { .. } => MessageType::SongPosition,
            Payload::Undefined { .. } => MessageType::Undefined,
        }
    }

    pub fn type_string(&self) -> &'static str {
        self.kind().type_string()
    }

    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Cached wire bytes; always kept in sync with `payload`/`channel`.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Deep copy: mutating the result never affects `self`.
    pub fn copy(&self) -> Message {
        self.clone()
    }

    pub fn with_note(&self, note: u8) -> Message {
        let payload = match &self.payload {
            Payload::NoteOn { velocity, .. } => Payload::NoteOn {
                note,
                velocity: *velocity,
            },
            Payload::NoteOff { velocity, .. } => Payload::NoteOff {
                note,
                velocity: *velocity,
            },
            Payload::PolyAftertouch { value, .. } => Payload::PolyAftertouch { note, value: *value },
            other => other.clone(),
        };
        Message::build(payload, self.channel)
    }

    pub fn with_velocity(&self, velocity: u8) -> Message {
        let payload = match &self.payload {
            Payload::NoteOn { note, .. } => Payload::NoteOn { note: *note, velocity },
            Payload::NoteOff { note, .. } => Payload::NoteOff { note: *note, velocity },
            other => other.clone(),
        };
        Message::build(payload, self.channel)
    }

    pub fn with_channel(&self, channel: u8) -> Message {
        Message::build(self.payload.clone(), Some(channel))
    }

    fn build(payload: Payload, channel: Option<u8>) -> Message {
        let bytes = Self::encode(&payload, channel).unwrap_or_default();
        Message {
            payload,
            channel,
            bytes,
        }
    }

    /// Constructs a message from a type and a loosely-typed field bag,
    /// validating that the fields required by `kind` are present.
    pub fn from_properties(
        kind: MessageType,
        channel: Option<u8>,
        fields: MessageFields,
    ) -> Result<Message, RouterError> {
        let missing = |field: &str| {
            RouterError::protocol(format!("{} message missing field '{}'", kind, field))
        };
        let payload = match kind {
            MessageType::NoteOn => Payload::NoteOn {
                note: fields.note.ok_or_else(|| missing("note"))?,
                velocity: fields.velocity.ok_or_else(|| missing("velocity"))?,
            },
            MessageType::NoteOff => Payload::NoteOff {
                note: fields.note.ok_or_else(|| missing("note"))?,
                velocity: fields.velocity.unwrap_or(0),
            },
            MessageType::PolyAftertouch => Payload::PolyAftertouch {
                note: fields.note.ok_or_else(|| missing("note"))?,
                value: fields.value.ok_or_else(|| missing("value"))?,
            },
            MessageType::ControlChange => Payload::ControlChange {
                controller: fields.controller.ok_or_else(|| missing("controller"))?,
                value: fields.value.ok_or_else(|| missing("value"))?,
            },
            MessageType::ProgramChange => Payload::ProgramChange {
                program: fields.program.ok_or_else(|| missing("program"))?,
            },
            MessageType::ChannelAftertouch => Payload::ChannelAftertouch {
                value: fields.value.ok_or_else(|| missing("value"))?,
            },
            MessageType::PitchBend => Payload::PitchBend {
                value: fields.pitch_bend.ok_or_else(|| missing("pitch_bend"))?.min(0x3FFF),
            },
            MessageType::SysEx => Payload::SysEx {
                data: fields.sysex.ok_or_else(|| missing("sysex"))?,
            },
            MessageType::SongPosition => Payload::SongPosition {
                beats: fields.beats.ok_or_else(|| missing("beats"))?.min(0x3FFF),
            },
            MessageType::Clock => Payload::Clock,
            MessageType::Start => Payload::Start,
            MessageType::Stop => Payload::Stop,
            MessageType::Continue => Payload::Continue,
            MessageType::Undefined => {
                return Err(RouterError::protocol("cannot construct an Undefined message from properties"))
            }
        };
        let channel = if kind.is_channel_scoped() { channel } else { None };
        Ok(Message::build(payload, channel))
    }

    /// Parses a single MIDI message from raw wire bytes (no running status).
    pub fn from_bytes(bytes: &[u8]) -> Result<Message, RouterError> {
        let status = *bytes
            .first()
            .ok_or_else(|| RouterError::protocol("empty message"))?;
        let kind = MessageType::from_status(status);
        let channel = if kind.is_channel_scoped() {
            Some(status & 0x0F)
        } else {
            None
        };

        let payload = match kind {
            MessageType::NoteOn => Payload::NoteOn {
                note: byte_at(bytes, 1)?,
                velocity: byte_at(bytes, 2)?,
            },
            MessageType::NoteOff => Payload::NoteOff {
                note: byte_at(bytes, 1)?,
                velocity: byte_at(bytes, 2)?,
            },
            MessageType::PolyAftertouch => Payload::PolyAftertouch {
                note: byte_at(bytes, 1)?,
                value: byte_at(bytes, 2)?,
            },
            MessageType::ControlChange => Payload::ControlChange {
                controller: byte_at(bytes, 1)?,
                value: byte_at(bytes, 2)?,
            },
            MessageType::ProgramChange => Payload::ProgramChange {
                program: byte_at(bytes, 1)?,
            },
            MessageType::ChannelAftertouch => Payload::ChannelAftertouch {
                value: byte_at(bytes, 1)?,
            },
            MessageType::PitchBend => {
                let lsb = byte_at(bytes, 1)? as u16;
                let msb = byte_at(bytes, 2)? as u16;
                Payload::PitchBend {
                    value: (msb << 7) | lsb,
                }
            }
            MessageType::SongPosition => {
                let lsb = byte_at(bytes, 1)? as u16;
                let msb = byte_at(bytes, 2)? as u16;
                Payload::SongPosition {
                    beats: (msb << 7) | lsb,
                }
            }
            MessageType::SysEx => {
                if *bytes.last().unwrap_or(&0) != constants::SYSEX_END {
                    return Err(RouterError::protocol("sysex message missing terminating 0xF7"));
                }
                if bytes[1..bytes.len() - 1].contains(&constants::SYSEX_END) {
                    return Err(RouterError::protocol("sysex message contains an embedded 0xF7"));
                }
                Payload::SysEx {
                    data: bytes[1..bytes.len() - 1].to_vec(),
                }
            }
            MessageType::Clock => Payload::Clock,
            MessageType::Start => Payload::Start,
            MessageType::Stop => Payload::Stop,
            MessageType::Continue => Payload::Continue,
            MessageType::Undefined => Payload::Undefined {
                status,
                data: bytes[1..].to_vec(),
            },
        };

        Ok(Message {
            bytes: bytes.to_vec(),
            payload,
            channel,
        })
    }

    fn encode(payload: &Payload, channel: Option<u8>) -> Result<Vec<u8>, RouterError> {
        let chan = channel.unwrap_or(0) & 0x0F;
        let bytes = match payload {
            Payload::NoteOn { note, velocity } => vec![constants::NOTE_ON | chan, *note, *velocity],
            Payload::NoteOff { note, velocity } => vec![constants::NOTE_OFF | chan, *note, *velocity],
            Payload::PolyAftertouch { note, value } => {
                vec![constants::POLY_AFTERTOUCH | chan, *note, *value]
            }
            Payload::ControlChange { controller, value } => {
                vec![constants::CONTROL_CHANGE | chan, *controller, *value]
            }
            Payload::ProgramChange { program } => vec![constants::PROGRAM_CHANGE | chan, *program],
            Payload::ChannelAftertouch { value } => vec![constants::CHANNEL_AFTERTOUCH | chan, *value],
            Payload::PitchBend { value } => {
                let v = (*value).min(0x3FFFu16);
                vec![constants::PITCH_BEND | chan, (v & 0x7F) as u8, (v >> 7) as u8]
            }
            Payload::SongPosition { beats } => {
                let b = (*beats).min(0x3FFFu16);
                vec![constants::SONG_POSITION, (b & 0x7F) as u8, (b >> 7) as u8]
            }
            Payload::SysEx { data } => {
                let mut v = Vec::with_capacity(data.len() + 2);
                v.push(constants::SYSEX_START);
                v.extend_from_slice(data);
                v.push(constants::SYSEX_END);
                v
            }
            Payload::Clock => vec![constants::CLOCK],
            Payload::Start => vec![constants::START],
            Payload::Stop => vec![constants::STOP],
            Payload::Continue => vec![constants::CONTINUE],
            Payload::Undefined { status, data } => {
                let mut v = Vec::with_capacity(data.len() + 1);
                v.push(*status);
                v.extend_from_slice(data);
                v
            }
        };
        Ok(bytes)
    }
}

fn byte_at(bytes: &[u8], idx: usize) -> Result<u8, RouterError> {
    bytes
        .get(idx)
        .copied()
        .ok_or_else(|| RouterError::protocol("truncated message"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_round_trips_through_bytes() {
        let msg = Message::from_properties(
            MessageType::NoteOn,
            Some(3),
            MessageFields {
                note: Some(60),
                velocity: Some(100),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(msg.bytes(), &[0x90 | 3, 60, 100]);
        let parsed = Message::from_bytes(msg.bytes()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn copy_is_independent() {
        let msg = Message::from_properties(
            MessageType::ControlChange,
            Some(0),
            MessageFields {
                controller: Some(11),
                value: Some(64),
                ..Default::default()
            },
        )
        .unwrap();
        let copy = msg.copy();
        let moved = copy.with_channel(5);
        assert_eq!(msg.channel(), Some(0));
        assert_eq!(moved.channel(), Some(5));
    }

    #[test]
    fn sysex_requires_terminator() {
        let err = Message::from_bytes(&[0xF0, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, RouterError::Protocol { .. }));
    }

    #[test]
    fn sysex_rejects_embedded_terminator() {
        let err = Message::from_bytes(&[0xF0, 0x01, 0xF7, 0x02, 0xF7]).unwrap_err();
        assert!(matches!(err, RouterError::Protocol { .. }));
    }

    #[test]
    fn realtime_messages_have_no_channel() {
        let msg = Message::from_bytes(&[0xF8]).unwrap();
        assert_eq!(msg.kind(), MessageType::Clock);
        assert_eq!(msg.channel(), None);
    }

    #[test]
    fn type_string_round_trips() {
        for kind in [
            MessageType::NoteOn,
            MessageType::ControlChange,
            MessageType::SysEx,
            MessageType::Clock,
        ] {
            assert_eq!(MessageType::from_type_string(kind.type_string()), Some(kind));
            assert!(MessageType::is_type_valid(kind.type_string()));
        }
        assert!(!MessageType::is_type_valid("not_a_type"));
    }
}
