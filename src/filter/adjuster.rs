//! Adjuster mechanism: a named rule that matches an incoming message
//! against a trigger map, extracts a value from one of its fields, and
//! (subject to pot-pickup debouncing) forwards that value to a handler.
//! Used both by the implicit per-filter toggle and by the clock's three
//! tempo/transport adjusters.

use crate::message::{Message, MessageType, Payload};
use std::sync::Mutex;

/// A field value a trigger requires: either an exact match or mere
/// presence (the field must exist on the payload, any value accepted).
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerValue {
    Equals(i64),
    Present,
}

pub struct AdjusterRule {
    pub name: String,
    pub message_type: MessageType,
    pub trigger: Vec<(&'static str, TriggerValue)>,
    pub value_key: &'static str,
    pub pot_pickup: bool,
    last_value: Mutex<Option<i64>>,
}

impl AdjusterRule {
    pub fn new(
        name: impl Into<String>,
        message_type: MessageType,
        trigger: Vec<(&'static str, TriggerValue)>,
        value_key: &'static str,
        pot_pickup: bool,
    ) -> Self {
        AdjusterRule {
            name: name.into(),
            message_type,
            trigger,
            value_key,
            pot_pickup,
            last_value: Mutex::new(None),
        }
    }

    /// Extracts the named field from a payload as an i64, for trigger
    /// matching and value extraction alike.
    fn field(payload: &Payload, key: &str) -> Option<i64> {
        match (payload, key) {
            (Payload::ControlChange { controller, .. }, "controller") => Some(*controller as i64),
            (Payload::ControlChange { value, .. }, "value") => Some(*value as i64),
            (Payload::NoteOn { note, .. }, "note") => Some(*note as i64),
            (Payload::NoteOn { velocity, .. }, "velocity") => Some(*velocity as i64),
            (Payload::ProgramChange { program }, "program") => Some(*program as i64),
            (Payload::PitchBend { value }, "value") => Some(*value as i64),
            _ => None,
        }
    }

    /// Returns the extracted value if the message type and trigger map all
    /// match; `None` means the rule simply doesn't apply to this message.
    fn matches(&self, msg: &Message) -> Option<i64> {
        if msg.kind() != self.message_type {
            return None;
        }
        let payload = msg.payload();
        for (key, expected) in &self.trigger {
            let actual = Self::field(payload, key)?;
            match expected {
                TriggerValue::Equals(v) => {
                    if actual != *v {
                        return None;
                    }
                }
                TriggerValue::Present => {}
            }
        }
        Self::field(payload, self.value_key)
    }

    /// Matches `msg` and, if pot-pickup debouncing doesn't suppress it,
    /// returns the value the caller should act on.
    pub fn fire(&self, msg: &Message) -> Option<i64> {
        let value = self.matches(msg)?;
        if self.pot_pickup {
            let mut last = self.last_value.lock().unwrap();
            let suppressed = match *last {
                Some(prev) => (prev - value).abs() > 1,
                None => true,
            };
            *last = Some(value);
            if suppressed {
                return None;
            }
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageFields;

    fn cc(controller: u8, value: u8) -> Message {
        Message::from_properties(
            MessageType::ControlChange,
            Some(0),
            MessageFields {
                controller: Some(controller),
                value: Some(value),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn matches_only_the_bound_controller() {
        let rule = AdjusterRule::new(
            "test",
            MessageType::ControlChange,
            vec![("controller", TriggerValue::Equals(11))],
            "value",
            false,
        );
        assert_eq!(rule.fire(&cc(11, 64)), Some(64));
        assert_eq!(rule.fire(&cc(12, 64)), None);
    }

    #[test]
    fn pot_pickup_suppresses_first_jump_then_tracks() {
        let rule = AdjusterRule::new(
            "test",
            MessageType::ControlChange,
            vec![("controller", TriggerValue::Equals(11))],
            "value",
            true,
        );
        // First observation seeds last_value but never fires.
        assert_eq!(rule.fire(&cc(11, 10)), None);
        // Large jump away from the seeded value stays suppressed.
        assert_eq!(rule.fire(&cc(11, 80)), None);
        // Small step from the (now updated) last value fires.
        assert_eq!(rule.fire(&cc(11, 81)), Some(81));
    }
}
