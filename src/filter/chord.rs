//! Fixed chord template table. Each template is a list of semitone offsets
//! applied to an incoming note; offsets that would push the resulting note
//! out of `[0, 127]` are silently dropped rather than clamped, matching a
//! chord's fan-out semantics (some voicings simply don't sound at the
//! extremes of the keyboard).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordTemplate {
    Disabled,
    Major3,
    Minor3,
    Major7th,
    Minor7th,
    Dominant7th,
    Sus2,
    Sus4,
    Fifth,
    Octave,
    Diminished,
    Augmented,
}

impl ChordTemplate {
    pub fn offsets(&self) -> &'static [i8] {
        match self {
            ChordTemplate::Disabled => &[],
            ChordTemplate::Major3 => &[0, 4, 7],
            ChordTemplate::Minor3 => &[0, 3, 7],
            ChordTemplate::Major7th => &[0, 4, 7, 11],
            ChordTemplate::Minor7th => &[0, 3, 7, 10],
            ChordTemplate::Dominant7th => &[0, 4, 7, 10],
            ChordTemplate::Sus2 => &[0, 2, 7],
            ChordTemplate::Sus4 => &[0, 5, 7],
            ChordTemplate::Fifth => &[0, 7],
            ChordTemplate::Octave => &[0, 12],
            ChordTemplate::Diminished => &[0, 3, 6],
            ChordTemplate::Augmented => &[0, 4, 8],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "disabled" => ChordTemplate::Disabled,
            "major3" => ChordTemplate::Major3,
            "minor3" => ChordTemplate::Minor3,
            "major7th" => ChordTemplate::Major7th,
            "minor7th" => ChordTemplate::Minor7th,
            "dominant7th" => ChordTemplate::Dominant7th,
            "sus2" => ChordTemplate::Sus2,
            "sus4" => ChordTemplate::Sus4,
            "fifth" => ChordTemplate::Fifth,
            "octave" => ChordTemplate::Octave,
            "diminished" => ChordTemplate::Diminished,
            "augmented" => ChordTemplate::Augmented,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_has_no_offsets() {
        assert!(ChordTemplate::Disabled.offsets().is_empty());
    }

    #[test]
    fn minor7th_matches_fixed_table() {
        assert_eq!(ChordTemplate::Minor7th.offsets(), &[0, 3, 7, 10]);
    }
}
