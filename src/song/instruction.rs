//! 16-bit instruction words
//!
//! One instruction word per channel per pattern line, packed as:
//!
//! ```text
//! bit 15..13  effect class
//! bit 12..7   effect payload (6 bits)
//! bit  6..0   note field
//! ```
//!
//! Note field values:
//! - 0 continue, 1 note off, 2 end of pattern
//! - 3-6 reserved
//! - 7 stop PCM playback
//! - 8-127 note on at that pitch (semitones, C-0 = 8)
//!
//! Effect classes: 0 = command (see the `CMD_*` payloads), 1 = set volume,
//! 2 = set note delay, 3 = start bend, 4 = set instrument, 5 = set tempo,
//! 6-7 reserved. This packing is both the wire format and the in-memory form
//! the playback engine consumes.

/// Note field: continue the current voice.
pub const NOTE_CONTINUE: u8 = 0;
/// Note field: release the current voice.
pub const NOTE_OFF: u8 = 1;
/// Note field: end of pattern.
pub const NOTE_END: u8 = 2;
/// Note field: stop PCM playback on a PCM channel.
pub const NOTE_STOP_PCM: u8 = 7;
/// Lowest note field value that is a pitched note-on.
pub const NOTE_FIRST_PITCH: u8 = 8;

/// Effect class 0: plain command, selected by payload.
pub const EFFECT_COMMAND: u8 = 0;
/// Effect class 1: set channel volume to `(payload+1)/64`.
pub const EFFECT_SET_VOLUME: u8 = 1;
/// Effect class 2: set note delay to `payload+1` frames.
pub const EFFECT_SET_DELAY: u8 = 2;
/// Effect class 3: start a bend over `payload+1` sixteenth notes.
pub const EFFECT_START_BEND: u8 = 3;
/// Effect class 4: select instrument `payload`.
pub const EFFECT_SET_INSTRUMENT: u8 = 4;
/// Effect class 5: set tempo table index `payload`.
pub const EFFECT_SET_TEMPO: u8 = 5;

/// Command payload: no-op.
pub const CMD_CONTINUE: u8 = 0;
/// Command payload: set channel volume to 0.
pub const CMD_VOLUME_OFF: u8 = 1;
/// Command payload: clear the note delay.
pub const CMD_DELAY_OFF: u8 = 2;
/// Command payload: bend to the note field immediately.
pub const CMD_BEND_NOW: u8 = 3;
/// Command payload: silence the channel's instrument.
pub const CMD_INSTRUMENT_OFF: u8 = 4;
/// Command payload: switch the channel to PCM playback.
pub const CMD_INSTRUMENT_PCM: u8 = 5;
/// Command payload: end of pattern.
pub const CMD_END: u8 = 6;

/// One decoded instruction word.
///
/// Derived once per read site; never threaded through logic as a raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// 7-bit note field.
    pub note: u8,
    /// 3-bit effect class.
    pub effect: u8,
    /// 6-bit effect payload.
    pub payload: u8,
}

impl Instruction {
    /// Decode a 16-bit instruction word into its fields.
    #[inline]
    pub fn decode(word: u16) -> Self {
        Instruction {
            note: (word & 0x7f) as u8,
            effect: (word >> 13) as u8,
            payload: ((word >> 7) & 0x3f) as u8,
        }
    }

    /// Pack the fields back into a 16-bit instruction word.
    ///
    /// Fields beyond their bit width are masked off.
    #[inline]
    pub fn encode(&self) -> u16 {
        ((self.effect as u16 & 0x7) << 13)
            | ((self.payload as u16 & 0x3f) << 7)
            | (self.note as u16 & 0x7f)
    }

    /// A continue/continue instruction (note 0, effect 0).
    pub const fn empty() -> Self {
        Instruction {
            note: 0,
            effect: 0,
            payload: 0,
        }
    }
}

/// End-of-pattern predicate on a raw instruction word: true when the note
/// field or the command effect marks the pattern end. Shared by the codec
/// (pattern records carry no line count) and the playback engine.
#[inline]
pub fn is_end(word: u16) -> bool {
    (word & 0x7f) == NOTE_END as u16 || (word >> 7) == CMD_END as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fields() {
        // set tempo 12 with note C-4 (0x38): class 5, payload 12, note 56
        let word = (5u16 << 13) | (12 << 7) | 56;
        let inst = Instruction::decode(word);
        assert_eq!(inst.effect, EFFECT_SET_TEMPO);
        assert_eq!(inst.payload, 12);
        assert_eq!(inst.note, 56);
        assert_eq!(inst.encode(), word);
    }

    #[test]
    fn test_roundtrip_extremes() {
        for &word in &[0u16, 0xffff, 0x8000, 0x007f, (6 << 7)] {
            let inst = Instruction::decode(word);
            // Bits 12..7 of 0xffff include the payload mask; re-encoding must
            // reproduce the word exactly since decode keeps every bit.
            assert_eq!(inst.encode(), word);
        }
    }

    #[test]
    fn test_is_end() {
        // note field 2
        assert!(is_end(2));
        assert!(is_end((1 << 13) | (5 << 7) | 2));
        // command effect 6
        assert!(is_end(6 << 7));
        assert!(is_end((6 << 7) | 0x38));
        // everything else
        assert!(!is_end(0));
        assert!(!is_end(0x38));
        assert!(!is_end((5 << 13) | (6 << 7)));
    }

    #[test]
    fn test_empty() {
        assert_eq!(Instruction::empty().encode(), 0);
        assert!(!is_end(Instruction::empty().encode()));
    }
}
