//! Patterns and the tracker-notation text grammar
//!
//! A pattern is an ordered list of lines; each line carries one instruction
//! word per channel plus a wait (in 16th notes at parse time, stored in the
//! same units and scaled by the current tempo's tick length during playback).
//! Exactly one line carries an end marker and it is the last line.
//!
//! The text grammar, one line per row:
//!
//! ```text
//! TT  NNN:EEE  NNN:EEE ...     // one NNN:EEE column per channel
//! ```
//!
//! - `TT` time column: a base-36 beat digit followed by a hex 16th digit.
//!   Times must be non-decreasing and the first line must sit at `00`.
//! - `NNN` note: `---` continue, `OFF` note off, `END` end of pattern, a
//!   note name + octave (`C-4`, `F#2`, `BB3`), or a decimal number `000`-`120`
//!   (`000` = stop PCM, `001`-`120` = pitches 8-127).
//! - `EEE` effect: `---`, `V00`/`D00`/`B00`/`I00`/`PCM`/`END` commands,
//!   `V01`-`V64` volume, `D01`-`D64` delay, `B01`-`B64` bend, `I01`-`I64`
//!   instrument, or a bare BPM `045`-`202` compiled to the nearest tempo
//!   table index.
//!
//! `//` comments and blank lines are skipped; input is case-insensitive.

use super::instruction::{
    is_end, Instruction, CMD_BEND_NOW, CMD_CONTINUE, CMD_DELAY_OFF, CMD_END, CMD_INSTRUMENT_OFF,
    CMD_INSTRUMENT_PCM, CMD_VOLUME_OFF, EFFECT_COMMAND, EFFECT_SET_DELAY, EFFECT_SET_INSTRUMENT,
    EFFECT_SET_TEMPO, EFFECT_SET_VOLUME, EFFECT_START_BEND, NOTE_CONTINUE, NOTE_END, NOTE_OFF,
};
use crate::tables::nearest_tempo_index;
use crate::{GvsongError, Result};

/// One pattern line: an instruction word per channel plus the wait (in 16th
/// notes) before the next line executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternLine {
    /// One encoded instruction word per channel.
    pub instructions: Vec<u16>,
    /// 16th notes until the next line.
    pub wait: u16,
}

impl PatternLine {
    /// True when any channel's instruction carries the end marker.
    pub fn is_end(&self) -> bool {
        self.instructions.iter().any(|&word| is_end(word))
    }
}

/// An ordered list of pattern lines ending in the end-marked line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// The lines, last one end-marked.
    pub lines: Vec<PatternLine>,
}

fn bad_line(pattern_index: usize, msg: &str, line: &str) -> GvsongError {
    GvsongError::Build(format!("pattern {}: {}: {}", pattern_index, msg, line))
}

fn parse_note(token: &str, line: &str, pattern_index: usize) -> Result<(u8, bool)> {
    let note = match token {
        "---" => return Ok((NOTE_CONTINUE, false)),
        "OFF" => return Ok((NOTE_OFF, false)),
        "END" => return Ok((NOTE_END, true)),
        _ => {
            let first = token.as_bytes()[0];
            if first == b'0' || first == b'1' {
                let n: u16 = token
                    .parse()
                    .map_err(|_| bad_line(pattern_index, "bad note", line))?;
                // 000 is stop-PCM (7); 001-120 are pitches 8-127.
                let n = n + 7;
                if n > 0x7f {
                    return Err(bad_line(pattern_index, "note out of range", line));
                }
                n as u8
            } else {
                let base = match &token.as_bytes()[..2] {
                    b"C-" => 0x08,
                    b"C#" | b"DB" => 0x09,
                    b"D-" => 0x0a,
                    b"D#" | b"EB" => 0x0b,
                    b"E-" => 0x0c,
                    b"F-" => 0x0d,
                    b"F#" | b"GB" => 0x0e,
                    b"G-" => 0x0f,
                    b"G#" | b"AB" => 0x10,
                    b"A-" => 0x11,
                    b"A#" | b"BB" => 0x12,
                    b"B-" => 0x13,
                    _ => return Err(bad_line(pattern_index, "unknown note", line)),
                };
                let oct = token
                    .as_bytes()
                    .get(2)
                    .filter(|b| b.is_ascii_digit())
                    .map(|b| b - b'0')
                    .ok_or_else(|| bad_line(pattern_index, "unknown octave", line))?;
                let n = base + oct as u16 * 12;
                if n > 0x7f {
                    return Err(bad_line(pattern_index, "note out of range", line));
                }
                n as u8
            }
        }
    };
    Ok((note, false))
}

fn parse_effect(
    token: &str,
    line: &str,
    pattern_index: usize,
    instrument_count: usize,
) -> Result<(u8, u8, bool)> {
    let command = |payload: u8| (EFFECT_COMMAND, payload, payload == CMD_END);
    Ok(match token {
        "---" => command(CMD_CONTINUE),
        "V00" => command(CMD_VOLUME_OFF),
        "D00" => command(CMD_DELAY_OFF),
        "B00" => command(CMD_BEND_NOW),
        "I00" => command(CMD_INSTRUMENT_OFF),
        "PCM" => command(CMD_INSTRUMENT_PCM),
        "END" => command(CMD_END),
        _ if token.as_bytes()[0].is_ascii_digit() => {
            let bpm: u32 = token
                .parse()
                .map_err(|_| bad_line(pattern_index, "unknown effect", line))?;
            if !(45..=202).contains(&bpm) {
                return Err(bad_line(pattern_index, "tempo out of range 45-202", line));
            }
            (EFFECT_SET_TEMPO, nearest_tempo_index(bpm as f64) as u8, false)
        }
        _ => {
            let cmd = token.as_bytes()[0];
            let payload: u32 = token
                .get(1..)
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| bad_line(pattern_index, "bad effect payload", line))?;
            if !(1..=64).contains(&payload) {
                return Err(bad_line(pattern_index, "effect payload out of range", line));
            }
            let payload = (payload - 1) as u8;
            let class = match cmd {
                b'V' => EFFECT_SET_VOLUME,
                b'D' => EFFECT_SET_DELAY,
                b'B' => EFFECT_START_BEND,
                b'I' => {
                    if payload as usize >= instrument_count {
                        return Err(bad_line(pattern_index, "instrument not defined", line));
                    }
                    EFFECT_SET_INSTRUMENT
                }
                _ => return Err(bad_line(pattern_index, "unknown effect", line)),
            };
            (class, payload, false)
        }
    })
}

/// Parse one tracker-notation pattern text into a [`Pattern`].
///
/// `instrument_count` bounds `Ixx` references, so instruments must be defined
/// before patterns.
pub fn parse_pattern(
    text: &str,
    pattern_index: usize,
    channel_count: usize,
    instrument_count: usize,
) -> Result<Pattern> {
    let text = text.trim().to_uppercase();
    let mut lines: Vec<PatternLine> = Vec::new();
    let mut got_end = false;
    let mut last_time = 0u32;
    for raw_line in text.split('\n') {
        let line = match raw_line.find("//") {
            Some(i) => raw_line[..i].trim(),
            None => raw_line.trim(),
        };
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split("  ");
        let time = parts
            .next()
            .filter(|t| t.len() == 2)
            .ok_or_else(|| bad_line(pattern_index, "missing time column", line))?;

        let beat = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ"
            .find(time.as_bytes()[0] as char)
            .ok_or_else(|| bad_line(pattern_index, "bad time", line))?;
        let sixt = "0123456789ABCDEF"
            .find(time.as_bytes()[1] as char)
            .ok_or_else(|| bad_line(pattern_index, "bad time", line))?;
        let now = (beat * 16 + sixt) as u32;
        if now < last_time {
            return Err(bad_line(pattern_index, "time must not decrease", line));
        }
        let wait = (now - last_time) as u16;
        last_time = now;
        if lines.is_empty() && wait != 0 {
            return Err(bad_line(pattern_index, "first row must start on time 00", line));
        }
        // A run of all-continue lines collapses into the preceding line's
        // wait.
        if lines.len() > 1
            && lines
                .last()
                .map_or(false, |l| l.instructions.iter().all(|&w| w == 0))
        {
            lines.pop();
        }
        if let Some(last) = lines.last_mut() {
            last.wait += wait;
        }

        let mut instructions = Vec::with_capacity(channel_count);
        for column in parts {
            let (note_str, effect_str) = match column.split_once(':') {
                Some((n, e)) if n.len() == 3 && e.len() == 3 => (n, e),
                _ => return Err(bad_line(pattern_index, "bad channel instruction", line)),
            };
            let (note, note_end) = parse_note(note_str, line, pattern_index)?;
            let (effect, payload, effect_end) =
                parse_effect(effect_str, line, pattern_index, instrument_count)?;
            got_end = got_end || note_end || effect_end;
            instructions.push(
                Instruction {
                    note,
                    effect,
                    payload,
                }
                .encode(),
            );
        }
        if instructions.len() != channel_count {
            return Err(bad_line(
                pattern_index,
                &format!("expecting {} channels", channel_count),
                line,
            ));
        }
        lines.push(PatternLine {
            instructions,
            wait: 0,
        });
    }
    if !got_end {
        return Err(GvsongError::Build(format!(
            "pattern {} missing END command",
            pattern_index
        )));
    }
    // Keep nothing past the end-marked line.
    if let Some(end) = lines.iter().position(|l| l.is_end()) {
        lines.truncate(end + 1);
    }
    Ok(Pattern { lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::instruction::NOTE_STOP_PCM;

    fn one(text: &str) -> Result<Pattern> {
        parse_pattern(text, 0, 1, 4)
    }

    #[test]
    fn test_basic_pattern() {
        let pat = one("00  C-4:I01\n10  OFF:---\n20  ---:END").unwrap();
        assert_eq!(pat.lines.len(), 3);
        let first = Instruction::decode(pat.lines[0].instructions[0]);
        assert_eq!(first.note, 0x38); // C-4
        assert_eq!(first.effect, EFFECT_SET_INSTRUMENT);
        assert_eq!(first.payload, 0);
        assert_eq!(pat.lines[0].wait, 16);
        assert_eq!(pat.lines[1].wait, 16);
        assert!(pat.lines[2].is_end());
    }

    #[test]
    fn test_first_row_must_be_zero() {
        assert!(one("01  C-4:---\n10  ---:END").is_err());
    }

    #[test]
    fn test_time_must_not_decrease() {
        assert!(one("00  C-4:---\n20  OFF:---\n10  ---:END").is_err());
    }

    #[test]
    fn test_missing_end_rejected() {
        assert!(one("00  C-4:---\n10  OFF:---").is_err());
    }

    #[test]
    fn test_continue_lines_coalesce() {
        // The all-continue middle line folds into the first line's wait.
        let pat = one("00  C-4:---\n08  ---:---\n10  ---:END").unwrap();
        assert_eq!(pat.lines.len(), 2);
        assert_eq!(pat.lines[0].wait, 16);
    }

    #[test]
    fn test_note_names_and_accidentals() {
        let pat = one("00  DB2:---\n04  A#3:---\n08  ---:END").unwrap();
        assert_eq!(Instruction::decode(pat.lines[0].instructions[0]).note, 0x09 + 24);
        assert_eq!(Instruction::decode(pat.lines[1].instructions[0]).note, 0x12 + 36);
    }

    #[test]
    fn test_numeric_notes() {
        // 000 is the PCM stop note; 120 is the top pitch; 121 overflows.
        let pat = one("00  000:PCM\n10  120:---\n20  ---:END").unwrap();
        assert_eq!(
            Instruction::decode(pat.lines[0].instructions[0]).note,
            NOTE_STOP_PCM
        );
        assert_eq!(Instruction::decode(pat.lines[1].instructions[0]).note, 127);
        assert!(one("00  121:---\n10  ---:END").is_err());
    }

    #[test]
    fn test_tempo_effect() {
        let pat = one("00  ---:120\n10  ---:END").unwrap();
        let inst = Instruction::decode(pat.lines[0].instructions[0]);
        assert_eq!(inst.effect, EFFECT_SET_TEMPO);
        assert_eq!(inst.payload, 30);
        assert!(one("00  ---:044\n10  ---:END").is_err());
        assert!(one("00  ---:203\n10  ---:END").is_err());
    }

    #[test]
    fn test_undefined_instrument_rejected() {
        // instrument_count is 4, so I05 is out of range.
        assert!(one("00  C-4:I05\n10  ---:END").is_err());
        assert!(one("00  C-4:I04\n10  ---:END").is_ok());
    }

    #[test]
    fn test_channel_count_enforced() {
        assert!(parse_pattern("00  C-4:---\n10  ---:END", 0, 2, 1).is_err());
        assert!(parse_pattern("00  C-4:---  OFF:---\n10  ---:END  ---:---", 0, 2, 1).is_ok());
    }

    #[test]
    fn test_comments_and_case() {
        let pat = one("// lead line\n00  c-4:i01  // note on\n\n10  off:end").unwrap();
        assert_eq!(pat.lines.len(), 2);
    }

    #[test]
    fn test_lines_truncated_after_end() {
        let pat = one("00  C-4:---\n08  ---:END\n10  OFF:---").unwrap();
        assert_eq!(pat.lines.len(), 2);
        assert!(pat.lines[1].is_end());
    }
}
