//! Song Data Model
//!
//! The root aggregate: a fixed channel count, up to 64 instruments, a
//! 120-entry PCM sample mapping, up to 65535 patterns, and up to 255 play
//! sequences. Songs are built once through the validating builders (or
//! decoded from bytes), then read-only for every playback and export
//! operation. Builder failures are fatal to the in-progress build; the caller
//! discards the partial song.

pub mod envelope;
pub mod instruction;
pub mod pattern;

use crate::banks::SoundBanks;
use crate::export::WaveRenderer;
use crate::player;
use crate::visualization::{VisualizationEvents, VizCollector};
use crate::{format, GvsongError, Result};
use envelope::{parse_marked_list, Envelope, ListToken};
use pattern::{parse_pattern, Pattern};

/// Number of entries in the PCM sample mapping (one per pitched note).
pub const PCM_MAPPING_LEN: usize = 120;

/// Maximum instruments per song.
pub const MAX_INSTRUMENTS: usize = 64;

/// Maximum patterns per song.
pub const MAX_PATTERNS: usize = 65535;

/// Maximum sequences per song.
pub const MAX_SEQUENCES: usize = 255;

/// Highest valid wave id (0-10 oscillator families, 11 noise, 12 PCM).
pub const MAX_WAVE: u16 = 12;

/// One instrument: a waveform selector plus volume and pitch envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    /// Wave id: 0-10 oscillator family, 11 noise, 12 PCM passthrough.
    pub wave: u16,
    /// Volume envelope, values 0..=16.
    pub volume: Envelope,
    /// Pitch offset envelope in 1/16 semitones, values -128..=127.
    pub pitch: Envelope,
}

/// A play sequence: pattern order plus song-level loop/exit indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// Pattern indices in play order.
    pub patterns: Vec<u16>,
    /// Index the song wraps back to while loops remain.
    pub loop_index: u16,
    /// Index where wrapping stops; entries past it play once as the tail.
    pub exit_index: u16,
}

/// A complete song, ready to serialize or render.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub(crate) channel_count: u8,
    pub(crate) instruments: Vec<Instrument>,
    pub(crate) pcm_mapping: [u16; PCM_MAPPING_LEN],
    pub(crate) patterns: Vec<Pattern>,
    pub(crate) sequences: Vec<Sequence>,
}

impl Song {
    /// Create an empty song with a fixed channel count (1-255).
    pub fn new(channel_count: u8) -> Result<Song> {
        if channel_count == 0 {
            return Err(GvsongError::Build(
                "channel count must be between 1 and 255".into(),
            ));
        }
        Ok(Song {
            channel_count,
            instruments: Vec::new(),
            pcm_mapping: [0; PCM_MAPPING_LEN],
            patterns: Vec::new(),
            sequences: Vec::new(),
        })
    }

    /// Append an instrument.
    ///
    /// `wave` selects an oscillator family (0-10), noise (11), or PCM
    /// passthrough (12). The volume envelope takes values 0..=16, the pitch
    /// envelope -128..=127; both follow the Loop/Exit List rules in
    /// [`envelope`].
    pub fn add_instrument(
        &mut self,
        wave: u16,
        volume: &[ListToken<i32>],
        pitch: &[ListToken<i32>],
    ) -> Result<&mut Song> {
        let i = self.instruments.len();
        if i >= MAX_INSTRUMENTS {
            return Err(GvsongError::Build(format!(
                "too many instruments; max of {}",
                MAX_INSTRUMENTS
            )));
        }
        if wave > MAX_WAVE {
            return Err(GvsongError::Build(format!(
                "invalid wave for instrument {}; expecting 0-{} but got {}",
                i, MAX_WAVE, wave
            )));
        }
        let volume = Envelope::from_tokens(volume, 0, 16)
            .map_err(|e| GvsongError::Build(format!("instrument {} volume: {}", i, e)))?;
        let pitch = Envelope::from_tokens(pitch, -128, 127)
            .map_err(|e| GvsongError::Build(format!("instrument {} pitch: {}", i, e)))?;
        self.instruments.push(Instrument {
            wave,
            volume,
            pitch,
        });
        Ok(self)
    }

    /// Set the 120-entry PCM mapping (pitched note → PCM bank slot).
    ///
    /// Every entry must index one of the caller's `available_slots` PCM
    /// sample slots.
    pub fn set_pcm_mapping(
        &mut self,
        mapping: &[u16; PCM_MAPPING_LEN],
        available_slots: usize,
    ) -> Result<&mut Song> {
        for (i, &slot) in mapping.iter().enumerate() {
            if slot as usize >= available_slots {
                return Err(GvsongError::Build(format!(
                    "invalid PCM sample at index {}; must be below {}",
                    i, available_slots
                )));
            }
        }
        self.pcm_mapping = *mapping;
        Ok(self)
    }

    /// Parse and install the pattern list from tracker-notation texts.
    ///
    /// Call after `add_instrument`: `Ixx` effects must reference instruments
    /// that already exist.
    pub fn set_patterns(&mut self, texts: &[&str]) -> Result<&mut Song> {
        if texts.len() > MAX_PATTERNS {
            return Err(GvsongError::Build(format!(
                "too many patterns; max of {}",
                MAX_PATTERNS
            )));
        }
        let mut patterns = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            patterns.push(parse_pattern(
                text,
                i,
                self.channel_count as usize,
                self.instruments.len(),
            )?);
        }
        self.patterns = patterns;
        Ok(self)
    }

    /// Install the play sequences.
    ///
    /// Each sequence is a Loop/Exit List of pattern indices: non-empty, every
    /// index in range, at most 65535 entries. `loop` defaults to 0 and `exit`
    /// to the list length when unmarked.
    pub fn set_sequences(&mut self, sequences: &[&[ListToken<u16>]]) -> Result<&mut Song> {
        if sequences.len() > MAX_SEQUENCES {
            return Err(GvsongError::Build(format!(
                "too many sequences; max of {}",
                MAX_SEQUENCES
            )));
        }
        let mut result = Vec::with_capacity(sequences.len());
        for (i, tokens) in sequences.iter().enumerate() {
            let parsed = parse_marked_list(tokens)
                .map_err(|e| GvsongError::Build(format!("sequence {}: {}", i, e)))?;
            if parsed.values.is_empty() {
                return Err(GvsongError::Build(format!("sequence {} is empty", i)));
            }
            if parsed.values.len() > 65535 {
                return Err(GvsongError::Build(format!(
                    "too many patterns in sequence {}; max of 65535",
                    i
                )));
            }
            for &p in &parsed.values {
                if p as usize >= self.patterns.len() {
                    return Err(GvsongError::Build(format!(
                        "invalid pattern index {} in sequence {}",
                        p, i
                    )));
                }
            }
            let loop_index = parsed.loop_index.unwrap_or(0);
            let exit_index = parsed.exit_index.unwrap_or(parsed.values.len());
            result.push(Sequence {
                patterns: parsed.values,
                loop_index: loop_index as u16,
                exit_index: exit_index as u16,
            });
        }
        self.sequences = result;
        Ok(self)
    }

    /// Fixed channel count.
    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    /// The instrument list.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// The 120-entry PCM mapping.
    pub fn pcm_mapping(&self) -> &[u16; PCM_MAPPING_LEN] {
        &self.pcm_mapping
    }

    /// The pattern list.
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// The play sequences.
    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Serialize to the gvsong binary format.
    pub fn encode(&self) -> Vec<u8> {
        format::encode(self)
    }

    /// Deserialize from the gvsong binary format.
    pub fn decode(data: &[u8]) -> Result<Song> {
        format::decode(data)
    }

    /// Render the song to 16-bit samples at 32768 Hz.
    ///
    /// Plays `loop_count` passes of the sequence's loop region, then the
    /// release tail and the end-of-song fade.
    pub fn render_wave(
        &self,
        loop_count: u32,
        sequence: usize,
        banks: &SoundBanks,
    ) -> Result<Vec<i16>> {
        let mut sink = WaveRenderer::new(self, banks);
        player::render(self, loop_count, sequence, Some(&banks.pcm), &mut sink)?;
        Ok(sink.finish())
    }

    /// Walk the song once and collect visualization events for the requested
    /// channels. `draw_bends` resolves pitch through bends and the pitch
    /// envelope; `draw_volume` resolves volume through the volume envelope.
    pub fn render_visualization(
        &self,
        sequence: usize,
        channels: &[usize],
        draw_bends: bool,
        draw_volume: bool,
    ) -> Result<VisualizationEvents> {
        let mut sink = VizCollector::new(self, channels, draw_bends, draw_volume);
        player::render(self, 1, sequence, None, &mut sink)?;
        Ok(sink.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ListToken::{Exit, Loop, Value};

    fn flat_volume() -> Vec<ListToken<i32>> {
        vec![Loop, Value(16), Exit, Value(0)]
    }

    #[test]
    fn test_channel_count_range() {
        assert!(Song::new(0).is_err());
        assert!(Song::new(1).is_ok());
        assert!(Song::new(255).is_ok());
    }

    #[test]
    fn test_add_instrument_validation() {
        let mut song = Song::new(1).unwrap();
        assert!(song.add_instrument(13, &flat_volume(), &[Value(0)]).is_err());
        assert!(song
            .add_instrument(0, &[Value(17)], &[Value(0)])
            .is_err());
        assert!(song
            .add_instrument(0, &flat_volume(), &[Value(128)])
            .is_err());
        assert!(song
            .add_instrument(0, &flat_volume(), &[Value(-129)])
            .is_err());
        // Noise and PCM wave ids are valid.
        assert!(song.add_instrument(11, &flat_volume(), &[Value(0)]).is_ok());
        assert!(song.add_instrument(12, &flat_volume(), &[Value(0)]).is_ok());
    }

    #[test]
    fn test_instrument_limit() {
        let mut song = Song::new(1).unwrap();
        for _ in 0..MAX_INSTRUMENTS {
            song.add_instrument(0, &flat_volume(), &[Value(0)]).unwrap();
        }
        assert!(song.add_instrument(0, &flat_volume(), &[Value(0)]).is_err());
    }

    #[test]
    fn test_pcm_mapping_bounds() {
        let mut song = Song::new(1).unwrap();
        let mut mapping = [0u16; PCM_MAPPING_LEN];
        mapping[10] = 4;
        assert!(song.set_pcm_mapping(&mapping, 4).is_err());
        assert!(song.set_pcm_mapping(&mapping, 5).is_ok());
        assert_eq!(song.pcm_mapping()[10], 4);
    }

    #[test]
    fn test_sequences_validated() {
        let mut song = Song::new(1).unwrap();
        song.add_instrument(0, &flat_volume(), &[Value(0)]).unwrap();
        song.set_patterns(&["00  C-4:I01\n10  ---:END"]).unwrap();
        // Pattern index out of range.
        assert!(song.set_sequences(&[&[Value(1)][..]]).is_err());
        // Empty sequence.
        assert!(song.set_sequences(&[&[][..]]).is_err());
        song.set_sequences(&[&[Value(0), Loop, Value(0), Exit, Value(0)][..]])
            .unwrap();
        let seq = &song.sequences()[0];
        assert_eq!(seq.patterns, vec![0, 0, 0]);
        assert_eq!(seq.loop_index, 1);
        assert_eq!(seq.exit_index, 2);
    }

    #[test]
    fn test_sequence_defaults() {
        let mut song = Song::new(1).unwrap();
        song.add_instrument(0, &flat_volume(), &[Value(0)]).unwrap();
        song.set_patterns(&["00  C-4:I01\n10  ---:END"]).unwrap();
        song.set_sequences(&[&[Value(0), Value(0)][..]]).unwrap();
        let seq = &song.sequences()[0];
        assert_eq!(seq.loop_index, 0);
        assert_eq!(seq.exit_index, 2);
        assert!(seq.exit_index >= seq.loop_index);
    }

    #[test]
    fn test_patterns_require_instruments_first() {
        let mut song = Song::new(1).unwrap();
        assert!(song.set_patterns(&["00  C-4:I01\n10  ---:END"]).is_err());
    }
}
