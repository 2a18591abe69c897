//! Binary Codec
//!
//! The gvsong on-disk format, little-endian throughout:
//!
//! ```text
//! offset  size  field
//! 0       4     magic FB 67 76 73
//! 4       1     version (0)
//! 5       1     channel count
//! 6       2     reserved
//! 8       1     instrument count
//! 9       1     sequence count
//! 10      2     pattern count
//! 12      4     instrument table offset
//! 16      4     sequence table offset
//! 20      4     pattern table offset
//! 24      240   PCM mapping, 120 x u16
//! ```
//!
//! Each table is an array of absolute u32 file offsets, one per record.
//! Instrument records: u16 wave, then volume loop/exit/length and pitch
//! loop/exit/length (u8 each), then u16 volume and pitch data offsets
//! relative to the record start, then the signed envelope bytes, each
//! 2-byte aligned. Sequence records: u16 length, u16 loop, u16 exit, then
//! that many u16 pattern indices. Pattern records store lines of
//! (channel count × u16 instruction, u16 wait) with no line count; the line
//! whose instruction satisfies the end predicate terminates the record.
//!
//! Offsets are followed by seeking, never by streaming past a cursor, so
//! tables may reference overlapping or out-of-order regions.

use crate::song::envelope::Envelope;
use crate::song::instruction::is_end;
use crate::song::pattern::{Pattern, PatternLine};
use crate::song::{Instrument, Sequence, Song, PCM_MAPPING_LEN};
use crate::{GvsongError, Result};

/// File magic, `FB 67 76 73` as a little-endian u32.
pub const MAGIC: u32 = 0x737667fb;

/// On-disk format version.
pub const VERSION: u8 = 0;

/// True when the buffer starts with the gvsong magic.
pub fn is_song_data(data: &[u8]) -> bool {
    data.len() >= 4 && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == MAGIC
}

/// Cursor over a byte buffer with seek-based reads.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn u8(&mut self) -> Result<u8> {
        let b = self
            .data
            .get(self.pos)
            .copied()
            .ok_or_else(|| GvsongError::Format("unexpected end of song data".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn i8(&mut self) -> Result<i8> {
        Ok(self.u8()? as i8)
    }

    fn u16(&mut self) -> Result<u16> {
        let a = self.u8()?;
        let b = self.u8()?;
        Ok(u16::from_le_bytes([a, b]))
    }

    fn u32(&mut self) -> Result<u32> {
        let a = self.u8()?;
        let b = self.u8()?;
        let c = self.u8()?;
        let d = self.u8()?;
        Ok(u32::from_le_bytes([a, b, c, d]))
    }
}

/// Byte buffer writer with little-endian primitives and patch-back slots for
/// offsets that are only known after the payload is emitted.
struct Writer {
    out: Vec<u8>,
}

/// Handle to a reserved little-endian slot, filled in later.
struct Patch {
    at: usize,
    size: usize,
}

impl Writer {
    fn new() -> Self {
        Writer { out: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.out.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn reserve_u16(&mut self) -> Patch {
        let at = self.out.len();
        self.out.extend_from_slice(&[0, 0]);
        Patch { at, size: 2 }
    }

    fn reserve_u32(&mut self) -> Patch {
        let at = self.out.len();
        self.out.extend_from_slice(&[0, 0, 0, 0]);
        Patch { at, size: 4 }
    }

    fn patch(&mut self, slot: &Patch, v: u32) {
        let bytes = v.to_le_bytes();
        self.out[slot.at..slot.at + slot.size].copy_from_slice(&bytes[..slot.size]);
    }

    fn position(&self) -> usize {
        self.out.len()
    }

    fn align(&mut self, n: usize) {
        while self.out.len() % n != 0 {
            self.out.push(0);
        }
    }
}

/// Serialize a song to the binary format.
pub fn encode(song: &Song) -> Vec<u8> {
    let mut w = Writer::new();

    // header
    w.u32(MAGIC);
    w.u8(VERSION);
    w.u8(song.channel_count);
    w.u16(0); // reserved
    w.u8(song.instruments.len() as u8);
    w.u8(song.sequences.len() as u8);
    w.u16(song.patterns.len() as u16);
    let inst_table = w.reserve_u32();
    let seq_table = w.reserve_u32();
    let pat_table = w.reserve_u32();

    // pcm mapping
    for &slot in song.pcm_mapping.iter() {
        w.u16(slot);
    }

    // offset tables
    w.patch(&inst_table, w.position() as u32);
    let inst_offsets: Vec<Patch> = song.instruments.iter().map(|_| w.reserve_u32()).collect();
    w.patch(&seq_table, w.position() as u32);
    let seq_offsets: Vec<Patch> = song.sequences.iter().map(|_| w.reserve_u32()).collect();
    w.patch(&pat_table, w.position() as u32);
    let pat_offsets: Vec<Patch> = song.patterns.iter().map(|_| w.reserve_u32()).collect();

    // instruments
    for (inst, offset) in song.instruments.iter().zip(&inst_offsets) {
        let record_start = w.position();
        w.patch(offset, record_start as u32);
        w.u16(inst.wave);
        w.u8(inst.volume.loop_index());
        w.u8(inst.volume.exit_index());
        w.u8(inst.volume.len() as u8);
        w.u8(inst.pitch.loop_index());
        w.u8(inst.pitch.exit_index());
        w.u8(inst.pitch.len() as u8);
        let volume_offset = w.reserve_u16();
        let pitch_offset = w.reserve_u16();
        w.patch(&volume_offset, (w.position() - record_start) as u32);
        for &v in inst.volume.values() {
            w.u8(v as u8);
        }
        w.align(2);
        w.patch(&pitch_offset, (w.position() - record_start) as u32);
        for &v in inst.pitch.values() {
            w.u8(v as u8);
        }
        w.align(2);
    }

    // sequences
    for (seq, offset) in song.sequences.iter().zip(&seq_offsets) {
        w.patch(offset, w.position() as u32);
        w.u16(seq.patterns.len() as u16);
        w.u16(seq.loop_index);
        w.u16(seq.exit_index);
        for &p in &seq.patterns {
            w.u16(p);
        }
    }

    // patterns; emission stops at the end-marked line even if trailing lines
    // exist in memory
    for (pat, offset) in song.patterns.iter().zip(&pat_offsets) {
        w.patch(offset, w.position() as u32);
        'lines: for line in &pat.lines {
            let mut got_end = false;
            for &word in &line.instructions {
                w.u16(word);
                got_end = got_end || is_end(word);
            }
            w.u16(line.wait);
            if got_end {
                break 'lines;
            }
        }
    }

    w.out
}

/// Deserialize a song from the binary format.
pub fn decode(data: &[u8]) -> Result<Song> {
    let mut r = Reader::new(data);

    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(GvsongError::Format(format!(
            "bad magic: expected {:#010x}, got {:#010x}",
            MAGIC, magic
        )));
    }
    let version = r.u8()?;
    if version != VERSION {
        return Err(GvsongError::Format(format!(
            "unsupported version: {}",
            version
        )));
    }
    let channel_count = r.u8()?;
    if channel_count == 0 {
        return Err(GvsongError::Format("channel count must be nonzero".into()));
    }
    r.u16()?; // reserved
    let inst_count = r.u8()? as usize;
    let seq_count = r.u8()? as usize;
    let pat_count = r.u16()? as usize;
    let inst_table = r.u32()? as usize;
    let seq_table = r.u32()? as usize;
    let pat_table = r.u32()? as usize;

    let mut pcm_mapping = [0u16; PCM_MAPPING_LEN];
    for slot in pcm_mapping.iter_mut() {
        *slot = r.u16()?;
    }

    r.seek(inst_table);
    let mut inst_offsets = Vec::with_capacity(inst_count);
    for _ in 0..inst_count {
        inst_offsets.push(r.u32()? as usize);
    }
    r.seek(seq_table);
    let mut seq_offsets = Vec::with_capacity(seq_count);
    for _ in 0..seq_count {
        seq_offsets.push(r.u32()? as usize);
    }
    r.seek(pat_table);
    let mut pat_offsets = Vec::with_capacity(pat_count);
    for _ in 0..pat_count {
        pat_offsets.push(r.u32()? as usize);
    }

    let mut instruments = Vec::with_capacity(inst_count);
    for &offset in &inst_offsets {
        r.seek(offset);
        let wave = r.u16()?;
        let volume_loop = r.u8()?;
        let volume_exit = r.u8()?;
        let volume_len = r.u8()? as usize;
        let pitch_loop = r.u8()?;
        let pitch_exit = r.u8()?;
        let pitch_len = r.u8()? as usize;
        let volume_offset = r.u16()? as usize;
        let pitch_offset = r.u16()? as usize;
        r.seek(offset + volume_offset);
        let mut volume = Vec::with_capacity(volume_len);
        for _ in 0..volume_len {
            volume.push(r.i8()?);
        }
        r.seek(offset + pitch_offset);
        let mut pitch = Vec::with_capacity(pitch_len);
        for _ in 0..pitch_len {
            pitch.push(r.i8()?);
        }
        instruments.push(Instrument {
            wave,
            volume: Envelope::from_raw(volume, volume_loop, volume_exit),
            pitch: Envelope::from_raw(pitch, pitch_loop, pitch_exit),
        });
    }

    let mut sequences = Vec::with_capacity(seq_count);
    for &offset in &seq_offsets {
        r.seek(offset);
        let len = r.u16()? as usize;
        let loop_index = r.u16()?;
        let exit_index = r.u16()?;
        let mut patterns = Vec::with_capacity(len);
        for _ in 0..len {
            patterns.push(r.u16()?);
        }
        sequences.push(Sequence {
            patterns,
            loop_index,
            exit_index,
        });
    }

    let mut patterns = Vec::with_capacity(pat_count);
    for &offset in &pat_offsets {
        r.seek(offset);
        let mut lines = Vec::new();
        loop {
            let mut got_end = false;
            let mut instructions = Vec::with_capacity(channel_count as usize);
            for _ in 0..channel_count {
                let word = r.u16()?;
                got_end = got_end || is_end(word);
                instructions.push(word);
            }
            let wait = r.u16()?;
            lines.push(PatternLine { instructions, wait });
            if got_end {
                break;
            }
        }
        patterns.push(Pattern { lines });
    }

    Ok(Song {
        channel_count,
        instruments,
        pcm_mapping,
        patterns,
        sequences,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::envelope::ListToken::{Exit, Loop, Value};

    fn sample_song() -> Song {
        let mut song = Song::new(2).unwrap();
        song.add_instrument(
            0,
            &[Loop, Value(16), Value(12), Exit, Value(8), Value(0)],
            &[Value(0)],
        )
        .unwrap();
        song.add_instrument(11, &[Value(16), Value(8)], &[Value(-3), Value(3)])
            .unwrap();
        song.set_patterns(&[
            "00  C-4:I01  ---:---\n08  OFF:---  E-4:I02\n10  ---:END  ---:---",
            "00  G-4:---  ---:V32\n10  ---:---  ---:END",
        ])
        .unwrap();
        song.set_sequences(&[&[Value(0), Loop, Value(1), Exit, Value(0)][..]])
            .unwrap();
        let mut mapping = [0u16; PCM_MAPPING_LEN];
        mapping[48] = 1;
        song.set_pcm_mapping(&mapping, 2).unwrap();
        song
    }

    #[test]
    fn test_roundtrip_structural_equality() {
        let song = sample_song();
        let bytes = song.encode();
        let decoded = Song::decode(&bytes).unwrap();
        assert_eq!(song, decoded);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let song = sample_song();
        assert_eq!(song.encode(), song.encode());
    }

    #[test]
    fn test_magic_and_version() {
        let song = sample_song();
        let mut bytes = song.encode();
        assert!(is_song_data(&bytes));
        assert_eq!(&bytes[..4], &[0xfb, 0x67, 0x76, 0x73]);

        bytes[0] = 0x00;
        assert!(!is_song_data(&bytes));
        assert!(matches!(
            Song::decode(&bytes),
            Err(GvsongError::Format(_))
        ));

        let mut bytes = song.encode();
        bytes[4] = 1;
        assert!(matches!(
            Song::decode(&bytes),
            Err(GvsongError::Format(_))
        ));
    }

    #[test]
    fn test_truncated_buffer_rejected() {
        let bytes = sample_song().encode();
        for len in [0, 3, 11, 23, bytes.len() / 2, bytes.len() - 1] {
            assert!(
                matches!(Song::decode(&bytes[..len]), Err(GvsongError::Format(_))),
                "decode must fail at length {}",
                len
            );
        }
    }

    #[test]
    fn test_zero_channel_count_rejected() {
        let mut bytes = sample_song().encode();
        bytes[5] = 0;
        assert!(matches!(
            Song::decode(&bytes),
            Err(GvsongError::Format(_))
        ));
    }

    #[test]
    fn test_instrument_record_layout() {
        let song = sample_song();
        let bytes = song.encode();
        let inst_table = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
        let first = u32::from_le_bytes([
            bytes[inst_table],
            bytes[inst_table + 1],
            bytes[inst_table + 2],
            bytes[inst_table + 3],
        ]) as usize;
        // wave id 0; volume values [16,12,8,0] with the Loop marker before
        // the first value and Exit after the second.
        assert_eq!(u16::from_le_bytes([bytes[first], bytes[first + 1]]), 0);
        assert_eq!(bytes[first + 2], 0); // volume loop
        assert_eq!(bytes[first + 3], 2); // volume exit
        assert_eq!(bytes[first + 4], 4); // volume length
        let volume_offset =
            u16::from_le_bytes([bytes[first + 8], bytes[first + 9]]) as usize;
        assert_eq!(
            &bytes[first + volume_offset..first + volume_offset + 4],
            &[16, 12, 8, 0]
        );
    }

    #[test]
    fn test_pcm_mapping_roundtrip_position() {
        let song = sample_song();
        let bytes = song.encode();
        // mapping entry 48 sits at header(24) + 48*2
        let at = 24 + 48 * 2;
        assert_eq!(u16::from_le_bytes([bytes[at], bytes[at + 1]]), 1);
    }
}
