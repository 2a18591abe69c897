//! Instruction Set Definitions
//!
//! Fixed lookup tables shared by every song, derived once from closed-form
//! math against the hardware constants: a 32768 Hz sample clock and 608
//! samples per video frame. All tables are `const`-evaluated so they exist as
//! immutable shared data for the lifetime of the process.
//!
//! - Tempo table: maps the 6-bit tempo effect payload to the tick length of a
//!   16th note, in 256ths of a frame.
//! - Bend timing table: per tempo and per pitch distance, the accumulator
//!   threshold that paces a pitch bend across 16th notes.
//! - Low-pass index table: maps a semitone to the band-limited oscillator
//!   tier sampled by the waveform adapter.

/// Output sample rate in Hz. The engine renders at exactly this rate.
pub const SAMPLE_RATE: u32 = 32768;

/// Samples per video frame, the engine's base time quantum.
pub const FRAME_SAMPLES: usize = 608;

/// Tick units consumed per frame (waits are counted in 256ths of a tick).
pub const TICK_UNITS_PER_FRAME: i64 = 256;

/// Phase span of one oscillator waveform (2^11 entries).
pub const OSC_PHASE: usize = 2048;

/// Number of oscillator waveform families (8 square duties, tri, saw, sine).
pub const OSC_FAMILIES: usize = 11;

/// Number of band-limited low-pass tiers per oscillator family.
pub const LOWPASS_TIERS: usize = 11;

/// Number of noise samples in the wavetable (2^15).
pub const NOISE_SAMPLES: usize = 1 << 15;

/// Phase span of the noise generator (2^22, indexed with a 7-bit shift).
pub const NOISE_PHASE_SPAN: u32 = 1 << 22;

/// Wave id selecting the noise generator instead of an oscillator family.
pub const WAVE_NOISE: u16 = 11;

/// Wave id selecting PCM passthrough instead of an oscillator family.
pub const WAVE_PCM: u16 = 12;

/// One tempo table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoEntry {
    /// Length of one 16th note in 256ths of a frame.
    pub start: u16,
}

impl TempoEntry {
    /// The tempo this entry actually represents after integer rounding of
    /// `start`, in BPM-like units. This is the value nearest-tempo lookup
    /// compares against, not the ideal `(i+18)*10/4`.
    pub fn tempo(&self) -> f64 {
        TEMPO_NUMERATOR as f64 / (9728.0 * self.start as f64)
    }
}

/// `32768 * 60 * 256`, the shared numerator of the tempo formulas.
const TEMPO_NUMERATOR: u64 = 32768 * 60 * 256;

const fn tempo_start(index: usize) -> u16 {
    // start = round(32768*60*256 / (608*16*ideal)) with ideal = (i+18)*10/4.
    // Scaling numerator and denominator by 4 keeps the math integral:
    // round(a/b) = (a + b/2) / b for positive integers.
    let a = TEMPO_NUMERATOR * 4;
    let b = 608 * 16 * 10 * (index as u64 + 18);
    ((a + b / 2) / b) as u16
}

const fn build_tempo_table() -> [TempoEntry; 64] {
    let mut table = [TempoEntry { start: 0 }; 64];
    let mut i = 0;
    while i < 64 {
        table[i] = TempoEntry {
            start: tempo_start(i),
        };
        i += 1;
    }
    table
}

/// Tempo table indexed by the 6-bit tempo effect payload.
pub const TEMPO_TABLE: [TempoEntry; 64] = build_tempo_table();

const fn build_bend_table() -> [[u16; 128]; 64] {
    let mut table = [[0u16; 128]; 64];
    let mut t = 0;
    while t < 64 {
        let start = TEMPO_TABLE[t].start as u32;
        let mut d = 1;
        while d <= 128 {
            // floor(65536 * (start/256) / (d*16)) simplifies to floor(16*start/d).
            let max = 16 * start / d;
            assert!(max < 65536, "bend table overflow");
            table[t][(d - 1) as usize] = max as u16;
            d += 1;
        }
        t += 1;
    }
    table
}

/// Bend pacing table: `BEND_TABLE[tempo][distance-1]` is the per-16th-note
/// accumulator threshold for a bend spanning `distance` 1/16-semitone units.
pub const BEND_TABLE: [[u16; 128]; 64] = build_bend_table();

/// Low-pass tier per semitone. Higher pitches use more aggressively
/// band-limited oscillator tables to stay below the Nyquist limit.
#[rustfmt::skip]
pub const LOWPASS_INDEX_TABLE: [u8; 128] = [
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2,
     2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4,
     4, 5, 5, 5, 5, 5, 5, 5, 5, 5, 6, 6, 6, 6, 6, 6,
     7, 7, 7, 7, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9,10,10,
    10,10,10,10,10,10,10,10,10,10,10,10,10,10,10,10,
    10,10,10,10,10,10,10,10,10,10,10,10,10,10,10,10,
    10,10,10,10,10,10,10,10,10,10,10,10,10,10,10,10,
];

/// Find the tempo table index whose represented tempo is nearest to `bpm`.
///
/// Used when compiling a human-specified tempo (45-202 BPM) into the 6-bit
/// payload of a set-tempo effect. Ties keep the lowest index.
pub fn nearest_tempo_index(bpm: f64) -> usize {
    let mut best = 0;
    for (i, entry) in TEMPO_TABLE.iter().enumerate() {
        if (entry.tempo() - bpm).abs() < (TEMPO_TABLE[best].tempo() - bpm).abs() {
            best = i;
        }
    }
    best
}

/// Convert a pitch in 1/16-semitone units to a frequency in Hz.
///
/// Pitch 65*16 (A-5 in the note table) maps to 440 Hz.
pub fn note_frequency(pitch: f64) -> f64 {
    440.0 * ((pitch / 16.0 - 65.0) / 12.0).exp2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tempo_table_endpoints() {
        // Ideal tempo 45 BPM -> round(503316480 / (9728*45)) = 1150
        assert_eq!(TEMPO_TABLE[0].start, 1150);
        // Ideal tempo 202.5 BPM -> round(255.5) = 256
        assert_eq!(TEMPO_TABLE[63].start, 256);
    }

    #[test]
    fn test_tempo_table_strictly_decreasing() {
        // Faster tempo means shorter ticks; every index must differ.
        for i in 1..64 {
            assert!(
                TEMPO_TABLE[i].start < TEMPO_TABLE[i - 1].start,
                "tempo table not strictly decreasing at index {}: {} >= {}",
                i,
                TEMPO_TABLE[i].start,
                TEMPO_TABLE[i - 1].start
            );
        }
    }

    #[test]
    fn test_tempo_value_reflects_rounding() {
        // Entry 0 represents slightly under 45 BPM because start rounds up.
        assert_relative_eq!(
            TEMPO_TABLE[0].tempo(),
            503316480.0 / (9728.0 * 1150.0),
            epsilon = 1e-9
        );
        assert!(TEMPO_TABLE[0].tempo() < 45.0);
    }

    #[test]
    fn test_nearest_tempo_index() {
        assert_eq!(nearest_tempo_index(45.0), 0);
        assert_eq!(nearest_tempo_index(202.0), 63);
        // 120 BPM sits between ideal entries 29 (117.5) and 30 (120.0).
        assert_eq!(nearest_tempo_index(120.0), 30);
    }

    #[test]
    fn test_bend_table_spot_values() {
        // floor(16 * 1150 / 1) at the slowest tempo, distance 1.
        assert_eq!(BEND_TABLE[0][0], 18400);
        // floor(16 * 256 / 128) at the fastest tempo, widest distance.
        assert_eq!(BEND_TABLE[63][127], 32);
    }

    #[test]
    fn test_bend_table_decreases_with_distance() {
        for t in 0..64 {
            for d in 1..128 {
                assert!(
                    BEND_TABLE[t][d] <= BEND_TABLE[t][d - 1],
                    "bend threshold must shrink as pitch distance grows"
                );
            }
        }
    }

    #[test]
    fn test_lowpass_table_shape() {
        assert_eq!(LOWPASS_INDEX_TABLE.len(), 128);
        assert!(LOWPASS_INDEX_TABLE.iter().all(|&lp| lp < LOWPASS_TIERS as u8));
        for i in 1..128 {
            assert!(LOWPASS_INDEX_TABLE[i] >= LOWPASS_INDEX_TABLE[i - 1]);
        }
    }

    #[test]
    fn test_note_frequency_reference_pitch() {
        assert_relative_eq!(note_frequency(65.0 * 16.0), 440.0, epsilon = 1e-9);
        // One octave up doubles the frequency.
        assert_relative_eq!(note_frequency(77.0 * 16.0), 880.0, epsilon = 1e-9);
    }
}
