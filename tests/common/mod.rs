//! Shared fixtures for integration tests.

use gvsong::banks::WAVE_TABLE_LEN;
use gvsong::tables::{FRAME_SAMPLES, LOWPASS_TIERS, NOISE_SAMPLES, OSC_FAMILIES, OSC_PHASE};
use gvsong::{ListToken, PcmBank, PcmSampleInfo, Song, SoundBanks, WaveTable};

/// A wavetable where every oscillator family is a half-amplitude square wave
/// and the noise block is a small alternating pattern.
pub fn square_wave_table() -> WaveTable {
    let mut samples = Vec::with_capacity(WAVE_TABLE_LEN);
    for _family in 0..OSC_FAMILIES {
        for _tier in 0..LOWPASS_TIERS {
            for phase in 0..OSC_PHASE {
                samples.push(if phase < OSC_PHASE / 2 { 0.5 } else { -0.5 });
            }
        }
    }
    for i in 0..NOISE_SAMPLES {
        samples.push(if i % 2 == 0 { 0.25 } else { -0.25 });
    }
    WaveTable::from_samples(samples).unwrap()
}

/// A PCM bank with the silence slot plus one constant-amplitude sample
/// spanning `frames` frames.
pub fn constant_pcm_bank(frames: usize, amplitude: f32) -> PcmBank {
    let size = frames * FRAME_SAMPLES;
    PcmBank::new(
        vec![
            PcmSampleInfo { offset: 0, size: 0 },
            PcmSampleInfo { offset: 0, size },
        ],
        vec![amplitude; size],
    )
    .unwrap()
}

/// Sound banks for tests that do not exercise PCM.
pub fn square_banks() -> SoundBanks {
    SoundBanks {
        waves: square_wave_table(),
        pcm: PcmBank::silence(),
    }
}

/// A one-channel song with one square-wave instrument (held volume 16,
/// two-beat release to 0) playing the given pattern texts in one sequence.
pub fn one_channel_song(patterns: &[&str]) -> Song {
    use ListToken::{Exit, Loop, Value};
    let mut song = Song::new(1).unwrap();
    song.add_instrument(
        0,
        &[Loop, Value(16), Value(16), Value(16), Exit, Value(0)],
        &[Value(0)],
    )
    .unwrap();
    song.set_patterns(patterns).unwrap();
    let sequence: Vec<ListToken<u16>> = (0..patterns.len() as u16).map(Value).collect();
    song.set_sequences(&[&sequence[..]]).unwrap();
    song
}
