//! Externally supplied sample banks
//!
//! The playback engine does not generate its own oscillator or PCM data. It
//! samples two precomputed read-only blobs supplied at render time:
//!
//! - A wavetable of band-limited oscillators: 11 waveform families × 11
//!   low-pass tiers × 2048 phase entries, followed by 32768 noise samples.
//! - A PCM bank: per-sample `{offset, size}` metadata plus a flat data array,
//!   with every size a multiple of the 608-sample frame length. A sample with
//!   size 0 is the designated silence slot and suppresses note-on.
//!
//! Both hold normalized values in the [-1, 1] range before quantization.

use crate::tables::{FRAME_SAMPLES, LOWPASS_TIERS, NOISE_SAMPLES, OSC_FAMILIES, OSC_PHASE};
use crate::{GvsongError, Result};

/// Total `f32` entries expected in a wavetable blob.
pub const WAVE_TABLE_LEN: usize = OSC_FAMILIES * LOWPASS_TIERS * OSC_PHASE + NOISE_SAMPLES;

/// Band-limited oscillator wavetable plus the trailing noise block.
#[derive(Debug, Clone)]
pub struct WaveTable {
    samples: Vec<f32>,
}

impl WaveTable {
    /// Wrap a precomputed wavetable blob, validating its shape.
    pub fn from_samples(samples: Vec<f32>) -> Result<Self> {
        if samples.len() != WAVE_TABLE_LEN {
            return Err(GvsongError::Config(format!(
                "wavetable must hold exactly {} samples, got {}",
                WAVE_TABLE_LEN,
                samples.len()
            )));
        }
        Ok(WaveTable { samples })
    }

    /// Sample one oscillator family at a low-pass tier and integer phase.
    ///
    /// `family` must be below [`OSC_FAMILIES`], `tier` below
    /// [`LOWPASS_TIERS`], and `phase` below [`OSC_PHASE`].
    #[inline]
    pub fn oscillator(&self, family: usize, tier: usize, phase: usize) -> f32 {
        self.samples[OSC_PHASE * (LOWPASS_TIERS * family + tier) + phase]
    }

    /// Sample the noise block. `phase` spans 2^22 and is indexed with a
    /// 7-bit shift, giving 32768 distinct values.
    #[inline]
    pub fn noise(&self, phase: u32) -> f32 {
        self.samples[OSC_FAMILIES * LOWPASS_TIERS * OSC_PHASE + (phase >> 7) as usize]
    }
}

/// Metadata for one PCM sample slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSampleInfo {
    /// Start index into the PCM data array.
    pub offset: usize,
    /// Sample length; always a multiple of the frame length, 0 for silence.
    pub size: usize,
}

/// PCM sample bank: slot metadata plus a flat normalized data array.
#[derive(Debug, Clone, Default)]
pub struct PcmBank {
    meta: Vec<PcmSampleInfo>,
    data: Vec<f32>,
}

impl PcmBank {
    /// Build a PCM bank, validating slot metadata against the data array.
    pub fn new(meta: Vec<PcmSampleInfo>, data: Vec<f32>) -> Result<Self> {
        for (slot, info) in meta.iter().enumerate() {
            if info.size % FRAME_SAMPLES != 0 {
                return Err(GvsongError::Config(format!(
                    "PCM slot {}: size {} is not a multiple of {}",
                    slot, info.size, FRAME_SAMPLES
                )));
            }
            if info.offset + info.size > data.len() {
                return Err(GvsongError::Config(format!(
                    "PCM slot {}: {}+{} runs past {} data samples",
                    slot,
                    info.offset,
                    info.size,
                    data.len()
                )));
            }
        }
        Ok(PcmBank { meta, data })
    }

    /// The canonical bank holding only the silence slot.
    pub fn silence() -> Self {
        PcmBank {
            meta: vec![PcmSampleInfo { offset: 0, size: 0 }],
            data: Vec::new(),
        }
    }

    /// Number of sample slots, including the silence slot.
    pub fn slot_count(&self) -> usize {
        self.meta.len()
    }

    /// Metadata for one slot, if it exists.
    pub fn slot(&self, index: usize) -> Option<PcmSampleInfo> {
        self.meta.get(index).copied()
    }

    /// True when the slot is missing or holds no data.
    pub fn is_silent_slot(&self, index: usize) -> bool {
        self.slot(index).map_or(true, |info| info.size == 0)
    }

    /// Flat normalized sample data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Everything the waveform adapter needs to turn channel state into audio.
#[derive(Debug, Clone)]
pub struct SoundBanks {
    /// Oscillator wavetable.
    pub waves: WaveTable,
    /// PCM sample bank.
    pub pcm: PcmBank,
}
