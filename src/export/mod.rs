//! Waveform adapter
//!
//! Consumes the playback engine's sample hook and turns per-channel voice
//! state into 16-bit audio. Channels mix by summation in f64, one 608-sample
//! frame at a time; oscillator phase advances per output sample (modulo 2048,
//! or modulo 2^22 for noise), PCM phase advances per output sample with no
//! wraparound. Each mixed sample quantizes as
//! `round(sum * (sum < 0 ? 32768 : 32767))` clamped to i16. A non-finite
//! sample becomes 0 and is counted; valid songs never produce one, so the
//! count is surfaced as a warning after the render.

pub mod wav;

pub use wav::write_wav;

use crate::banks::SoundBanks;
use crate::player::{Channel, FrameSink, Player, VoiceSource, VoiceState};
use crate::song::Song;
use crate::tables::{
    note_frequency, FRAME_SAMPLES, LOWPASS_INDEX_TABLE, NOISE_PHASE_SPAN, OSC_FAMILIES, OSC_PHASE,
    WAVE_NOISE,
};

/// Quantize one mixed f64 sample to 16-bit PCM. `None` flags a non-finite
/// input (the observability case).
#[inline]
pub fn quantize(sum: f64) -> Option<i16> {
    if !sum.is_finite() {
        return None;
    }
    let scale = if sum < 0.0 { 32768.0 } else { 32767.0 };
    Some((sum * scale).round().clamp(-32768.0, 32767.0) as i16)
}

/// [`FrameSink`] that renders audio samples.
pub struct WaveRenderer<'a> {
    song: &'a Song,
    banks: &'a SoundBanks,
    samples: Vec<i16>,
    nan_count: u64,
}

impl<'a> WaveRenderer<'a> {
    /// A renderer over a song and its sound banks.
    pub fn new(song: &'a Song, banks: &'a SoundBanks) -> Self {
        WaveRenderer {
            song,
            banks,
            samples: Vec::new(),
            nan_count: 0,
        }
    }

    /// Finish the render, reporting any non-finite samples, and take the
    /// sample buffer.
    pub fn finish(self) -> Vec<i16> {
        if self.nan_count > 0 {
            eprintln!(
                "Warning: {} non-finite samples replaced with 0",
                self.nan_count
            );
        }
        self.samples
    }

    fn mix_channel(&self, chan: &mut Channel, fade: f64, output: &mut [f64; FRAME_SAMPLES]) {
        match chan.source {
            VoiceSource::Silent => {}
            VoiceSource::Pcm => {
                let Some(info) = self.banks.pcm.slot(chan.pcm_slot) else {
                    return;
                };
                let data = self.banks.pcm.data();
                let volume = fade * chan.chan_volume;
                for out in output.iter_mut() {
                    let at = chan.phase as usize;
                    if at >= info.size {
                        break;
                    }
                    *out += volume * data[info.offset + at] as f64;
                    chan.phase += 1.0;
                }
            }
            VoiceSource::Instrument(index) => {
                let Some(inst) = self.song.instruments().get(index) else {
                    return;
                };
                // A decoded wave id past the table space poisons the frame
                // like any other hostile index.
                if inst.wave != WAVE_NOISE && inst.wave as usize >= OSC_FAMILIES {
                    for out in output.iter_mut() {
                        *out += f64::NAN;
                    }
                    return;
                }
                // Out-of-range envelope cursors poison the frame with NaN,
                // the same signal malformed data produces downstream.
                let env_volume = inst
                    .volume
                    .values()
                    .get(chan.env_volume_index)
                    .map_or(f64::NAN, |&v| v as f64);
                let env_pitch = inst
                    .pitch
                    .values()
                    .get(chan.env_pitch_index)
                    .map_or(f64::NAN, |&v| v as f64);
                let final_volume = fade * chan.chan_volume * env_volume / 16.0;
                let final_pitch = chan.base_pitch as f64 + env_pitch;
                if !final_pitch.is_finite() {
                    for out in output.iter_mut() {
                        *out += f64::NAN;
                    }
                    return;
                }
                let freq = note_frequency(final_pitch);
                let dphase = freq * OSC_PHASE as f64 / 32768.0;
                if inst.wave == WAVE_NOISE {
                    for out in output.iter_mut() {
                        let w = self.banks.waves.noise(chan.phase as u32) as f64;
                        *out += final_volume * w;
                        chan.phase = (chan.phase + dphase) % NOISE_PHASE_SPAN as f64;
                    }
                } else {
                    let semitone = (final_pitch / 16.0).floor();
                    let Some(&tier) = (semitone >= 0.0)
                        .then(|| LOWPASS_INDEX_TABLE.get(semitone as usize))
                        .flatten()
                    else {
                        for out in output.iter_mut() {
                            *out += f64::NAN;
                        }
                        return;
                    };
                    let family = inst.wave as usize;
                    for out in output.iter_mut() {
                        let w = self
                            .banks
                            .waves
                            .oscillator(family, tier as usize, chan.phase as usize)
                            as f64;
                        *out += final_volume * w;
                        chan.phase = (chan.phase + dphase) % OSC_PHASE as f64;
                    }
                }
            }
        }
    }
}

impl FrameSink for WaveRenderer<'_> {
    fn on_frame_sample(&mut self, player: &Player, channels: &mut [Channel]) {
        let mut output = [0.0f64; FRAME_SAMPLES];
        for chan in channels.iter_mut() {
            if chan.state == VoiceState::Off {
                continue;
            }
            self.mix_channel(chan, player.fade, &mut output);
        }
        for sum in output {
            match quantize(sum) {
                Some(v) => self.samples.push(v),
                None => {
                    self.nan_count += 1;
                    self.samples.push(0);
                }
            }
        }
    }

    fn on_frame_committed(&mut self, _player: &Player, _channels: &[Channel]) {}
}
