//! Playback Engine
//!
//! The frame-accurate state machine that walks a song's instructions. Each
//! iteration renders one 608-sample frame: tick counters advance by 256
//! units, due rows execute (effect first, then note), the frame is handed to
//! the sink's sample hook, envelopes and pending actions and bends advance,
//! and the sink's committed hook fires. Rendering is a pure function of
//! (song, loop count, sequence, banks); the song is never mutated and all
//! working state lives in a fresh [`Player`] and [`Channel`] set per render.

pub mod channel;

pub use channel::{Channel, PendingAction, PendingKind, VoiceEvent, VoiceSource, VoiceState};

use crate::banks::PcmBank;
use crate::song::instruction::{
    Instruction, CMD_BEND_NOW, CMD_CONTINUE, CMD_DELAY_OFF, CMD_END, CMD_INSTRUMENT_OFF,
    CMD_INSTRUMENT_PCM, CMD_VOLUME_OFF, EFFECT_COMMAND, EFFECT_SET_DELAY, EFFECT_SET_INSTRUMENT,
    EFFECT_SET_TEMPO, EFFECT_SET_VOLUME, EFFECT_START_BEND, NOTE_CONTINUE, NOTE_END,
    NOTE_FIRST_PITCH, NOTE_OFF, NOTE_STOP_PCM,
};
use crate::song::Song;
use crate::tables::{BEND_TABLE, TEMPO_TABLE, TICK_UNITS_PER_FRAME, WAVE_PCM};
use crate::{GvsongError, Result};

/// Global transport state for one render.
#[derive(Debug, Clone)]
pub struct Player {
    /// Current tempo table index.
    pub tempo_index: usize,
    /// Tick length of one 16th note at the current tempo, in 256ths of a
    /// frame.
    pub tick_start: i64,
    /// Countdown to the next row, in 256ths of a frame.
    pub tick_left: i64,
    /// Countdown to the next 16th-note boundary.
    pub tick_16th_left: i64,
    /// 16th notes elapsed since the render started.
    pub total_16th: u64,
    /// Position within the play sequence.
    pub seq_index: usize,
    /// Pattern currently executing.
    pub pat_index: usize,
    /// Row within the current pattern.
    pub row_index: usize,
    /// Whole-song loop passes still owed.
    pub loops_left: i64,
    /// Set when the sequence is exhausted; rows stop and the fade begins.
    pub finished: bool,
    /// End-of-song fade multiplier, ×0.9 per frame once finished.
    pub fade: f64,
}

/// Frame hooks a render sink implements.
///
/// `on_frame_sample` fires before envelopes and pending actions advance; the
/// waveform adapter samples the frame here (and advances oscillator phase).
/// `on_frame_committed` fires after the advance step; the visualization
/// adapter reads transport position and the per-channel event log here. The
/// engine clears every channel's event log after the committed hook returns.
pub trait FrameSink {
    /// Called once per frame with this frame's instantaneous state.
    fn on_frame_sample(&mut self, player: &Player, channels: &mut [Channel]);
    /// Called once per frame after envelopes, pending actions, and bends
    /// advanced.
    fn on_frame_committed(&mut self, player: &Player, channels: &[Channel]);
}

fn note_on(chan: &mut Channel, song: &Song, pcm: Option<&PcmBank>, note: u8, immediately: bool) {
    if !immediately && chan.delay > 0 {
        chan.pending.push_back(PendingAction {
            frames_left: chan.delay,
            kind: PendingKind::NoteOn { note },
        });
        return;
    }
    if chan.source == VoiceSource::Pcm {
        if note == NOTE_STOP_PCM {
            if chan.state != VoiceState::Off {
                chan.events.push(VoiceEvent::Off);
                chan.state = VoiceState::Off;
            }
            return;
        }
        let slot = song.pcm_mapping[(note - NOTE_FIRST_PITCH) as usize] as usize;
        // A silent sample slot gates the note-on. Without a PCM bank (the
        // visualization walk) only the canonical silence slot 0 gates.
        let silent = match pcm {
            Some(bank) => bank.is_silent_slot(slot),
            None => slot == 0,
        };
        if silent {
            return;
        }
        chan.pcm_slot = slot;
    } else if note == NOTE_STOP_PCM {
        // reserved outside PCM mode
        return;
    }
    chan.events.push(VoiceEvent::On);
    chan.state = VoiceState::On;
    chan.phase = 0.0;
    chan.env_volume_index = 0;
    chan.env_pitch_index = 0;
    chan.base_pitch = (note as i32) << 4;
    chan.note_on_pitch = (note as i32) << 4;
    chan.target_pitch = (note as i32) << 4;
}

fn note_off(chan: &mut Channel, immediately: bool) {
    if !immediately && chan.delay > 0 {
        chan.pending.push_back(PendingAction {
            frames_left: chan.delay,
            kind: PendingKind::NoteOff,
        });
        return;
    }
    if chan.state == VoiceState::On {
        chan.events.push(VoiceEvent::Release);
        chan.state = VoiceState::Release;
    }
}

fn set_bend(chan: &mut Channel, tempo_index: usize, duration: u32, note: u8, immediately: bool) {
    if !immediately && chan.delay > 0 {
        chan.pending.push_back(PendingAction {
            frames_left: chan.delay,
            kind: PendingKind::Bend { duration, note },
        });
        return;
    }
    chan.target_pitch = (note as i32) << 4;
    if duration == 0 {
        chan.base_pitch = chan.target_pitch;
        return;
    }
    let dpitch_abs = ((chan.target_pitch - chan.base_pitch).abs() >> 4) as usize;
    if dpitch_abs == 0 {
        chan.target_pitch = chan.base_pitch;
        return;
    }
    chan.bend_counter = 0;
    chan.bend_counter_max =
        duration * BEND_TABLE[tempo_index % 64][(dpitch_abs - 1).min(127)] as u32;
}

/// Render a song through a frame sink.
///
/// `loop_count` is the number of passes over the sequence's loop region; 0
/// executes no rows and renders only the end-of-song fade. `sequence`
/// selects the play sequence. The PCM bank drives note-on gating
/// and sample exhaustion; pass `None` for structural walks that carry no
/// audio (gating then falls back to slot 0).
pub fn render(
    song: &Song,
    loop_count: u32,
    sequence: usize,
    pcm: Option<&PcmBank>,
    sink: &mut dyn FrameSink,
) -> Result<()> {
    let seq = song
        .sequences()
        .get(sequence)
        .ok_or_else(|| GvsongError::Render(format!("invalid sequence: {}", sequence)))?;
    let first_pattern = seq
        .patterns
        .first()
        .ok_or_else(|| GvsongError::Render(format!("sequence {} has no patterns", sequence)))?;

    let mut channels: Vec<Channel> = (0..song.channel_count()).map(|_| Channel::new()).collect();
    let mut player = Player {
        tempo_index: 0,
        tick_start: TEMPO_TABLE[0].start as i64,
        tick_left: 0,
        tick_16th_left: 0,
        total_16th: 0,
        seq_index: 0,
        pat_index: *first_pattern as usize,
        row_index: 0,
        loops_left: loop_count as i64 - 1,
        finished: loop_count == 0,
        fade: 1.0,
    };

    loop {
        // advance tick counters by one frame
        player.tick_left -= TICK_UNITS_PER_FRAME;
        player.tick_16th_left -= TICK_UNITS_PER_FRAME;
        while player.tick_left <= 0 && !player.finished {
            // execute one row
            let pattern = song
                .patterns()
                .get(player.pat_index)
                .ok_or_else(|| {
                    GvsongError::Render(format!("invalid pattern index: {}", player.pat_index))
                })?;
            let line = pattern.lines.get(player.row_index).ok_or_else(|| {
                GvsongError::Render(format!(
                    "pattern {} has no row {}",
                    player.pat_index, player.row_index
                ))
            })?;
            let mut end_flag = false;
            for ch in 0..channels.len() {
                let word = line.instructions.get(ch).copied().unwrap_or(0);
                let inst = Instruction::decode(word);
                let chan = &mut channels[ch];

                // effect first
                let mut did_bend = false;
                match inst.effect {
                    EFFECT_COMMAND => match inst.payload {
                        CMD_CONTINUE => {}
                        CMD_VOLUME_OFF => chan.chan_volume = 0.0,
                        CMD_DELAY_OFF => chan.delay = 0,
                        CMD_BEND_NOW => {
                            set_bend(chan, player.tempo_index, 0, inst.note, false);
                            did_bend = true;
                        }
                        CMD_INSTRUMENT_OFF => chan.reset_voice(VoiceSource::Silent),
                        CMD_INSTRUMENT_PCM => chan.reset_voice(VoiceSource::Pcm),
                        CMD_END => end_flag = true,
                        _ => {} // malformed data
                    },
                    EFFECT_SET_VOLUME => chan.chan_volume = (inst.payload as f64 + 1.0) / 64.0,
                    EFFECT_SET_DELAY => chan.delay = inst.payload as u32 + 1,
                    EFFECT_START_BEND => {
                        set_bend(
                            chan,
                            player.tempo_index,
                            inst.payload as u32 + 1,
                            inst.note,
                            false,
                        );
                        did_bend = true;
                    }
                    EFFECT_SET_INSTRUMENT => {
                        // An instrument whose wave id is the PCM passthrough
                        // selects PCM playback directly.
                        let source = match song.instruments().get(inst.payload as usize) {
                            Some(i) if i.wave == WAVE_PCM => VoiceSource::Pcm,
                            Some(_) => VoiceSource::Instrument(inst.payload as usize),
                            None => VoiceSource::Silent, // malformed data
                        };
                        chan.reset_voice(source);
                    }
                    EFFECT_SET_TEMPO => {
                        player.tempo_index = inst.payload as usize;
                        player.tick_start = TEMPO_TABLE[player.tempo_index % 64].start as i64;
                        player.tick_left = 0;
                        player.tick_16th_left = 0;
                    }
                    _ => {} // malformed data
                }

                // then the note, unless this instruction started a bend
                if !did_bend {
                    match inst.note {
                        NOTE_CONTINUE => {}
                        NOTE_OFF => note_off(chan, false),
                        NOTE_END => end_flag = true,
                        3..=6 => {} // reserved
                        _ => note_on(chan, song, pcm, inst.note, false),
                    }
                }
            }

            let wait = line.wait;
            player.row_index += 1;
            if end_flag {
                // end of pattern: advance the sequence
                player.seq_index += 1;
                if player.loops_left > 0 && player.seq_index >= seq.exit_index as usize {
                    player.seq_index = seq.loop_index as usize;
                    player.loops_left -= 1;
                }
                match seq.patterns.get(player.seq_index) {
                    Some(&p) => {
                        player.pat_index = p as usize;
                        player.row_index = 0;
                    }
                    None => {
                        // sequence exhausted: release everything and fade
                        player.finished = true;
                        for chan in channels.iter_mut() {
                            if chan.state == VoiceState::On {
                                chan.events.push(VoiceEvent::Release);
                                chan.state = VoiceState::Release;
                            }
                        }
                    }
                }
            }
            player.tick_left += wait as i64 * player.tick_start;
        }
        if player.tick_16th_left <= 0 {
            player.tick_16th_left += player.tick_start;
            player.total_16th += 1;
        }

        sink.on_frame_sample(&player, &mut channels);

        for chan in channels.iter_mut() {
            // advance envelopes
            if chan.state != VoiceState::Off {
                if let VoiceSource::Instrument(i) = chan.source {
                    if let Some(inst) = song.instruments().get(i) {
                        if chan.state == VoiceState::Release {
                            chan.env_volume_index += 1;
                            if chan.env_volume_index >= inst.volume.len() {
                                chan.events.push(VoiceEvent::Off);
                                chan.state = VoiceState::Off;
                            } else if chan.env_pitch_index + 1 < inst.pitch.len() {
                                chan.env_pitch_index += 1;
                            }
                        } else {
                            chan.env_volume_index += 1;
                            if chan.env_volume_index >= inst.volume.exit_index() as usize {
                                chan.env_volume_index = inst.volume.loop_index() as usize;
                            }
                            chan.env_pitch_index += 1;
                            if chan.env_pitch_index >= inst.pitch.exit_index() as usize {
                                chan.env_pitch_index = inst.pitch.loop_index() as usize;
                            }
                        }
                    }
                }
            }

            // PCM exhaustion
            if chan.state != VoiceState::Off && chan.source == VoiceSource::Pcm {
                if let Some(bank) = pcm {
                    let size = bank.slot(chan.pcm_slot).map_or(0, |s| s.size);
                    if chan.phase as usize >= size {
                        chan.events.push(VoiceEvent::Off);
                        chan.state = VoiceState::Off;
                    }
                }
            }

            // resolve pending actions in FIFO order
            let due = chan.pending.len();
            for _ in 0..due {
                if let Some(mut action) = chan.pending.pop_front() {
                    action.frames_left -= 1;
                    if action.frames_left > 0 {
                        chan.pending.push_back(action);
                        continue;
                    }
                    match action.kind {
                        PendingKind::NoteOn { note } => note_on(chan, song, pcm, note, true),
                        PendingKind::NoteOff => note_off(chan, true),
                        PendingKind::Bend { duration, note } => {
                            set_bend(chan, player.tempo_index, duration, note, true)
                        }
                    }
                }
            }

            // advance an active bend
            if chan.base_pitch != chan.target_pitch {
                if chan.bend_counter_max == 0 {
                    // malformed data; snap instead of spinning
                    chan.base_pitch = chan.target_pitch;
                } else {
                    chan.bend_counter += 65536;
                    while chan.bend_counter >= chan.bend_counter_max {
                        chan.bend_counter -= chan.bend_counter_max;
                        if chan.base_pitch < chan.target_pitch {
                            chan.base_pitch += 1;
                        } else {
                            chan.base_pitch -= 1;
                        }
                        if chan.base_pitch == chan.target_pitch {
                            break;
                        }
                    }
                }
            }
        }

        sink.on_frame_committed(&player, &channels);
        for chan in channels.iter_mut() {
            chan.events.clear();
        }

        if player.finished {
            player.fade *= 0.9;
            if player.fade < 0.001 {
                return Ok(());
            }
        }
    }
}
