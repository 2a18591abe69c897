//! Visualization event adapter
//!
//! Walks the playback engine without producing audio and accumulates a
//! frame-accurate event stream for external pitch-roll renderers: one x unit
//! per frame, per-channel note traces, 16th-note grid positions, and
//! per-pattern horizontal spans. Everything serializes with serde so the
//! stream can be handed to another process as JSON.

use crate::player::{Channel, FrameSink, Player, VoiceEvent, VoiceSource, VoiceState};
use crate::song::Song;
use serde::{Deserialize, Serialize};

/// What a traced voice was sampling from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceSource {
    /// PCM sample playback.
    Pcm,
    /// An instrument by index.
    Instrument(u8),
}

/// One frame of one channel's voice, in pitch-roll coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteTrace {
    /// Frame index since the render started.
    pub x: u32,
    /// Channel the trace belongs to.
    pub channel: u8,
    /// Voice source.
    pub source: TraceSource,
    /// Pitch in 1/16 semitones: the raw note-on pitch, or bend- and
    /// envelope-resolved when the walk requested bends.
    pub pitch: i32,
    /// Volume 0-16: constant 16, or envelope-resolved when requested.
    pub volume: i32,
    /// True on the frame a note started.
    pub note_on: bool,
}

/// Horizontal span one pattern occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSpan {
    /// Pattern index.
    pub pattern: u16,
    /// First frame of the span.
    pub x: u32,
    /// Span width in frames.
    pub width: u32,
}

/// The collected event stream of one visualization walk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationEvents {
    /// Per-channel, per-frame note traces.
    pub traces: Vec<NoteTrace>,
    /// Frame positions of 16th-note boundaries.
    pub grid_16ths: Vec<u32>,
    /// Horizontal pattern spans, in play order.
    pub pattern_spans: Vec<PatternSpan>,
}

/// [`FrameSink`] that collects visualization events.
pub struct VizCollector<'a> {
    song: &'a Song,
    channels: Vec<usize>,
    draw_bends: bool,
    draw_volume: bool,
    states: Vec<VoiceState>,
    events: VisualizationEvents,
    x: u32,
    last_16th: Option<u64>,
}

impl<'a> VizCollector<'a> {
    /// A collector for the requested channels; out-of-range channel indices
    /// are ignored.
    pub fn new(song: &'a Song, channels: &[usize], draw_bends: bool, draw_volume: bool) -> Self {
        let channel_count = song.channel_count() as usize;
        VizCollector {
            song,
            channels: channels
                .iter()
                .copied()
                .filter(|&ch| ch < channel_count)
                .collect(),
            draw_bends,
            draw_volume,
            states: vec![VoiceState::Off; channel_count],
            events: VisualizationEvents::default(),
            x: 0,
            last_16th: None,
        }
    }

    /// Take the collected events.
    pub fn finish(self) -> VisualizationEvents {
        self.events
    }
}

impl FrameSink for VizCollector<'_> {
    fn on_frame_sample(&mut self, _player: &Player, _channels: &mut [Channel]) {}

    fn on_frame_committed(&mut self, player: &Player, channels: &[Channel]) {
        if self.last_16th != Some(player.total_16th) {
            self.last_16th = Some(player.total_16th);
            self.events.grid_16ths.push(self.x);
        }
        if player.finished {
            return;
        }

        let pattern = player.pat_index as u16;
        let extends = self
            .events
            .pattern_spans
            .last()
            .map_or(false, |span| span.pattern == pattern);
        if extends {
            if let Some(span) = self.events.pattern_spans.last_mut() {
                span.width += 1;
            }
        } else {
            self.events.pattern_spans.push(PatternSpan {
                pattern,
                x: self.x,
                width: 1,
            });
        }

        for &ch in &self.channels {
            let chan = &channels[ch];
            let mut note_on = false;
            for &event in &chan.events {
                note_on = note_on || event == VoiceEvent::On;
                self.states[ch] = match event {
                    VoiceEvent::On => VoiceState::On,
                    VoiceEvent::Release => VoiceState::Release,
                    VoiceEvent::Off => VoiceState::Off,
                };
            }
            if self.states[ch] == VoiceState::Off {
                continue;
            }
            let (source, pitch, volume) = match chan.source {
                VoiceSource::Silent => continue,
                VoiceSource::Pcm => (TraceSource::Pcm, chan.note_on_pitch, 16),
                VoiceSource::Instrument(i) => {
                    let mut pitch = chan.note_on_pitch;
                    let mut volume = 16;
                    if let Some(inst) = self.song.instruments().get(i) {
                        if self.draw_bends {
                            pitch = chan.base_pitch
                                + inst
                                    .pitch
                                    .values()
                                    .get(chan.env_pitch_index)
                                    .copied()
                                    .unwrap_or(0) as i32;
                        }
                        if self.draw_volume {
                            volume = inst
                                .volume
                                .values()
                                .get(chan.env_volume_index)
                                .copied()
                                .unwrap_or(0) as i32;
                        }
                    }
                    (TraceSource::Instrument(i as u8), pitch, volume)
                }
            };
            self.events.traces.push(NoteTrace {
                x: self.x,
                channel: ch as u8,
                source,
                pitch,
                volume,
                note_on,
            });
        }

        self.x += 1;
    }
}
