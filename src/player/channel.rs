//! Per-channel voice state
//!
//! Each song channel plays at most one voice. The channel tracks its voice
//! lifecycle (on → release → off), the envelope cursors, the bend state, and
//! a pending-action queue implementing delayed note-on/note-off/bend when the
//! channel's delay register is nonzero.

use std::collections::VecDeque;

/// Voice lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Silent.
    Off,
    /// Playing the release tail after note-off.
    Release,
    /// Held.
    On,
}

/// A voice state transition, logged for the visualization adapter and
/// cleared after every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceEvent {
    /// A note started.
    On,
    /// The note was released.
    Release,
    /// The voice went silent.
    Off,
}

/// What the channel's voice samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSource {
    /// No instrument selected.
    Silent,
    /// PCM sample playback.
    Pcm,
    /// An instrument by index.
    Instrument(usize),
}

/// A deferred channel action with a frame countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    /// Frames until the action fires.
    pub frames_left: u32,
    /// The deferred action.
    pub kind: PendingKind,
}

/// The kinds of action a nonzero delay register defers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// Start a note.
    NoteOn {
        /// 7-bit note value.
        note: u8,
    },
    /// Release the held note.
    NoteOff,
    /// Start a bend toward `note` over `duration` 16th notes.
    Bend {
        /// Bend length in 16th notes; 0 jumps immediately.
        duration: u32,
        /// Bend target note.
        note: u8,
    },
}

/// One channel of the playback engine.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Voice lifecycle state.
    pub state: VoiceState,
    /// State transitions since the last committed frame.
    pub events: Vec<VoiceEvent>,
    /// Delay register in frames; 0 applies note/bend actions immediately.
    pub delay: u32,
    /// Deferred actions, resolved in FIFO order as countdowns expire.
    pub pending: VecDeque<PendingAction>,
    /// Channel volume, 0.0..=1.0.
    pub chan_volume: f64,
    /// Cursor into the volume envelope.
    pub env_volume_index: usize,
    /// Cursor into the pitch envelope.
    pub env_pitch_index: usize,
    /// Current pitch in 1/16 semitones, stepped by bends.
    pub base_pitch: i32,
    /// Pitch captured at the last note-on (raw, bend-free).
    pub note_on_pitch: i32,
    /// Bend destination pitch in 1/16 semitones.
    pub target_pitch: i32,
    /// Bend accumulator, advanced by 65536 per frame.
    pub bend_counter: u32,
    /// Accumulator threshold per 1/16-semitone step.
    pub bend_counter_max: u32,
    /// Oscillator phase (or absolute PCM sample position).
    pub phase: f64,
    /// What the voice samples from.
    pub source: VoiceSource,
    /// Resolved PCM bank slot for the active PCM voice.
    pub pcm_slot: usize,
}

impl Channel {
    /// A fresh silent channel.
    pub fn new() -> Channel {
        Channel {
            state: VoiceState::Off,
            events: Vec::new(),
            delay: 0,
            pending: VecDeque::new(),
            chan_volume: 0.5,
            env_volume_index: 0,
            env_pitch_index: 0,
            base_pitch: 0,
            note_on_pitch: 0,
            target_pitch: 0,
            bend_counter: 0,
            bend_counter_max: 0,
            phase: 0.0,
            source: VoiceSource::Silent,
            pcm_slot: 0,
        }
    }

    /// Switch the voice source, silencing the voice and dropping every
    /// pending action. The delay register and channel volume persist.
    pub fn reset_voice(&mut self, source: VoiceSource) {
        self.events.push(VoiceEvent::Off);
        self.state = VoiceState::Off;
        self.base_pitch = 0;
        self.note_on_pitch = 0;
        self.target_pitch = 0;
        self.pending.clear();
        self.source = source;
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_voice_clears_pending() {
        let mut chan = Channel::new();
        chan.delay = 3;
        chan.chan_volume = 0.25;
        chan.state = VoiceState::On;
        chan.base_pitch = 56 << 4;
        chan.pending.push_back(PendingAction {
            frames_left: 2,
            kind: PendingKind::NoteOff,
        });
        chan.reset_voice(VoiceSource::Instrument(1));
        assert_eq!(chan.state, VoiceState::Off);
        assert_eq!(chan.base_pitch, 0);
        assert!(chan.pending.is_empty());
        assert_eq!(chan.events, vec![VoiceEvent::Off]);
        // delay and volume survive an instrument switch
        assert_eq!(chan.delay, 3);
        assert_eq!(chan.chan_volume, 0.25);
    }
}
