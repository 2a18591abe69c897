//! gvsong song compiler and renderer
//!
//! Compiles tracker-style song descriptions into the compact gvsong binary
//! format and deterministically renders that format into audio by emulating a
//! fixed-function synthesizer (square/triangle/saw/sine/noise oscillators plus
//! PCM playback) at the Game Boy Advance's hardware timing: 32768 Hz output,
//! 608 samples per video frame.
//!
//! # Features
//! - Bit-exact gvsong binary encoder/decoder (magic `FB 67 76 73`, version 0)
//! - Validating song builders: instruments with Loop/Exit envelopes, tracker
//!   notation patterns, play sequences, PCM sample mapping
//! - Frame-accurate playback engine with per-channel voice state, delayed
//!   events, pitch bends, and song-level looping
//! - Waveform export (mono 16-bit WAV) and a frame-accurate visualization
//!   event stream for external pitch-roll renderers
//!
//! # Quick start
//! ```no_run
//! use gvsong::{ListToken, Song};
//! let mut song = Song::new(1).unwrap();
//! song.add_instrument(
//!     0,
//!     &[ListToken::Loop, ListToken::Value(16), ListToken::Exit, ListToken::Value(0)],
//!     &[ListToken::Value(0)],
//! )
//! .unwrap();
//! song.set_patterns(&["00  C-4:I01\n10  OFF:---\n20  ---:END"]).unwrap();
//! song.set_sequences(&[&[ListToken::Value(0)][..]]).unwrap();
//! let bytes = song.encode();
//! assert!(gvsong::format::is_song_data(&bytes));
//! ```

#![warn(missing_docs)]

// Domain modules
pub mod banks; // Externally supplied oscillator/PCM banks
pub mod export; // Waveform adapter + WAV writing
pub mod format; // Binary Codec
pub mod player; // Playback Engine
pub mod song; // Song Data Model + builders
pub mod tables; // Instruction Set Definitions
pub mod visualization; // Visualization event adapter

pub use banks::{PcmBank, PcmSampleInfo, SoundBanks, WaveTable};
pub use export::write_wav;
pub use song::envelope::ListToken;
pub use song::Song;
pub use visualization::VisualizationEvents;

/// Error type for song construction, codec, and rendering operations
#[derive(thiserror::Error, Debug)]
pub enum GvsongError {
    /// Malformed binary song data (bad magic/version, truncated buffer).
    /// Recoverable: the caller decides the fallback.
    #[error("Format error: {0}")]
    Format(String),

    /// Builder invariant violation; fatal to the in-progress song build
    #[error("Build error: {0}")]
    Build(String),

    /// Render-time failure (bad sequence index, hostile decoded indices)
    #[error("Render error: {0}")]
    Render(String),

    /// Invalid collaborator table data (wavetable/PCM bank shape)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio container write failure
    #[error("Audio file error: {0}")]
    AudioFile(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for GvsongError {
    fn from(s: String) -> Self {
        GvsongError::Other(s)
    }
}

impl From<&str> for GvsongError {
    fn from(s: &str) -> Self {
        GvsongError::Other(s.to_string())
    }
}

impl From<hound::Error> for GvsongError {
    fn from(e: hound::Error) -> Self {
        GvsongError::AudioFile(e.to_string())
    }
}

/// Result type for gvsong operations
pub type Result<T> = std::result::Result<T, GvsongError>;
