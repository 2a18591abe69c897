//! WAV container writing
//!
//! Wraps rendered samples in the canonical gvsong output container: mono,
//! 16-bit signed PCM at 32768 Hz (block align 2, byte rate 65536).

use crate::tables::SAMPLE_RATE;
use crate::Result;
use std::path::Path;

/// The WAV spec every gvsong render uses.
pub fn wav_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Write rendered samples to a WAV file.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[i16]) -> Result<()> {
    let mut writer = hound::WavWriter::create(path, wav_spec())?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_matches_hardware_rate() {
        let spec = wav_spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 32768);
        assert_eq!(spec.bits_per_sample, 16);
        // byte rate 65536, block align 2
        assert_eq!(spec.sample_rate * 2, 65536);
    }
}
