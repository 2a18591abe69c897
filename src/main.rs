//! gvsong render CLI
//!
//! Decodes a compiled `.gvsong` file, loads the precomputed oscillator table
//! blob, renders the song, and writes a mono 16-bit 32768 Hz WAV.

use anyhow::{anyhow, bail, Context, Result};
use gvsong::{format, write_wav, PcmBank, Song, SoundBanks, WaveTable};
use std::env;
use std::fs;

fn usage() -> ! {
    eprintln!("Usage: gvsong <input.gvsong> <tables.bin> <output.wav> [--loop N] [--sequence N]");
    eprintln!();
    eprintln!("  <input.gvsong>   compiled song (magic FB 67 76 73)");
    eprintln!("  <tables.bin>     oscillator wavetable blob, raw little-endian i16");
    eprintln!("  --loop N         passes over the sequence loop region (default 1)");
    eprintln!("  --sequence N     play sequence index (default 0)");
    std::process::exit(1);
}

struct Args {
    input: String,
    tables: String,
    output: String,
    loop_count: u32,
    sequence: usize,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut loop_count = 1u32;
    let mut sequence = 0usize;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--loop" => {
                let v = args.next().ok_or_else(|| anyhow!("--loop needs a value"))?;
                loop_count = v.parse().context("--loop must be a positive integer")?;
            }
            "--sequence" => {
                let v = args
                    .next()
                    .ok_or_else(|| anyhow!("--sequence needs a value"))?;
                sequence = v.parse().context("--sequence must be an integer")?;
            }
            "--help" | "-h" => usage(),
            _ => positional.push(arg),
        }
    }
    if positional.len() != 3 {
        usage();
    }
    let mut positional = positional.into_iter();
    Ok(Args {
        input: positional.next().unwrap_or_default(),
        tables: positional.next().unwrap_or_default(),
        output: positional.next().unwrap_or_default(),
        loop_count,
        sequence,
    })
}

fn load_wave_table(path: &str) -> Result<WaveTable> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path))?;
    if raw.len() % 2 != 0 {
        bail!("{}: expected raw little-endian i16 samples", path);
    }
    // The table generator quantizes to +/-16384.
    let samples: Vec<f32> = raw
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 16384.0)
        .collect();
    Ok(WaveTable::from_samples(samples)?)
}

fn main() -> Result<()> {
    let args = parse_args()?;

    let data = fs::read(&args.input).with_context(|| format!("failed to read {}", args.input))?;
    if !format::is_song_data(&data) {
        bail!("{}: not a compiled gvsong file", args.input);
    }
    let song = Song::decode(&data).with_context(|| format!("failed to decode {}", args.input))?;
    println!(
        "{}: {} channels, {} instruments, {} patterns, {} sequences",
        args.input,
        song.channel_count(),
        song.instruments().len(),
        song.patterns().len(),
        song.sequences().len()
    );

    let banks = SoundBanks {
        waves: load_wave_table(&args.tables)?,
        pcm: PcmBank::silence(),
    };

    let samples = song.render_wave(args.loop_count, args.sequence, &banks)?;
    write_wav(&args.output, &samples)?;
    println!(
        "{}: {} samples ({:.2}s)",
        args.output,
        samples.len(),
        samples.len() as f64 / 32768.0
    );
    Ok(())
}
