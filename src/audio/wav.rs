// PCM16 WAV encoding.
//
// Mono for synthesized sounds, stereo for song renders. hound writes the plain
// 16-byte `fmt ` chunk for <= 2 channels at 16 bits, so the header is the
// canonical 44 bytes.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use super::frame::StereoFrame;
use crate::error::WavError;

pub const WAV_HEADER_LEN: usize = 44;

// Clamp to [-1, 1], then scale negatives by 0x8000 and the rest by 0x7FFF so
// full scale never overflows.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

fn spec(channels: u16, sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

pub fn write_mono<W: Write + Seek>(w: W, samples: &[f32], sample_rate: u32) -> Result<(), WavError> {
    let mut writer = hound::WavWriter::new(w, spec(1, sample_rate))?;
    for &s in samples {
        writer.write_sample(quantize(s))?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn write_stereo<W: Write + Seek>(
    w: W,
    frames: &[StereoFrame],
    sample_rate: u32,
) -> Result<(), WavError> {
    let mut writer = hound::WavWriter::new(w, spec(2, sample_rate))?;
    for f in frames {
        writer.write_sample(quantize(f.left))?;
        writer.write_sample(quantize(f.right))?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn encode_mono(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, WavError> {
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    write_mono(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}

pub fn encode_stereo(frames: &[StereoFrame], sample_rate: u32) -> Result<Vec<u8>, WavError> {
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + frames.len() * 4));
    write_stereo(&mut cursor, frames, sample_rate)?;
    Ok(cursor.into_inner())
}

pub fn write_stereo_file(path: &Path, frames: &[StereoFrame], sample_rate: u32) -> Result<(), WavError> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_stereo(file, frames, sample_rate)
}

pub fn write_mono_file(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), WavError> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_mono(file, samples, sample_rate)
}
