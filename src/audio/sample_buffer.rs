use std::path::Path;

use super::frame::StereoFrame;
use crate::error::SampleError;

#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    pub data: Vec<StereoFrame>, // the audio data array
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn from_frames(data: Vec<StereoFrame>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    pub fn from_mono(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: samples.iter().map(|&x| StereoFrame::mono(x)).collect(),
            sample_rate,
        }
    }

    // Load a WAV file from disk into the sample buffer
    pub fn load_wav(path: &Path, target_rate: u32) -> Result<Self, SampleError> {
        let read_err = |source| SampleError::Read { path: path.to_path_buf(), source };
        let mut reader = hound::WavReader::open(path).map_err(read_err)?;
        let spec = reader.spec();
        let file_rate = spec.sample_rate;
        let file_channels = spec.channels as usize;

        // Read the samples from the WAV file
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader // float, just pass it through
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(read_err)?,
            hound::SampleFormat::Int => { // int, convert to float
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(SampleError::Unsupported {
                        path: path.to_path_buf(),
                        detail: format!("{} bits per sample", spec.bits_per_sample),
                    });
                }
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max)) // scale into [-1, 1)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(read_err)?
            }
        };

        let frames: Vec<StereoFrame> = match file_channels {
            0 => Vec::new(),
            1 => samples.into_iter().map(StereoFrame::mono).collect(), // mono, duplicate
            n => samples
                .chunks_exact(n) // anything past the first two channels is dropped
                .map(|c| StereoFrame { left: c[0], right: c[1] })
                .collect(),
        };

        if frames.is_empty() {
            return Err(SampleError::Empty(path.display().to_string()));
        }

        let data = if file_rate != target_rate {
            resample_linear(&frames, file_rate, target_rate)
        } else {
            frames
        };

        Ok(Self { data, sample_rate: target_rate })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_ms(&self) -> f64 {
        self.data.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    pub fn ms_to_frames(&self, ms: f64) -> usize {
        (ms.max(0.0) * self.sample_rate as f64 / 1000.0).floor() as usize
    }

    // Copies `[start_ms, end_ms)` into a new buffer at this buffer's rate.
    pub fn trimmed(&self, start_ms: f64, end_ms: f64) -> SampleBuffer {
        let start = self.ms_to_frames(start_ms).min(self.data.len());
        let end = self.ms_to_frames(end_ms).clamp(start, self.data.len());
        SampleBuffer {
            data: self.data[start..end].to_vec(),
            sample_rate: self.sample_rate,
        }
    }

    pub fn to_mono(&self) -> Vec<f32> {
        self.data.iter().map(|f| (f.left + f.right) * 0.5).collect()
    }
}

pub fn resample_linear(frames: &[StereoFrame], source_rate: u32, target_rate: u32) -> Vec<StereoFrame> {
    // This is a simple linear resampler
    if source_rate == target_rate || source_rate == 0 {
        return frames.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (frames.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        // fractional position in the source buffer
        let src_pos = i as f64 / ratio; // ex. 3.7
        let idx = src_pos.floor() as usize; // ex. 3
        let frac = (src_pos - idx as f64) as f32; // ex. 0.7
        if idx >= frames.len().saturating_sub(1) { // edge case
            out.push(*frames.last().unwrap_or(&StereoFrame::zero()));
        } else {
            // blend frames 3 and 4 by 0.7
            out.push(StereoFrame::lerp(frames[idx], frames[idx + 1], frac));
        }
    }
    out
}
