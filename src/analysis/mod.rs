pub mod bpm;
pub mod chop;

pub use bpm::detect_bpm;
pub use chop::{chop_regions, slice_ms};

use crate::audio::SampleBuffer;

// Tempo of a decoded buffer, folded to mono first.
pub fn detect_buffer_bpm(buffer: &SampleBuffer) -> Option<f64> {
    detect_bpm(&buffer.to_mono(), buffer.sample_rate)
}
