pub mod oscillator;
pub mod presets;

pub use oscillator::{
    synthesize, synthesize_with_rng, Lfo, LfoTarget, MultiOscillatorParams, OscillatorLayer, Waveform,
};
pub use presets::Preset;

use crate::audio::wav;
use crate::error::WavError;
use crate::shared::SAMPLE_RATE;

// Synthesizes `params` and encodes the result as a mono PCM16 WAV.
pub fn synthesize_to_wav(params: &MultiOscillatorParams) -> Result<Vec<u8>, WavError> {
    wav::encode_mono(&synthesize(params), SAMPLE_RATE)
}
