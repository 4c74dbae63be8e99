// Multi-layer oscillator synthesis.
//
// Stateless: a parameter set goes in, mono PCM at 44.1 kHz comes out. Phase
// is computed from absolute time, so there is no per-voice state to carry.

use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::shared::{clamp_unit, SAMPLE_RATE};

// pitch LFO at full depth moves each layer by at most +-10%
const PITCH_LFO_RANGE: f64 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Saw,
    Triangle,
}

impl Waveform {
    // Value in [-1, 1] for a phase in [0, 1).
    pub fn value(self, phase: f64) -> f64 {
        match self {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Saw => 2.0 * phase - 1.0,
            Waveform::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OscillatorLayer {
    pub waveform: Waveform,
    pub frequency: f64,
    pub volume: f32,
}

impl OscillatorLayer {
    pub fn new(waveform: Waveform, frequency: f64, volume: f32) -> Self {
        Self { waveform, frequency, volume }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoTarget {
    #[default]
    Volume,
    Pitch,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lfo {
    pub rate_hz: f64,
    pub depth: f32,
    #[serde(default)]
    pub waveform: Waveform,
    #[serde(default)]
    pub target: LfoTarget,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiOscillatorParams {
    pub layers: Vec<OscillatorLayer>,
    pub noise: f32,
    pub attack_ms: f64,
    pub decay_ms: f64,
    pub duration_ms: f64,
    pub volume: f32,
    pub lfo: Option<Lfo>,
}

impl Default for MultiOscillatorParams {
    fn default() -> Self {
        Self {
            layers: vec![OscillatorLayer::new(Waveform::Sine, 440.0, 1.0)],
            noise: 0.0,
            attack_ms: 5.0,
            decay_ms: 200.0,
            duration_ms: 500.0,
            volume: 0.8,
            lfo: None,
        }
    }
}

impl MultiOscillatorParams {
    pub fn sample_count(&self) -> usize {
        ms_to_samples(self.duration_ms)
    }

    // number of sources the mix is divided by
    fn source_count(&self) -> usize {
        self.layers.len() + usize::from(self.noise > 0.0)
    }
}

fn ms_to_samples(ms: f64) -> usize {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    (ms * SAMPLE_RATE as f64 / 1000.0).round() as usize
}

// Attack and decay lengths in samples, shrunk so they never overlap.
fn envelope_lengths(params: &MultiOscillatorParams, total: usize) -> (usize, usize) {
    let attack = ms_to_samples(params.attack_ms).min(total);
    let decay = ms_to_samples(params.decay_ms).min(total - attack);
    (attack, decay)
}

#[inline]
fn envelope(i: usize, total: usize, attack: usize, decay: usize) -> f64 {
    if i < attack {
        i as f64 / attack as f64
    } else if i >= total - decay {
        (total - i) as f64 / decay as f64
    } else {
        1.0
    }
}

// Renders `params` with thread-local randomness for the noise source.
//
// Output is not bit-reproducible when noise is used.
pub fn synthesize(params: &MultiOscillatorParams) -> Vec<f32> {
    synthesize_with_rng(params, &mut rand::rng())
}

pub fn synthesize_with_rng<R: Rng + ?Sized>(params: &MultiOscillatorParams, rng: &mut R) -> Vec<f32> {
    let total = params.sample_count();
    let sources = params.source_count();
    if total == 0 || sources == 0 {
        return vec![0.0; total];
    }

    let (attack, decay) = envelope_lengths(params, total);
    let noise = clamp_unit(params.noise) as f64;
    let master = clamp_unit(params.volume) as f64;
    let lfo = params.lfo.map(|l| Lfo { depth: clamp_unit(l.depth), ..l });
    let sr = SAMPLE_RATE as f64;

    (0..total)
        .map(|i| {
            let t = i as f64 / sr;
            let lfo_value = lfo.map(|l| l.waveform.value((l.rate_hz * t).rem_euclid(1.0)));

            let pitch_mod = match (lfo, lfo_value) {
                (Some(l), Some(v)) if l.target == LfoTarget::Pitch => {
                    1.0 + v * l.depth as f64 * PITCH_LFO_RANGE
                }
                _ => 1.0,
            };

            let mut mixed: f64 = params
                .layers
                .iter()
                .map(|layer| {
                    let phase = (layer.frequency * pitch_mod * t).rem_euclid(1.0);
                    layer.waveform.value(phase) * clamp_unit(layer.volume) as f64
                })
                .sum();
            if noise > 0.0 {
                mixed += rng.random_range(-1.0..1.0) * noise;
            }
            mixed /= sources as f64;

            if let (Some(l), Some(v)) = (lfo, lfo_value) {
                if l.target == LfoTarget::Volume {
                    let depth = l.depth as f64;
                    mixed *= (1.0 - depth) + depth * (v * 0.5 + 0.5);
                }
            }

            (mixed * envelope(i, total, attack, decay) * master) as f32
        })
        .collect()
}
