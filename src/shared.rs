// Shared vocabulary between the sequencer, the renderer and the host glue.
//
// Everything that crosses a module boundary by value lives here: channel ids,
// the punch-in modifiers, and the clamping rules for user-facing numbers.
// Clamping happens at the boundary so nothing downstream has to re-check ranges.

use serde::{Deserialize, Serialize};

pub const SAMPLE_RATE: u32 = 44100;

pub const MIN_BPM: f64 = 40.0;
pub const MAX_BPM: f64 = 240.0;
pub const DEFAULT_BPM: f64 = 120.0;

pub const MAX_SWING: f64 = 100.0;

// the step counts the grid can be switched between
pub const STEP_COUNTS: [usize; 4] = [8, 16, 24, 32];
pub const DEFAULT_STEP_COUNT: usize = 16;

// repeat loops this many straight steps
pub const REPEAT_WINDOW: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub u32);

// Momentary performance modifier, held while pressed and only meaningful while playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunchIn {
    #[default]
    None,
    Repeat,
    Double,
    Half,
    Swap,
}

impl PunchIn {
    pub fn label(self) -> &'static str {
        match self {
            PunchIn::None => "none",
            PunchIn::Repeat => "repeat",
            PunchIn::Double => "double",
            PunchIn::Half => "half",
            PunchIn::Swap => "swap",
        }
    }
}

// Which grid a step index belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timeline {
    Straight,
    Triplet,
}

// Where the playheads are, as shown to the UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPosition {
    pub current_step: usize,
    pub current_triplet_step: usize,
}

pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_nan() {
        return DEFAULT_BPM;
    }
    bpm.clamp(MIN_BPM, MAX_BPM)
}

pub fn clamp_swing(swing: f64) -> f64 {
    if swing.is_nan() {
        return 0.0;
    }
    swing.clamp(0.0, MAX_SWING)
}

pub fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 1.0)
}

// snaps to the nearest supported count; ties go to the smaller one
pub fn snap_step_count(count: usize) -> usize {
    STEP_COUNTS
        .iter()
        .copied()
        .min_by_key(|&c| c.abs_diff(count))
        .unwrap_or(DEFAULT_STEP_COUNT)
}

// Three triplet subdivisions span the time of two straight steps.
pub fn triplet_count(step_count: usize) -> usize {
    step_count * 3 / 2
}

// quantizes the activation step down to the start of its 4-step window
pub fn quantize_repeat_origin(step: usize) -> usize {
    step - step % REPEAT_WINDOW
}
