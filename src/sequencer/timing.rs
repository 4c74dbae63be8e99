// Timing model.
//
// Pure functions from `(bpm, swing, punch-in)` to durations and offsets.
// One step is a 16th note; triplet steps run on their own grid where three
// triplets take the time of two steps. Punch-in effects only change the
// scheduling cadence and never touch the stored bpm.

use crate::shared::{PunchIn, Timeline, REPEAT_WINDOW};

// Fraction of a step an offbeat is pushed back at full swing.
pub const MAX_SWING_FRACTION: f64 = 0.75;

// 4 straight steps span 6 triplet steps
const TRIPLET_REPEAT_WINDOW: usize = REPEAT_WINDOW * 3 / 2;

// Duration of one straight step in milliseconds.
#[inline]
pub fn step_duration_ms(bpm: f64) -> f64 {
    (60_000.0 / bpm) / 4.0
}

// Duration of one triplet step in milliseconds.
#[inline]
pub fn triplet_duration_ms(bpm: f64) -> f64 {
    step_duration_ms(bpm) * (2.0 / 3.0)
}

// Multiplier applied to both step and triplet durations.
#[inline]
pub fn punch_in_scale(punch_in: PunchIn) -> f64 {
    match punch_in {
        PunchIn::Double => 0.5,
        PunchIn::Half => 2.0,
        PunchIn::None | PunchIn::Repeat | PunchIn::Swap => 1.0,
    }
}

// Step and triplet durations for one scheduling pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Durations {
    pub step_ms: f64,
    pub triplet_ms: f64,
}

impl Durations {
    pub fn new(bpm: f64, punch_in: PunchIn) -> Self {
        let scale = punch_in_scale(punch_in);
        Self {
            step_ms: step_duration_ms(bpm) * scale,
            triplet_ms: triplet_duration_ms(bpm) * scale,
        }
    }

    pub fn for_timeline(&self, timeline: Timeline) -> f64 {
        match timeline {
            Timeline::Straight => self.step_ms,
            Timeline::Triplet => self.triplet_ms,
        }
    }
}

// Delay applied to a straight step. Only odd ("offbeat") steps swing.
#[inline]
pub fn swing_offset_ms(step: usize, swing: f64, step_ms: f64) -> f64 {
    if step % 2 == 1 {
        (swing / 100.0) * MAX_SWING_FRACTION * step_ms
    } else {
        0.0
    }
}

// Folds `index` into the window of `window` slots starting at `origin`.
//
// Works for indices before the origin too, so the loop wraps back into
// the window from either side.
pub fn repeat_index(index: usize, origin: usize, window: usize) -> usize {
    let offset = (index as i64 - origin as i64).rem_euclid(window as i64);
    origin + offset as usize
}

// Which pattern slot is heard for the scheduler's `index` on a timeline.
//
// Under `repeat` the audible pattern loops a short window anchored at
// `repeat_origin` while the index itself keeps advancing.
pub fn effective_index(
    index: usize,
    timeline: Timeline,
    punch_in: PunchIn,
    repeat_origin: usize,
    len: usize,
) -> usize {
    if punch_in != PunchIn::Repeat || len == 0 {
        return index;
    }
    let folded = match timeline {
        Timeline::Straight => repeat_index(index, repeat_origin, REPEAT_WINDOW),
        Timeline::Triplet => {
            repeat_index(index, repeat_origin * 3 / 2, TRIPLET_REPEAT_WINDOW)
        }
    };
    folded % len
}
