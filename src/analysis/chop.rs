use crate::shared::clamp_bpm;

pub const MAX_SLICES: usize = 64;

// shorter leftovers at the end are folded into the previous slice
const MIN_SLICE_MS: f64 = 1.0;

// Length of one slice in milliseconds at `bpm`.
pub fn slice_ms(bpm: f64, beats_per_slice: f64) -> f64 {
    60_000.0 / clamp_bpm(bpm) * beats_per_slice
}

// Splits `[0, duration_ms)` into consecutive beat-aligned trim regions.
//
// A bad `beats_per_slice` yields the whole sample as one region.
pub fn chop_regions(duration_ms: f64, bpm: f64, beats_per_slice: f64) -> Vec<(f64, f64)> {
    if !duration_ms.is_finite() || duration_ms <= 0.0 {
        return Vec::new();
    }
    if !beats_per_slice.is_finite() || beats_per_slice <= 0.0 {
        return vec![(0.0, duration_ms)];
    }
    let len = slice_ms(bpm, beats_per_slice);

    let mut regions = Vec::new();
    let mut start = 0.0;
    while start < duration_ms && regions.len() < MAX_SLICES {
        let end = (start + len).min(duration_ms);
        regions.push((start, end));
        start = end;
    }
    let n = regions.len();
    if n >= 2 && regions[n - 1].1 - regions[n - 1].0 < MIN_SLICE_MS {
        regions[n - 2].1 = regions[n - 1].1;
        regions.pop();
    }
    regions
}
