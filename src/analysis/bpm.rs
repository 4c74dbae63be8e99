// Tempo estimate for loops, used to pick chop lengths. Advisory only: a wrong
// answer costs a re-chop, never playback.
//
// energy envelope -> rectified difference (onsets) -> autocorrelation over
// the lags that correspond to 60..=180 BPM.

use log::debug;

pub const MIN_DETECT_BPM: f64 = 60.0;
pub const MAX_DETECT_BPM: f64 = 180.0;

const ANALYSIS_RATE: f64 = 11025.0;
const WINDOW: usize = 256; // ~23ms at the analysis rate
const HOP: usize = WINDOW / 2;

fn downsample(samples: &[f32], factor: usize) -> Vec<f32> {
    samples
        .chunks(factor)
        .map(|c| c.iter().sum::<f32>() / c.len() as f32)
        .collect()
}

fn onset_envelope(samples: &[f32]) -> Vec<f32> {
    if samples.len() < WINDOW {
        return Vec::new();
    }
    let energy: Vec<f32> = (0..=(samples.len() - WINDOW) / HOP)
        .map(|j| samples[j * HOP..j * HOP + WINDOW].iter().map(|x| x * x).sum())
        .collect();
    energy.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect()
}

// Estimates BPM from mono samples, or `None` when there is no usable pulse.
pub fn detect_bpm(samples: &[f32], sample_rate: u32) -> Option<f64> {
    if sample_rate == 0 {
        return None;
    }
    let factor = (sample_rate as f64 / ANALYSIS_RATE).round().max(1.0) as usize;
    let rate = sample_rate as f64 / factor as f64;
    let onsets = onset_envelope(&downsample(samples, factor));

    let frames_per_sec = rate / HOP as f64;
    let min_lag = (60.0 * frames_per_sec / MAX_DETECT_BPM).ceil() as usize;
    let max_lag = (60.0 * frames_per_sec / MIN_DETECT_BPM).floor() as usize;
    if min_lag == 0 || onsets.len() <= max_lag {
        return None;
    }

    let mut best: Option<(usize, f32)> = None;
    for lag in min_lag..=max_lag {
        let corr: f32 = onsets.iter().zip(&onsets[lag..]).map(|(a, b)| a * b).sum();
        if corr > best.map_or(0.0, |(_, c)| c) {
            best = Some((lag, corr));
        }
    }

    let (lag, _) = best?;
    let bpm = 60.0 * frames_per_sec / lag as f64;
    debug!("bpm estimate {bpm:.2} (lag {lag} of {min_lag}..={max_lag})");
    Some(bpm)
}
