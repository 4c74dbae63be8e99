use std::collections::HashMap;
use std::sync::Arc;

use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;
use super::voice::Voice;
use crate::audio_api::{AudioCommand, TriggerParams};
use crate::audio::SampleId;

struct Playing {
    sample_id: SampleId,
    voice: Voice,
}

// Runs inside the audio callback: everything is preallocated and capped so
// rendering a block never allocates.
pub struct Engine {
    sample_rate: u32,
    max_voices: usize,
    samples: HashMap<SampleId, Arc<SampleBuffer>>,
    pending: Vec<TriggerParams>,
    voices: Vec<Playing>,
}

impl Engine {
    pub fn new(sample_rate: u32, max_voices: usize) -> Self {
        let max_voices = max_voices.max(1);
        Self {
            sample_rate,
            max_voices,
            samples: HashMap::with_capacity(64),
            pending: Vec::with_capacity(max_voices * 4),
            voices: Vec::with_capacity(max_voices),
        }
    }

    #[cfg(test)]
    fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::RegisterSample { id, buffer } => {
                self.samples.insert(id, buffer);
            }
            AudioCommand::UnregisterSample { id } => {
                self.samples.remove(&id);
                self.pending.retain(|p| p.sample_id != id);
            }
            AudioCommand::Trigger(t) => {
                if self.pending.len() < self.pending.capacity() {
                    self.pending.push(t);
                }
            }
            AudioCommand::StopAll => {
                self.pending.clear();
                self.voices.clear();
            }
        }
    }

    fn make_voice(&self, t: &TriggerParams) -> Option<(Voice, &Arc<SampleBuffer>)> {
        let buffer = self.samples.get(&t.sample_id)?;
        let start = buffer.ms_to_frames(t.trim_start_ms);
        let end = buffer.ms_to_frames(t.trim_end_ms).min(buffer.len());
        if end <= start {
            return None;
        }
        // resample on the fly when the buffer rate differs from the device
        let step = t.rate as f64 * buffer.sample_rate as f64 / self.sample_rate as f64;
        Some((Voice::new(start, end - start, step, t.gain), buffer))
    }

    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        out.fill(StereoFrame::zero());
        let n = out.len();

        // voices already sounding cover the whole block
        for p in self.voices.iter_mut() {
            if let Some(buffer) = self.samples.get(&p.sample_id) {
                p.voice.render_into(buffer, out);
            } else {
                p.voice.active = false;
            }
        }
        self.voices.retain(|p| p.voice.active);

        // pending triggers that land in this block start at their offset
        let mut i = 0;
        while i < self.pending.len() {
            let t = &self.pending[i];
            if t.delay_frames >= n {
                self.pending[i].delay_frames -= n;
                i += 1;
                continue;
            }
            let t = self.pending.swap_remove(i);
            let Some((mut voice, buffer)) = self.make_voice(&t) else {
                continue;
            };
            voice.render_into(buffer, &mut out[t.delay_frames..]);
            if voice.active {
                if self.voices.len() >= self.max_voices {
                    self.voices.remove(0); // steal the oldest
                }
                self.voices.push(Playing { sample_id: t.sample_id, voice });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_ones(len: usize) -> Engine {
        let mut e = Engine::new(1000, 4);
        e.handle_cmd(AudioCommand::RegisterSample {
            id: SampleId(0),
            buffer: Arc::new(SampleBuffer::from_mono(&vec![1.0; len], 1000)),
        });
        e
    }

    fn trigger(delay_frames: usize, trim_end_ms: f64) -> AudioCommand {
        AudioCommand::Trigger(TriggerParams {
            sample_id: SampleId(0),
            delay_frames,
            trim_start_ms: 0.0,
            trim_end_ms,
            gain: 0.5,
            rate: 1.0,
        })
    }

    #[test]
    fn test_trigger_starts_at_delay_offset() {
        let mut e = engine_with_ones(100);
        e.handle_cmd(trigger(3, 100.0));
        let mut out = vec![StereoFrame::zero(); 8];
        e.render_block(&mut out);
        assert_eq!(out[2].left, 0.0);
        assert_eq!(out[3].left, 0.5);
        assert_eq!(e.active_voices(), 1);
    }

    #[test]
    fn test_delay_spans_blocks() {
        let mut e = engine_with_ones(100);
        e.handle_cmd(trigger(10, 100.0));
        let mut out = vec![StereoFrame::zero(); 8];
        e.render_block(&mut out);
        assert!(out.iter().all(|f| f.left == 0.0));
        e.render_block(&mut out);
        assert_eq!(out[1].left, 0.0);
        assert_eq!(out[2].left, 0.5);
    }

    #[test]
    fn test_trim_end_stops_voice() {
        let mut e = engine_with_ones(100);
        e.handle_cmd(trigger(0, 4.0)); // 4 frames at 1kHz
        let mut out = vec![StereoFrame::zero(); 8];
        e.render_block(&mut out);
        assert_eq!(out[3].left, 0.5);
        assert_eq!(out[4].left, 0.0);
        assert_eq!(e.active_voices(), 0);
    }

    #[test]
    fn test_voice_cap_steals_oldest() {
        let mut e = engine_with_ones(1000);
        for _ in 0..6 {
            e.handle_cmd(trigger(0, 1000.0));
        }
        let mut out = vec![StereoFrame::zero(); 8];
        e.render_block(&mut out);
        assert_eq!(e.active_voices(), 4);
    }

    #[test]
    fn test_unregister_drops_pending_and_silences() {
        let mut e = engine_with_ones(100);
        e.handle_cmd(trigger(20, 100.0));
        e.handle_cmd(AudioCommand::UnregisterSample { id: SampleId(0) });
        let mut out = vec![StereoFrame::zero(); 32];
        e.render_block(&mut out);
        assert!(out.iter().all(|f| f.left == 0.0));
    }

    #[test]
    fn test_unregister_cuts_a_playing_voice() {
        let mut e = engine_with_ones(100);
        e.handle_cmd(trigger(0, 100.0));
        let mut out = vec![StereoFrame::zero(); 16];
        e.render_block(&mut out);
        assert_eq!(out[15].left, 0.5);

        e.handle_cmd(AudioCommand::UnregisterSample { id: SampleId(0) });
        e.render_block(&mut out);
        assert!(out.iter().all(|f| f.left == 0.0));
        assert_eq!(e.active_voices(), 0);
    }
}
