use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;

// One playing instance of a (trimmed) region of a sample buffer.
#[derive(Clone, Debug)]
pub struct Voice {
    pub pos: f64,
    pub step: f64, // source frames advanced per output frame
    pub gain: f32,
    pub active: bool,
    trim_start: usize,
    length: usize,
}

impl Voice {
    pub fn new(trim_start: usize, length: usize, step: f64, gain: f32) -> Self {
        Self {
            pos: 0.0,
            step: if step.is_finite() && step > 0.0 { step } else { 1.0 },
            gain,
            active: length > 0,
            trim_start,
            length,
        }
    }

    // A voice over the whole buffer, e.g. an already-trimmed copy.
    pub fn whole(buffer: &SampleBuffer, step: f64, gain: f32) -> Self {
        Self::new(0, buffer.len(), step, gain)
    }

    #[cfg(test)]
    fn remaining_frames(&self) -> usize {
        if !self.active {
            return 0;
        }
        ((self.length as f64 - self.pos) / self.step).ceil().max(0.0) as usize
    }

    // we're at a certain playback position, it's our job to mix this voice into the output buffer
    pub fn render_into(&mut self, buffer: &SampleBuffer, out: &mut [StereoFrame]) {
        if !self.active {
            return;
        }
        let available = buffer.data.len().saturating_sub(self.trim_start);
        self.length = self.length.min(available);
        if self.length == 0 {
            self.active = false;
            return;
        }

        let data = &buffer.data;
        let last = self.length - 1;

        for frame in out.iter_mut() { // for each frame in the output buffer
            if self.pos >= self.length as f64 {
                self.active = false;
                break;
            }

            // read sample at current position, interpolating toward the next frame
            let i = self.pos as usize;
            let frac = (self.pos - i as f64) as f32;
            let idx = self.trim_start + i;
            let s0 = data[idx];
            let s1 = if i < last { data[idx + 1] } else { s0 };

            frame.add_scaled(StereoFrame::lerp(s0, s1, frac), self.gain);
            self.pos += self.step;
        }
        if self.pos >= self.length as f64 {
            self.active = false;
        }
    }
}
