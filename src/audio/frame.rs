// The smallest unit of audio; one stereo frame
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self { // just giving `default` a better name for clarity
        Self::default()
    }

    pub fn mono(v: f32) -> Self {
        Self { left: v, right: v }
    }

    #[inline]
    pub fn lerp(a: Self, b: Self, t: f32) -> Self {
        Self {
            left: a.left * (1.0 - t) + b.left * t,
            right: a.right * (1.0 - t) + b.right * t,
        }
    }

    #[inline]
    pub fn add_scaled(&mut self, other: Self, gain: f32) {
        self.left += other.left * gain;
        self.right += other.right * gain;
    }

    pub fn peak(&self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}
