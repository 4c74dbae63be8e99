use std::sync::Arc;

pub use crate::audio::{SampleBuffer, SampleId};

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerParams {
    pub sample_id: SampleId,
    pub delay_frames: usize, // counted from the block that receives the command
    pub trim_start_ms: f64,
    pub trim_end_ms: f64,
    pub gain: f32,
    pub rate: f32,
}

#[derive(Clone, Debug)]
pub enum AudioCommand {
    // The engine can't load files (interrupts thread), so you must first
    // decode a buffer (see audio::cache), then register it with the engine
    RegisterSample { id: SampleId, buffer: Arc<SampleBuffer> },

    // Drops the engine's reference; pending starts and playing voices of it go silent
    UnregisterSample { id: SampleId },

    // The engine then uses the sample id to trigger the sound
    Trigger(TriggerParams),

    StopAll,
}
