// The sequencer decides when and with what parameters a sample plays; a sink
// does the playing. Picked once at startup by `audio::open_sink`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use super::sample_buffer::SampleBuffer;
use super::sample_id::SampleId;
use crate::error::SinkError;

// One scheduled playback of a registered sample.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleRequest {
    pub sample_id: SampleId,
    pub when: Instant,
    pub volume: f32,
    pub rate: f32,
    pub preserve_pitch: bool,
    pub trim_start_ms: f64,
    pub trim_end_ms: f64,
    pub duration_ms: f64,
}

pub trait AudioSink {
    fn name(&self) -> &'static str;

    // Registers a decoded buffer. Failure leaves the channel silent, nothing more.
    fn load_sample(&mut self, id: SampleId, buffer: Arc<SampleBuffer>) -> Result<(), SinkError>;

    // Releases the sink's copy of a buffer.
    fn unload_sample(&mut self, id: SampleId);

    // Fire-and-forget; there is no confirmation and no recall.
    fn schedule_sample(&mut self, request: ScheduleRequest);

    fn stop_all(&mut self) {}
}

// No hardware: remembers what it was asked to do and logs it.
#[derive(Debug, Default)]
pub struct SoftwareSink {
    loaded: HashSet<SampleId>,
    scheduled: usize,
}

impl SoftwareSink {
    pub fn new() -> Self {
        info!("using software audio sink, nothing will be audible");
        Self::default()
    }

    #[cfg(test)]
    fn scheduled_count(&self) -> usize {
        self.scheduled
    }

    #[cfg(test)]
    fn is_loaded(&self, id: SampleId) -> bool {
        self.loaded.contains(&id)
    }
}

impl AudioSink for SoftwareSink {
    fn name(&self) -> &'static str {
        "software"
    }

    fn load_sample(&mut self, id: SampleId, _buffer: Arc<SampleBuffer>) -> Result<(), SinkError> {
        self.loaded.insert(id);
        Ok(())
    }

    fn unload_sample(&mut self, id: SampleId) {
        self.loaded.remove(&id);
    }

    fn schedule_sample(&mut self, request: ScheduleRequest) {
        if !self.loaded.contains(&request.sample_id) {
            debug!("dropping trigger for unregistered sample {:?}", request.sample_id);
            return;
        }
        self.scheduled += 1;
        debug!(
            "sample {:?} in {:.1}ms at vol {:.2} rate {:.2}",
            request.sample_id,
            request.when.saturating_duration_since(Instant::now()).as_secs_f64() * 1000.0,
            request.volume,
            request.rate,
        );
    }
}
