use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info, warn};

use crate::audio_api::{AudioCommand, TriggerParams};
use crate::config::AudioSettings;
use crate::error::SinkError;

pub mod cache;
mod engine;
mod frame;
mod sample_buffer;
mod sample_id;
pub mod sink;
mod voice;
pub mod wav;

pub use cache::SampleCache;
pub use engine::Engine;
pub use frame::StereoFrame;
pub use sample_buffer::SampleBuffer;
pub use sample_id::{SampleId, SampleIds};
pub use sink::{AudioSink, ScheduleRequest, SoftwareSink};
pub use voice::Voice;

// Opens the default output device, or falls back to the software sink when
// there isn't one. Decided once; the choice doesn't change while running.
pub fn open_sink(settings: &AudioSettings) -> Box<dyn AudioSink> {
    match CpalSink::open(settings) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            warn!("no audio output ({e}), falling back to software sink");
            Box::new(SoftwareSink::new())
        }
    }
}

pub struct CpalSink {
    tx: Sender<AudioCommand>,
    sample_rate: u32,
    _output_stream: cpal::Stream,
}

impl CpalSink {
    pub fn open(settings: &AudioSettings) -> Result<Self, SinkError> {
        let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(settings.command_capacity);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SinkError::Device("no default output device".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| SinkError::Device(e.to_string()))?;

        let sample_rate = config.sample_rate();
        let channels = config.channels() as usize;

        match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let engine = Engine::new(sample_rate, settings.max_voices);
                let output_stream = build_output_stream_f32(&device, &config.into(), rx, engine, channels)?;
                output_stream.play().map_err(|e| SinkError::Stream(e.to_string()))?;
                info!("audio output at {sample_rate}Hz, {channels} channels");
                Ok(Self { tx, sample_rate, _output_stream: output_stream })
            }
            other => Err(SinkError::Device(format!(
                "unsupported sample format {other:?} (only f32 supported for now)"
            ))),
        }
    }

    fn send(&self, cmd: AudioCommand) -> Result<(), SinkError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Rejected("audio command queue full".into()),
            TrySendError::Disconnected(_) => SinkError::Stream("audio thread gone".into()),
        })
    }
}

impl AudioSink for CpalSink {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn load_sample(&mut self, id: SampleId, buffer: Arc<SampleBuffer>) -> Result<(), SinkError> {
        self.send(AudioCommand::RegisterSample { id, buffer })
    }

    fn unload_sample(&mut self, id: SampleId) {
        if let Err(e) = self.send(AudioCommand::UnregisterSample { id }) {
            warn!("unload of {id:?} dropped: {e}");
        }
    }

    fn schedule_sample(&mut self, request: ScheduleRequest) {
        let delay = request.when.saturating_duration_since(Instant::now());
        let delay_frames = (delay.as_secs_f64() * self.sample_rate as f64).round() as usize;
        let trigger = TriggerParams {
            sample_id: request.sample_id,
            delay_frames,
            trim_start_ms: request.trim_start_ms,
            trim_end_ms: request.trim_end_ms,
            gain: request.volume,
            rate: request.rate,
        };
        if let Err(e) = self.send(AudioCommand::Trigger(trigger)) {
            warn!("trigger dropped: {e}");
        }
    }

    fn stop_all(&mut self) {
        let _ = self.send(AudioCommand::StopAll);
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut engine: Engine,
    channels: usize,
) -> Result<cpal::Stream, SinkError> {
    // scratch sized for a generous callback; larger callbacks render in chunks
    let mut scratch = vec![StereoFrame::zero(); 4096];
    let channels = channels.max(1);

    let err_fn = |err| error!("audio output stream error: {err}");

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                while let Ok(cmd) = rx.try_recv() {
                    engine.handle_cmd(cmd);
                }

                for out in data.chunks_mut(scratch.len() * channels) {
                    let n_frames = out.len() / channels;
                    let frames = &mut scratch[..n_frames];
                    engine.render_block(frames);
                    for (dst, f) in out.chunks_exact_mut(channels).zip(frames.iter()) {
                        if channels == 1 {
                            dst[0] = (f.left + f.right) * 0.5;
                        } else {
                            dst[0] = f.left;
                            dst[1] = f.right;
                            dst[2..].fill(0.0);
                        }
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| SinkError::Stream(e.to_string()))
}
