// Glue between the project state, the timing thread and the audio sink.
//
// The host (CLI today) calls into Middle for every edit; Middle keeps the
// scheduler's snapshot in sync and turns scheduler output into sink calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, info, warn};

use crate::audio::{AudioSink, SampleBuffer, SampleCache, SampleId, SampleIds, ScheduleRequest};
use crate::config::EngineConfig;
use crate::error::{RenderError, SampleError};
use crate::pipeline::{ProjectState, Sample};
use crate::render::{self, RenderMode, Renders, MIX_LABEL};
use crate::sequencer::{ChannelSnapshot, SchedulerHandle, SchedulerMessage, SchedulerUpdate, TriggerEvent};
use crate::shared::{ChannelId, PunchIn, SceneId};

pub struct Middle {
    pub state: ProjectState,
    config: EngineConfig,
    cache: Arc<SampleCache>,
    sink: Box<dyn AudioSink>,
    scheduler: SchedulerHandle,
    ids: SampleIds,
    punch_in: PunchIn,
    repeat_origin: Option<usize>,
    preview_id: Option<SampleId>,
}

impl Middle {
    pub fn new(state: ProjectState, config: EngineConfig, sink: Box<dyn AudioSink>) -> std::io::Result<Self> {
        let cache = Arc::new(SampleCache::new(config.render.sample_rate));
        let initial = snapshot(&state, PunchIn::None, None);
        let scheduler = SchedulerHandle::spawn(config.scheduler.clone(), initial)?;
        info!("audio sink: {}", sink.name());
        Ok(Self {
            state,
            config,
            cache,
            sink,
            scheduler,
            ids: SampleIds::default(),
            punch_in: PunchIn::None,
            repeat_origin: None,
            preview_id: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SampleCache> {
        &self.cache
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub fn punch_in(&self) -> PunchIn {
        self.punch_in
    }

    pub fn is_playing(&self) -> bool {
        self.state.sequencer.is_playing
    }

    // What the scheduler is working from right now.
    pub fn snapshot_config(&self) -> SchedulerUpdate {
        snapshot(&self.state, self.punch_in, self.repeat_origin)
    }

    fn push_update(&self) {
        self.scheduler.update(self.snapshot_config());
    }

    // ── Samples ───────────────────────────────────────────────────

    // decode (or hit the cache) and hand the buffer to the sink
    fn register(&mut self, source: &str) -> Result<(Option<SampleId>, Arc<SampleBuffer>), SampleError> {
        let buffer = self.cache.load_wav(Path::new(source))?;
        let id = self.ids.next_id();
        match self.sink.load_sample(id, Arc::clone(&buffer)) {
            Ok(()) => Ok((Some(id), buffer)),
            Err(e) => {
                warn!("{} sink refused {source}: {e}", self.sink.name());
                Ok((None, buffer))
            }
        }
    }

    fn unload(&mut self, channel: ChannelId) {
        let old = self
            .state
            .channel_mut(channel)
            .and_then(|ch| ch.sample.as_mut())
            .and_then(|s| s.sample_id.take());
        if let Some(id) = old {
            self.sink.unload_sample(id);
        }
    }

    // Binds a WAV file to a channel with fresh trims. On failure the channel is left silent.
    pub fn load_sample_into_channel(&mut self, channel: ChannelId, path: &Path) -> Result<(), SampleError> {
        if self.state.channel(channel).is_none() {
            warn!("no channel {channel}, ignoring sample {}", path.display());
            return Ok(());
        }
        self.unload(channel);
        let source = path.to_string_lossy().into_owned();

        let sample = match self.register(&source) {
            Ok((id, buffer)) => {
                let mut sample = Sample::new(source, buffer.duration_ms());
                sample.sample_id = id;
                Ok(sample)
            }
            Err(e) => {
                warn!("channel {channel}: {e}, leaving it silent");
                Err(e)
            }
        };

        if let Some(ch) = self.state.channel_mut(channel) {
            ch.sample = Some(match &sample {
                Ok(s) => s.clone(),
                Err(_) => Sample::new(path.to_string_lossy(), 0.0),
            });
        }
        self.push_update();
        sample.map(|_| ())
    }

    // Registers the samples a saved project refers to, keeping their edits.
    pub fn restore_samples(&mut self) -> usize {
        let pending: Vec<(ChannelId, String)> = self
            .state
            .channels
            .iter()
            .filter_map(|ch| {
                let s = ch.sample.as_ref()?;
                s.sample_id.is_none().then(|| (ch.id, s.source.clone()))
            })
            .collect();

        let mut loaded = 0;
        for (channel, source) in pending {
            match self.register(&source) {
                Ok((id, _)) => {
                    if let Some(s) = self.state.channel_mut(channel).and_then(|c| c.sample.as_mut()) {
                        s.sample_id = id;
                        loaded += usize::from(id.is_some());
                    }
                }
                Err(e) => warn!("channel {channel}: {e}, leaving it silent"),
            }
        }
        self.push_update();
        loaded
    }

    pub fn clear_channel_sample(&mut self, channel: ChannelId) {
        self.unload(channel);
        if let Some(ch) = self.state.channel_mut(channel) {
            ch.sample = None;
        }
        self.push_update();
    }

    // ── Transport ─────────────────────────────────────────────────

    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }
        self.state.sequencer.is_playing = true;
        self.push_update();
        self.scheduler.start();
    }

    pub fn stop(&mut self) {
        self.state.sequencer.is_playing = false;
        self.punch_in = PunchIn::None;
        self.repeat_origin = None;
        self.scheduler.stop();
        self.push_update();
    }

    // Holds a punch-in effect. Ignored while stopped.
    pub fn punch_in_press(&mut self, effect: PunchIn) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.punch_in = effect;
        self.repeat_origin = (effect == PunchIn::Repeat).then_some(self.state.sequencer.current_step);
        debug!("punch-in {}", effect.label());
        self.push_update();
        true
    }

    pub fn punch_in_release(&mut self) {
        if self.punch_in == PunchIn::None {
            return;
        }
        self.punch_in = PunchIn::None;
        self.repeat_origin = None;
        self.push_update();
    }

    // ── Edits ─────────────────────────────────────────────────────

    pub fn set_bpm(&mut self, bpm: f64) {
        self.state.sequencer.set_bpm(bpm);
        self.push_update();
    }

    pub fn set_swing(&mut self, swing: f64) {
        self.state.sequencer.set_swing(swing);
        self.push_update();
    }

    pub fn set_step_count(&mut self, count: usize) {
        self.state.set_step_count(count);
        self.push_update();
    }

    pub fn toggle_step(&mut self, channel: ChannelId, index: usize) {
        if let Some(ch) = self.state.channel_mut(channel) {
            ch.pattern.toggle_step(index);
            self.push_update();
        }
    }

    pub fn toggle_triplet_step(&mut self, channel: ChannelId, index: usize) {
        if let Some(ch) = self.state.channel_mut(channel) {
            ch.pattern.toggle_triplet(index);
            self.push_update();
        }
    }

    // pitch is read when triggers are forwarded, the scheduler doesn't need it
    pub fn set_step_pitch(&mut self, channel: ChannelId, index: usize, semitones: f32) {
        if let Some(ch) = self.state.channel_mut(channel) {
            ch.pattern.set_pitch(index, semitones);
        }
    }

    pub fn set_muted(&mut self, channel: ChannelId, muted: bool) {
        if let Some(ch) = self.state.channel_mut(channel) {
            ch.muted = muted;
            self.push_update();
        }
    }

    pub fn set_solo(&mut self, channel: ChannelId, solo: bool) {
        if let Some(ch) = self.state.channel_mut(channel) {
            ch.solo = solo;
            self.push_update();
        }
    }

    pub fn set_channel_volume(&mut self, channel: ChannelId, volume: f32) {
        if let Some(ch) = self.state.channel_mut(channel) {
            ch.set_volume(volume);
        }
    }

    fn sample_mut(&mut self, channel: ChannelId) -> Option<&mut Sample> {
        self.state.channel_mut(channel)?.sample.as_mut()
    }

    pub fn set_sample_trim(&mut self, channel: ChannelId, start_ms: f64, end_ms: f64) {
        if let Some(s) = self.sample_mut(channel) {
            s.set_trim(start_ms, end_ms);
        }
    }

    pub fn set_sample_rate(&mut self, channel: ChannelId, rate: f32) {
        if let Some(s) = self.sample_mut(channel) {
            s.set_playback_rate(rate);
        }
    }

    pub fn set_sample_volume(&mut self, channel: ChannelId, volume: f32) {
        if let Some(s) = self.sample_mut(channel) {
            s.set_volume(volume);
        }
    }

    pub fn set_preserve_pitch(&mut self, channel: ChannelId, preserve: bool) {
        if let Some(s) = self.sample_mut(channel) {
            s.preserve_pitch = preserve;
        }
    }

    // ── Scenes ────────────────────────────────────────────────────

    pub fn capture_scene(&mut self, name: impl Into<String>) -> SceneId {
        self.state.capture_scene(name)
    }

    pub fn apply_scene(&mut self, id: SceneId) -> bool {
        let applied = self.state.apply_scene(id);
        if applied {
            self.push_update();
        }
        applied
    }

    pub fn remove_scene(&mut self, id: SceneId) -> bool {
        self.state.remove_scene(id)
    }

    // ── Scheduler output ──────────────────────────────────────────

    // Drains everything the timing thread has sent. Returns how many triggers reached the sink.
    pub fn pump(&mut self) -> usize {
        let mut forwarded = 0;
        while let Some(msg) = self.scheduler.try_recv() {
            match msg {
                SchedulerMessage::Triggers { issued_at, triggers } => {
                    forwarded += self.forward_triggers(issued_at, &triggers);
                }
                SchedulerMessage::Step(pos) => self.state.sequencer.set_position(pos),
            }
        }
        forwarded
    }

    // Blocks for up to `timeout` waiting for scheduler output, then drains it.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.scheduler.events().recv_timeout(timeout) {
            Ok(SchedulerMessage::Triggers { issued_at, triggers }) => {
                self.forward_triggers(issued_at, &triggers) + self.pump()
            }
            Ok(SchedulerMessage::Step(pos)) => {
                self.state.sequencer.set_position(pos);
                self.pump()
            }
            Err(_) => 0,
        }
    }

    pub(crate) fn forward_triggers(&mut self, issued_at: Instant, triggers: &[TriggerEvent]) -> usize {
        let mut forwarded = 0;
        for t in triggers {
            let Some(request) = self.request_for(issued_at, t) else {
                continue;
            };
            self.sink.schedule_sample(request);
            forwarded += 1;
        }
        forwarded
    }

    // The firing channel supplies volume; the sample channel (itself, or its
    // neighbour under swap) supplies the sample, its edits and the step pitch.
    fn request_for(&self, issued_at: Instant, t: &TriggerEvent) -> Option<ScheduleRequest> {
        let firing = self.state.channel(t.channel_id)?;
        let source = self.state.channel(t.sample_channel)?;
        let sample = source.sample.as_ref()?;
        let sample_id = sample.sample_id?;

        let semitones = if t.is_triplet { 0.0 } else { source.pattern.pitch(t.step) };
        let rate = sample.playback_rate * 2f32.powf(semitones / 12.0);
        let delay = Duration::from_secs_f64(t.delay_ms.max(0.0) / 1000.0);

        Some(ScheduleRequest {
            sample_id,
            when: issued_at + delay,
            volume: sample.volume * firing.volume,
            rate,
            preserve_pitch: sample.preserve_pitch,
            trim_start_ms: sample.trim_start_ms,
            trim_end_ms: sample.trim_end_ms,
            duration_ms: sample.trimmed_ms() / rate as f64,
        })
    }

    // ── Offline ───────────────────────────────────────────────────

    pub fn render_song(&self, mode: RenderMode) -> Result<Renders, RenderError> {
        render::render_song(
            &self.state.song_scenes(),
            &self.state.channels,
            mode,
            &self.config.render,
            &self.cache,
        )
    }

    pub fn export(&self, dir: &Path, mode: RenderMode) -> anyhow::Result<Vec<PathBuf>> {
        let renders = self.render_song(mode).context("failed to render song")?;
        let paths = render::export_wavs(dir, &renders, self.config.render.sample_rate)
            .with_context(|| format!("failed to write WAVs to {}", dir.display()))?;
        Ok(paths)
    }

    // Renders the mix and plays it through the sink right away.
    pub fn preview_song(&mut self) -> Result<(), RenderError> {
        let mut renders = self.render_song(RenderMode::Mix)?;
        let Some(frames) = renders.remove(MIX_LABEL) else {
            return Ok(());
        };
        let buffer = SampleBuffer::from_frames(frames, self.config.render.sample_rate);
        let duration_ms = buffer.duration_ms();

        if let Some(old) = self.preview_id.take() {
            self.sink.unload_sample(old);
        }
        let id = self.ids.next_id();
        if let Err(e) = self.sink.load_sample(id, Arc::new(buffer)) {
            warn!("preview not playable: {e}");
            return Ok(());
        }
        self.preview_id = Some(id);
        self.sink.schedule_sample(ScheduleRequest {
            sample_id: id,
            when: Instant::now(),
            volume: 1.0,
            rate: 1.0,
            preserve_pitch: false,
            trim_start_ms: 0.0,
            trim_end_ms: duration_ms,
            duration_ms,
        });
        Ok(())
    }
}

// cut whatever is still queued in the sink so nothing rings out after quit
impl Drop for Middle {
    fn drop(&mut self) {
        self.sink.stop_all();
    }
}

fn snapshot(state: &ProjectState, punch_in: PunchIn, repeat_origin: Option<usize>) -> SchedulerUpdate {
    let seq = &state.sequencer;
    SchedulerUpdate {
        bpm: seq.bpm,
        step_count: seq.step_count,
        swing: seq.swing,
        punch_in,
        repeat_origin,
        channels: state
            .channels
            .iter()
            .map(|ch| ChannelSnapshot {
                channel_id: ch.id,
                steps: ch.pattern.steps.clone(),
                triplet_steps: ch.pattern.triplet_steps.clone(),
                muted: ch.muted,
                solo: ch.solo,
                has_sample: ch.has_loaded_sample(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        loaded: Vec<SampleId>,
        unloaded: Vec<SampleId>,
        scheduled: Vec<ScheduleRequest>,
        stops: usize,
    }

    struct RecordingSink(Arc<Mutex<Recorded>>);

    impl AudioSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn load_sample(&mut self, id: SampleId, _buffer: Arc<SampleBuffer>) -> Result<(), SinkError> {
            self.0.lock().unwrap().loaded.push(id);
            Ok(())
        }

        fn unload_sample(&mut self, id: SampleId) {
            self.0.lock().unwrap().unloaded.push(id);
        }

        fn schedule_sample(&mut self, request: ScheduleRequest) {
            self.0.lock().unwrap().scheduled.push(request);
        }

        fn stop_all(&mut self) {
            self.0.lock().unwrap().stops += 1;
        }
    }

    fn middle() -> (Middle, Arc<Mutex<Recorded>>) {
        let rec = Arc::new(Mutex::new(Recorded::default()));
        let sink = Box::new(RecordingSink(Arc::clone(&rec)));
        let m = Middle::new(ProjectState::default(), EngineConfig::default(), sink).unwrap();
        // 100ms of silence per key, no disk needed
        for key in ["kick.wav", "snare.wav"] {
            m.cache().insert(key, SampleBuffer::from_mono(&vec![0.0; 4410], 44100));
        }
        (m, rec)
    }

    fn trigger(channel: u32, sample_channel: u32, step: usize, is_triplet: bool) -> TriggerEvent {
        TriggerEvent {
            channel_id: ChannelId(channel),
            sample_channel: ChannelId(sample_channel),
            delay_ms: 50.0,
            step,
            is_triplet,
        }
    }

    #[test]
    fn test_load_registers_with_sink_and_snapshot() {
        let (mut m, rec) = middle();
        m.load_sample_into_channel(ChannelId(0), Path::new("kick.wav")).unwrap();

        let sample = m.state.channels[0].sample.as_ref().unwrap();
        assert!((sample.duration_ms - 100.0).abs() < 1e-9);
        assert_eq!(rec.lock().unwrap().loaded.len(), 1);

        let snap = m.snapshot_config();
        assert!(snap.channels[0].has_sample);
        assert!(!snap.channels[1].has_sample);
    }

    #[test]
    fn test_replacing_a_sample_unloads_the_old_one() {
        let (mut m, rec) = middle();
        m.load_sample_into_channel(ChannelId(0), Path::new("kick.wav")).unwrap();
        m.load_sample_into_channel(ChannelId(0), Path::new("snare.wav")).unwrap();
        let rec = rec.lock().unwrap();
        assert_eq!(rec.unloaded, vec![rec.loaded[0]]);
    }

    #[test]
    fn test_failed_load_leaves_channel_silent() {
        let (mut m, rec) = middle();
        assert!(m.load_sample_into_channel(ChannelId(2), Path::new("/missing.wav")).is_err());
        assert!(!m.state.channels[2].has_loaded_sample());
        assert!(!m.snapshot_config().channels[2].has_sample);
        assert!(rec.lock().unwrap().loaded.is_empty());
    }

    #[test]
    fn test_forward_applies_volume_rate_and_pitch() {
        let (mut m, rec) = middle();
        m.load_sample_into_channel(ChannelId(0), Path::new("kick.wav")).unwrap();
        m.set_channel_volume(ChannelId(0), 0.5);
        m.set_sample_rate(ChannelId(0), 2.0);
        m.set_step_pitch(ChannelId(0), 3, 12.0);

        let issued = Instant::now();
        let n = m.forward_triggers(issued, &[trigger(0, 0, 0, false), trigger(0, 0, 3, false), trigger(0, 0, 3, true)]);
        assert_eq!(n, 3);

        let rec = rec.lock().unwrap();
        let reqs = &rec.scheduled;
        assert_eq!(reqs[0].when, issued + Duration::from_millis(50));
        assert_eq!(reqs[0].volume, 0.5);
        assert_eq!(reqs[0].rate, 2.0);
        assert_eq!(reqs[1].rate, 4.0); // an octave up on a pitched straight step
        assert_eq!(reqs[2].rate, 2.0); // triplets ignore step pitch
        assert!((reqs[0].duration_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_swap_uses_neighbour_sample_with_own_volume() {
        let (mut m, rec) = middle();
        m.load_sample_into_channel(ChannelId(1), Path::new("snare.wav")).unwrap();
        m.set_channel_volume(ChannelId(0), 0.25);
        m.forward_triggers(Instant::now(), &[trigger(0, 1, 0, false)]);

        let rec = rec.lock().unwrap();
        assert_eq!(rec.scheduled.len(), 1);
        assert_eq!(rec.scheduled[0].sample_id, rec.loaded[0]);
        assert_eq!(rec.scheduled[0].volume, 0.25);
    }

    #[test]
    fn test_triggers_without_sample_are_dropped() {
        let (mut m, rec) = middle();
        assert_eq!(m.forward_triggers(Instant::now(), &[trigger(4, 4, 0, false)]), 0);
        assert!(rec.lock().unwrap().scheduled.is_empty());
    }

    #[test]
    fn test_punch_in_only_while_playing() {
        let (mut m, _) = middle();
        assert!(!m.punch_in_press(PunchIn::Double));
        m.play();
        assert!(m.punch_in_press(PunchIn::Repeat));
        assert_eq!(m.snapshot_config().repeat_origin, Some(0));
        m.punch_in_release();
        assert_eq!(m.punch_in(), PunchIn::None);
        m.punch_in_press(PunchIn::Half);
        m.stop();
        assert_eq!(m.punch_in(), PunchIn::None);
        assert!(!m.is_playing());
    }

    #[test]
    fn test_setters_clamp() {
        let (mut m, _) = middle();
        m.set_bpm(900.0);
        m.set_swing(-5.0);
        m.set_step_count(20);
        let snap = m.snapshot_config();
        assert_eq!(snap.bpm, 240.0);
        assert_eq!(snap.swing, 0.0);
        assert_eq!(snap.step_count, 16);
        assert_eq!(snap.channels[0].steps.len(), 16);
    }

    #[test]
    fn test_playing_reaches_the_sink() {
        let (mut m, rec) = middle();
        m.load_sample_into_channel(ChannelId(0), Path::new("kick.wav")).unwrap();
        m.toggle_step(ChannelId(0), 0);
        m.play();

        let deadline = Instant::now() + Duration::from_secs(2);
        while rec.lock().unwrap().scheduled.is_empty() && Instant::now() < deadline {
            m.pump_timeout(Duration::from_millis(50));
        }
        m.stop();
        assert!(!rec.lock().unwrap().scheduled.is_empty());
    }

    #[test]
    fn test_scenes_render_through_middle() {
        let (mut m, _) = middle();
        m.load_sample_into_channel(ChannelId(0), Path::new("kick.wav")).unwrap();
        assert!(matches!(m.render_song(RenderMode::Mix), Err(RenderError::EmptySong)));

        let id = m.capture_scene("intro");
        m.set_bpm(60.0);
        assert!(m.apply_scene(id));
        assert_eq!(m.state.sequencer.bpm, 120.0);

        let out = m.render_song(RenderMode::Mix).unwrap();
        assert_eq!(out[MIX_LABEL].len(), 44100 * 4); // 2s scene plus 2s tail
    }

    #[test]
    fn test_preview_plays_the_mix() {
        let (mut m, rec) = middle();
        m.capture_scene("a");
        m.preview_song().unwrap();
        m.preview_song().unwrap();
        let rec = rec.lock().unwrap();
        assert_eq!(rec.scheduled.len(), 2);
        assert_eq!(rec.unloaded, vec![rec.loaded[0]]);
    }

    #[test]
    fn test_dropping_middle_stops_the_sink() {
        let (mut m, rec) = middle();
        m.play();
        m.stop();
        assert_eq!(rec.lock().unwrap().stops, 0);
        drop(m);
        assert_eq!(rec.lock().unwrap().stops, 1);
    }
}
