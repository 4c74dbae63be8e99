// The persisted project: channels with their patterns and samples, the
// sequencer settings, and the saved scenes that make up a song.
//
// "pattern": the step/triplet/pitch grids for one channel.
// "scene": every channel's pattern plus tempo, saved under a stable id.
// "song": scenes played back to back, in arrangement order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::audio::SampleId;
use crate::shared::{
    clamp_bpm, clamp_swing, clamp_unit, snap_step_count, triplet_count, ChannelId, SceneId,
    StepPosition, DEFAULT_BPM, DEFAULT_STEP_COUNT,
};

pub const DEFAULT_CHANNEL_COUNT: usize = 8;

const MIN_PLAYBACK_RATE: f32 = 0.25;
const MAX_PLAYBACK_RATE: f32 = 4.0;

static EMPTY_PATTERN: Pattern = Pattern {
    steps: Vec::new(),
    triplet_steps: Vec::new(),
    pitches: Vec::new(),
};

/// A sample bound to a channel, with its playback edits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub source: String, // path or uri, also the decode cache key

    // Only valid for this session; reassigned when the buffer is registered with the sink.
    #[serde(skip)]
    pub sample_id: Option<SampleId>,

    pub duration_ms: f64,
    pub trim_start_ms: f64,
    pub trim_end_ms: f64,
    pub playback_rate: f32,
    pub preserve_pitch: bool,
    pub volume: f32,
}

impl Sample {
    pub fn new(source: impl Into<String>, duration_ms: f64) -> Self {
        let duration_ms = duration_ms.max(0.0);
        Self {
            source: source.into(),
            sample_id: None,
            duration_ms,
            trim_start_ms: 0.0,
            trim_end_ms: duration_ms,
            playback_rate: 1.0,
            preserve_pitch: false,
            volume: 1.0,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.sample_id.is_some()
    }

    // Keeps 0 <= start < end <= duration. A degenerate range collapses to the full sample.
    pub fn set_trim(&mut self, start_ms: f64, end_ms: f64) {
        let start = start_ms.clamp(0.0, self.duration_ms);
        let end = end_ms.clamp(0.0, self.duration_ms);
        if start < end {
            self.trim_start_ms = start;
            self.trim_end_ms = end;
        } else {
            self.trim_start_ms = 0.0;
            self.trim_end_ms = self.duration_ms;
        }
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        self.playback_rate = if rate.is_finite() && rate > 0.0 {
            rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
        } else {
            1.0
        };
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_unit(volume);
    }

    pub fn trimmed_ms(&self) -> f64 {
        self.trim_end_ms - self.trim_start_ms
    }
}

/// Step, triplet and per-step pitch grids. Reads past the end are treated as empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub steps: Vec<bool>,
    pub triplet_steps: Vec<bool>,
    #[serde(default)]
    pub pitches: Vec<f32>, // semitone offset per straight step
}

impl Pattern {
    pub fn new(step_count: usize) -> Self {
        let mut p = Self::default();
        p.resize(step_count);
        p
    }

    pub fn empty() -> &'static Pattern {
        &EMPTY_PATTERN
    }

    pub fn resize(&mut self, step_count: usize) {
        self.steps.resize(step_count, false);
        self.triplet_steps.resize(triplet_count(step_count), false);
        self.pitches.resize(step_count, 0.0);
    }

    pub fn step(&self, index: usize) -> bool {
        self.steps.get(index).copied().unwrap_or(false)
    }

    pub fn triplet(&self, index: usize) -> bool {
        self.triplet_steps.get(index).copied().unwrap_or(false)
    }

    pub fn pitch(&self, index: usize) -> f32 {
        self.pitches.get(index).copied().unwrap_or(0.0)
    }

    pub fn toggle_step(&mut self, index: usize) {
        if let Some(s) = self.steps.get_mut(index) {
            *s = !*s;
        }
    }

    pub fn toggle_triplet(&mut self, index: usize) {
        if let Some(s) = self.triplet_steps.get_mut(index) {
            *s = !*s;
        }
    }

    pub fn set_pitch(&mut self, index: usize, semitones: f32) {
        if let Some(p) = self.pitches.get_mut(index) {
            *p = if semitones.is_finite() { semitones.clamp(-24.0, 24.0) } else { 0.0 };
        }
    }

    pub fn clear(&mut self) {
        self.steps.iter_mut().for_each(|s| *s = false);
        self.triplet_steps.iter_mut().for_each(|s| *s = false);
        self.pitches.iter_mut().for_each(|p| *p = 0.0);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub pattern: Pattern,
    pub muted: bool,
    pub solo: bool,
    pub volume: f32,
    pub sample: Option<Sample>,
}

impl Channel {
    pub fn new(id: ChannelId, step_count: usize) -> Self {
        Self {
            id,
            name: format!("ch{}", id.0 + 1),
            pattern: Pattern::new(step_count),
            muted: false,
            solo: false,
            volume: 0.8,
            sample: None,
        }
    }

    // Display label used for stem file names.
    pub fn label(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            format!("channel-{}", self.id)
        } else {
            name.to_string()
        }
    }

    pub fn has_loaded_sample(&self) -> bool {
        self.sample.as_ref().is_some_and(Sample::is_loaded)
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_unit(volume);
    }

    // sample volume times channel volume, what actually reaches the mix
    pub fn combined_volume(&self) -> f32 {
        self.sample.as_ref().map_or(0.0, |s| s.volume * self.volume)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequencerState {
    pub bpm: f64,
    pub step_count: usize,
    pub swing: f64,
    #[serde(skip)]
    pub current_step: usize,
    #[serde(skip)]
    pub current_triplet_step: usize,
    #[serde(skip)]
    pub is_playing: bool,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            step_count: DEFAULT_STEP_COUNT,
            swing: 0.0,
            current_step: 0,
            current_triplet_step: 0,
            is_playing: false,
        }
    }
}

impl SequencerState {
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = clamp_bpm(bpm);
    }

    pub fn set_swing(&mut self, swing: f64) {
        self.swing = clamp_swing(swing);
    }

    pub fn set_position(&mut self, pos: StepPosition) {
        self.current_step = pos.current_step;
        self.current_triplet_step = pos.current_triplet_step;
    }

    pub fn triplet_count(&self) -> usize {
        triplet_count(self.step_count)
    }
}

/// A saved snapshot of every channel's pattern plus tempo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SongScene {
    pub id: SceneId,
    pub name: String,
    pub bpm: f64,
    pub step_count: usize,
    pub swing: f64,
    pub patterns: BTreeMap<ChannelId, Pattern>,
}

impl SongScene {
    pub fn new(id: SceneId, name: impl Into<String>, bpm: f64, step_count: usize, swing: f64) -> Self {
        Self {
            id,
            name: name.into(),
            bpm: clamp_bpm(bpm),
            step_count: snap_step_count(step_count),
            swing: clamp_swing(swing),
            patterns: BTreeMap::new(),
        }
    }

    // channels added after the scene was saved play nothing in it
    pub fn pattern_for(&self, id: ChannelId) -> &Pattern {
        self.patterns.get(&id).unwrap_or(Pattern::empty())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.step_count as f64 * (60.0 / self.bpm / 4.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub channels: Vec<Channel>,
    pub sequencer: SequencerState,
    #[serde(default)]
    pub scenes: Vec<SongScene>,
    #[serde(default)]
    pub arrangement: Vec<SceneId>, // empty means every scene, in saved order
    #[serde(default)]
    next_scene_id: u32,
}

impl Default for ProjectState {
    fn default() -> Self {
        let sequencer = SequencerState::default();
        Self {
            channels: (0..DEFAULT_CHANNEL_COUNT as u32)
                .map(|i| Channel::new(ChannelId(i), sequencer.step_count))
                .collect(),
            sequencer,
            scenes: Vec::new(),
            arrangement: Vec::new(),
            next_scene_id: 0,
        }
    }
}

impl ProjectState {
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    pub fn add_channel(&mut self) -> ChannelId {
        let id = ChannelId(self.channels.iter().map(|c| c.id.0 + 1).max().unwrap_or(0));
        self.channels.push(Channel::new(id, self.sequencer.step_count));
        id
    }

    pub fn set_step_count(&mut self, count: usize) {
        let count = snap_step_count(count);
        self.sequencer.step_count = count;
        self.sequencer.current_step %= count;
        self.sequencer.current_triplet_step %= triplet_count(count);
        for ch in &mut self.channels {
            ch.pattern.resize(count);
        }
    }

    pub fn any_solo(&self) -> bool {
        self.channels.iter().any(|c| c.solo)
    }

    // Saves the current patterns and tempo as a new scene.
    pub fn capture_scene(&mut self, name: impl Into<String>) -> SceneId {
        let id = SceneId(self.next_scene_id);
        self.next_scene_id += 1;
        let seq = &self.sequencer;
        let mut scene = SongScene::new(id, name, seq.bpm, seq.step_count, seq.swing);
        scene.patterns = self
            .channels
            .iter()
            .map(|c| (c.id, c.pattern.clone()))
            .collect();
        self.scenes.push(scene);
        id
    }

    // Restores a scene's patterns and tempo onto the live channels.
    pub fn apply_scene(&mut self, id: SceneId) -> bool {
        let Some(scene) = self.scenes.iter().find(|s| s.id == id).cloned() else {
            return false;
        };
        self.sequencer.set_bpm(scene.bpm);
        self.sequencer.set_swing(scene.swing);
        self.set_step_count(scene.step_count);
        for ch in &mut self.channels {
            let mut pattern = scene.pattern_for(ch.id).clone();
            pattern.resize(scene.step_count);
            ch.pattern = pattern;
        }
        true
    }

    pub fn remove_scene(&mut self, id: SceneId) -> bool {
        let before = self.scenes.len();
        self.scenes.retain(|s| s.id != id);
        // drops the removed id and anything else left dangling
        let scenes = &self.scenes;
        self.arrangement.retain(|&s| scenes.iter().any(|scene| scene.id == s));
        self.scenes.len() != before
    }

    // Scenes in playback order. Arrangement entries pointing at deleted scenes are skipped.
    pub fn song_scenes(&self) -> Vec<SongScene> {
        if self.arrangement.is_empty() {
            return self.scenes.clone();
        }
        self.arrangement
            .iter()
            .filter_map(|id| self.scenes.iter().find(|s| s.id == *id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_invariants_hold() {
        let mut s = Sample::new("kick.wav", 500.0);
        s.set_trim(100.0, 400.0);
        assert_eq!((s.trim_start_ms, s.trim_end_ms), (100.0, 400.0));
        s.set_trim(-10.0, 9000.0);
        assert_eq!((s.trim_start_ms, s.trim_end_ms), (0.0, 500.0));
        s.set_trim(300.0, 300.0);
        assert_eq!((s.trim_start_ms, s.trim_end_ms), (0.0, 500.0));
    }

    #[test]
    fn test_playback_rate_stays_positive() {
        let mut s = Sample::new("kick.wav", 500.0);
        s.set_playback_rate(0.0);
        assert_eq!(s.playback_rate, 1.0);
        s.set_playback_rate(-2.0);
        assert_eq!(s.playback_rate, 1.0);
        s.set_playback_rate(10.0);
        assert_eq!(s.playback_rate, MAX_PLAYBACK_RATE);
    }

    #[test]
    fn test_pattern_reads_past_end_are_empty() {
        let p = Pattern::new(8);
        assert_eq!(p.triplet_steps.len(), 12);
        assert!(!p.step(100));
        assert!(!p.triplet(100));
        assert_eq!(p.pitch(100), 0.0);
    }

    #[test]
    fn test_scene_capture_and_apply() {
        let mut state = ProjectState::default();
        state.channels[0].pattern.toggle_step(0);
        state.sequencer.set_bpm(90.0);
        let id = state.capture_scene("intro");

        state.channels[0].pattern.clear();
        state.sequencer.set_bpm(140.0);
        assert!(state.apply_scene(id));
        assert!(state.channels[0].pattern.step(0));
        assert_eq!(state.sequencer.bpm, 90.0);
        assert!(!state.apply_scene(SceneId(99)));
    }

    #[test]
    fn test_missing_channel_in_scene_is_empty() {
        let scene = SongScene::new(SceneId(0), "a", 120.0, 16, 0.0);
        assert!(!scene.pattern_for(ChannelId(7)).step(0));
        assert!((scene.duration_seconds() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_song_scenes_follow_arrangement() {
        let mut state = ProjectState::default();
        let a = state.capture_scene("a");
        let b = state.capture_scene("b");
        assert_eq!(state.song_scenes().len(), 2);
        state.arrangement = vec![b, a, b, SceneId(42)];
        let ids: Vec<SceneId> = state.song_scenes().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b, a, b]);
        state.remove_scene(b);
        assert_eq!(state.arrangement, vec![a]);
    }

    #[test]
    fn test_project_json_roundtrip_drops_session_ids() {
        let mut state = ProjectState::default();
        let mut sample = Sample::new("snare.wav", 250.0);
        sample.sample_id = Some(SampleId(3));
        state.channels[1].sample = Some(sample);
        let json = serde_json::to_string(&state).unwrap();
        let back: ProjectState = serde_json::from_str(&json).unwrap();
        let s = back.channels[1].sample.as_ref().unwrap();
        assert_eq!(s.source, "snare.wav");
        assert!(s.sample_id.is_none());
    }
}
