// Engine tuning knobs. Every field has a default so a partial (or missing)
// config.json still yields a usable engine; see persistence::load_config.

use serde::{Deserialize, Serialize};

use crate::shared::SAMPLE_RATE;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerSettings,
    pub render: RenderSettings,
    pub audio: AudioSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub tick_interval_ms: u64,
    pub lookahead_ms: f64,
    pub ui_throttle_ms: f64,
    pub channel_capacity: usize, // bounded queue size in each direction
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 25,
            lookahead_ms: 100.0,
            ui_throttle_ms: 100.0,
            channel_capacity: 256,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub sample_rate: u32,
    pub tail_seconds: f64, // ring-out appended after the last scene
    pub max_song_seconds: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            tail_seconds: 2.0,
            max_song_seconds: 1800.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub command_capacity: usize,
    pub max_voices: usize, // hard cap so the callback never allocates
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            command_capacity: 1024,
            max_voices: 32,
        }
    }
}
