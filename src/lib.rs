pub mod analysis;
pub mod audio;
pub mod audio_api;
pub mod config;
pub mod error;
pub mod middle;
pub mod pipeline;
pub mod render;
pub mod sequencer;
pub mod shared;
pub mod synth;

pub use middle::Middle;
