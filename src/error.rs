// Error types for the sequencer core.
//
// Nothing in the scheduling hot path returns these; they cover loading,
// rendering, encoding and persistence, which all happen outside the tick loop.

use std::path::PathBuf;

use thiserror::Error;

use crate::shared::ChannelId;

// Decoding or fetching a sample failed. The channel stays silent.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to read sample {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("unsupported sample format in {path}: {detail}")]
    Unsupported { path: PathBuf, detail: String },

    #[error("sample {0} decoded to an empty buffer")]
    Empty(String),

    // seen by callers that waited on another thread's decode of the same key
    #[error("sample {key} failed to load: {reason}")]
    Failed { key: String, reason: String },
}

// An export attempt failed. Playback state is unaffected.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("song has no scenes to render")]
    EmptySong,

    #[error("channel {0} does not exist")]
    UnknownChannel(ChannelId),

    #[error("channel {0} has no sample to render")]
    NoSample(ChannelId),

    #[error("song is {seconds:.1}s long, offline buffers are limited to {limit:.1}s")]
    TooLong { seconds: f64, limit: f64 },

    #[error(transparent)]
    Sample(#[from] SampleError),
}

#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV encoding error: {0}")]
    Hound(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audio device unavailable: {0}")]
    Device(String),

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("audio sink rejected sample: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
