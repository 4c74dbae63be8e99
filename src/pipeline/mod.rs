pub mod persistence;
pub mod project;

pub use project::{Channel, Pattern, ProjectState, Sample, SequencerState, SongScene};
