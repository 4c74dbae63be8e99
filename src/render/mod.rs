pub mod song;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::audio::wav;
use crate::error::WavError;

pub use song::{render_song, song_duration_seconds, RenderMode, Renders, MIX_LABEL};

// labels come from user-edited channel names
fn file_stem(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "untitled".to_string() } else { cleaned }
}

// Writes each render to `<dir>/<label>.wav` as stereo PCM16, one file per label.
pub fn export_wavs(dir: &Path, renders: &Renders, sample_rate: u32) -> Result<Vec<PathBuf>, WavError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(renders.len());
    // distinct labels can sanitize to the same name; compared case-blind for
    // filesystems that fold case
    let mut taken = HashSet::new();
    for (label, frames) in renders {
        let stem = file_stem(label);
        let mut name = stem.clone();
        let mut n = 2;
        while !taken.insert(name.to_lowercase()) {
            name = format!("{stem}-{n}");
            n += 1;
        }
        let path = dir.join(format!("{name}.wav"));
        wav::write_stereo_file(&path, frames, sample_rate)?;
        info!("exported {}", path.display());
        written.push(path);
    }
    Ok(written)
}
