// Called on startup and quit; saves the project so we can reload it later.
use std::path::{Path, PathBuf};

use log::warn;

use crate::config::EngineConfig;
use crate::error::ProjectError;
use crate::pipeline::project::ProjectState;

const BEATGRID_DIR: &str = ".beatgrid";
const PROJECT_FILE: &str = "project.json";
const CONFIG_FILE: &str = "config.json";

// <project_dir>/.beatgrid/project.json
fn project_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(BEATGRID_DIR).join(PROJECT_FILE)
}

// <project_dir>/.beatgrid/config.json
fn config_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(BEATGRID_DIR).join(CONFIG_FILE)
}

pub fn load_project(project_dir: &Path) -> Option<ProjectState> {
    let path = project_file_path(project_dir);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("ignoring unreadable project file {}: {e}", path.display());
            None
        }
    }
}

// Save the project state to disk, making the files if they don't exist already
pub fn save_project(project_dir: &Path, state: &ProjectState) -> Result<(), ProjectError> {
    let path = project_file_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?; // create .beatgrid/ if needed
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json)?;
    Ok(())
}

// Missing file means defaults; a broken one also means defaults, but loudly.
pub fn load_config(project_dir: &Path) -> EngineConfig {
    let path = config_file_path(project_dir);
    let Ok(data) = std::fs::read_to_string(&path) else {
        return EngineConfig::default();
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        warn!("ignoring unreadable config {}: {e}", path.display());
        EngineConfig::default()
    })
}

// `.wav` files directly inside `dir`, sorted by name so channel order is stable.
pub fn index_wav_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ChannelId;

    #[test]
    fn test_save_then_load_project() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ProjectState::default();
        state.channels[2].pattern.toggle_step(3);
        state.channels[2].solo = true;
        save_project(dir.path(), &state).unwrap();

        let loaded = load_project(dir.path()).unwrap();
        let ch = loaded.channel(ChannelId(2)).unwrap();
        assert!(ch.pattern.step(3));
        assert!(ch.solo);
    }

    #[test]
    fn test_missing_project_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_project(dir.path()).is_none());
    }

    #[test]
    fn test_broken_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(BEATGRID_DIR)).unwrap();
        std::fs::write(config_file_path(dir.path()), "{ not json").unwrap();
        assert_eq!(load_config(dir.path()), EngineConfig::default());
    }

    #[test]
    fn test_index_wav_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.wav", "a.WAV", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("c.wav")).unwrap();
        let names: Vec<String> = index_wav_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.WAV", "b.wav"]);
    }
}
