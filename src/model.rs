use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub user_pin: String,
    pub master_pin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub path: PathBuf,
    pub display_name: String,
    pub containing_folder: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

impl PlaybackStatus {
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackState {
    pub current_index: Option<usize>,
    pub status: PlaybackStatus,
    pub position_seconds: f64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub is_playing: bool,
    pub current_title: String,
    pub current_art_path: PathBuf,
    pub position_seconds: f64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_scan_roots")]
    pub scan_roots: Vec<PathBuf>,
    #[serde(default)]
    pub spatial_audio: bool,
    #[serde(default)]
    pub bass_boost: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_completion_tolerance_ms")]
    pub completion_tolerance_ms: u64,
    #[serde(default = "default_art")]
    pub default_art: PathBuf,
}

fn default_scan_roots() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) else {
        return Vec::new();
    };
    let home = PathBuf::from(home);
    ["Music", "Download", "Recordings"]
        .iter()
        .map(|dir| home.join(dir))
        .collect()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_completion_tolerance_ms() -> u64 {
    1_200
}

fn default_art() -> PathBuf {
    PathBuf::from("album_art.jpg")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_roots: default_scan_roots(),
            spatial_audio: false,
            bass_boost: false,
            poll_interval_ms: default_poll_interval_ms(),
            completion_tolerance_ms: default_completion_tolerance_ms(),
            default_art: default_art(),
        }
    }
}
