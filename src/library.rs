use crate::config;
use crate::model::Track;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Music,
    Video,
    Photo,
    Document,
}

impl MediaKind {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Music => &["mp3", "m4a", "flac", "wav", "aac", "ogg"],
            Self::Video => &["mp4", "mkv", "avi"],
            Self::Photo => &["jpg", "jpeg", "png"],
            Self::Document => &["pdf", "txt", "doc"],
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(OsStr::to_str)?;
        [Self::Music, Self::Video, Self::Photo, Self::Document]
            .into_iter()
            .find(|kind| {
                kind.extensions()
                    .iter()
                    .any(|supported| ext.eq_ignore_ascii_case(supported))
            })
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [Self::Music, Self::Video, Self::Photo, Self::Document]
            .into_iter()
            .find(|kind| label.eq_ignore_ascii_case(kind.label()))
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Video => "video",
            Self::Photo => "photo",
            Self::Document => "document",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackCatalog {
    tracks: Vec<Track>,
}

impl TrackCatalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn position_of(&self, path: &Path) -> Option<usize> {
        self.tracks.iter().position(|track| track.path == path)
    }
}

impl From<Vec<Track>> for TrackCatalog {
    fn from(tracks: Vec<Track>) -> Self {
        Self::new(tracks)
    }
}

pub fn track_for_path(path: &Path) -> Track {
    let cleaned = config::strip_windows_verbatim_prefix(path);
    let display_name = cleaned
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| cleaned.display().to_string());
    let containing_folder = cleaned
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    Track {
        path: cleaned,
        display_name,
        containing_folder,
    }
}

pub fn scan_folder(root: &Path, kind: MediaKind) -> Vec<Track> {
    let mut tracks = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() || MediaKind::from_path(path) != Some(kind) {
            continue;
        }
        tracks.push(track_for_path(path));
    }

    tracks
}

pub fn scan_catalog(roots: &[PathBuf], kind: MediaKind) -> TrackCatalog {
    let mut all = Vec::new();
    for root in roots {
        let root = config::normalize_path(root);
        if !root.exists() {
            tracing::debug!("skipping missing scan root {}", root.display());
            continue;
        }
        all.extend(scan_folder(&root, kind));
    }
    tracing::info!("found {} {} files", all.len(), kind.label());
    TrackCatalog::new(all)
}
