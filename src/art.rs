use anyhow::{Context, Result};
use image::DynamicImage;
use lofty::file::TaggedFileExt;
use lofty::picture::PictureType;
use lofty::probe::Probe;
use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_probe;

pub fn cached_art_path(cache_dir: &Path, track: &Path) -> PathBuf {
    let digest = Sha256::digest(track.to_string_lossy().as_bytes());
    let mut name = String::from("vault_cached_");
    for byte in digest.iter().take(16) {
        let _ = write!(name, "{byte:02x}");
    }
    name.push_str(".jpg");
    cache_dir.join(name)
}

pub fn embedded_cover_art(path: &Path) -> Option<Vec<u8>> {
    let stripped = crate::config::strip_windows_verbatim_prefix(path);
    lofty_cover_art(&stripped).or_else(|| symphonia_cover_art(&stripped))
}

pub fn extract_art(track: &Path, dest: &Path) -> Result<()> {
    let data = embedded_cover_art(track)
        .with_context(|| format!("no embedded art in {}", track.display()))?;
    let picture = image::load_from_memory(&data)
        .with_context(|| format!("embedded art in {} is not a valid image", track.display()))?;

    if let Some(parent) = dest.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(picture.to_rgb8())
        .save(dest)
        .with_context(|| format!("failed to write art to {}", dest.display()))
}

fn lofty_cover_art(path: &Path) -> Option<Vec<u8>> {
    let tagged_file = Probe::open(path).and_then(|entry| entry.read()).ok()?;
    let pictures: Vec<_> = tagged_file
        .tags()
        .iter()
        .flat_map(|tag| tag.pictures())
        .filter(|picture| !picture.data().is_empty())
        .collect();

    pictures
        .iter()
        .find(|picture| picture.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
        .map(|picture| picture.data().to_vec())
}

fn symphonia_cover_art(path: &Path) -> Option<Vec<u8>> {
    let Ok(file) = File::open(path) else {
        return None;
    };
    let source = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }

    let Ok(mut probed) = get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) else {
        return None;
    };

    let metadata = probed.format.metadata();
    let revision = metadata.current()?;
    let visual = revision
        .visuals()
        .iter()
        .find(|entry| !entry.data.is_empty())?;
    Some(visual.data.as_ref().to_vec())
}
