mod effects;

pub use effects::{AudioEffects, UnsupportedEffects, effects_for_platform};

use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// Polling is coarse near end of stream; a track this close to its end counts as finished.
pub const COMPLETION_TOLERANCE_SECS: f64 = 1.2;

pub trait NativePlayerPort {
    fn load(&mut self, path: &Path) -> bool;
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, seconds: f64);
    fn position(&self) -> f64;
    fn duration(&self) -> f64;
    fn set_spatial_audio(&mut self, enabled: bool) -> bool;
    fn set_bass_boost(&mut self, enabled: bool) -> bool;
    fn extract_art(&self, path: &Path, dest: &Path) -> bool;

    fn completion_tolerance(&self) -> f64 {
        COMPLETION_TOLERANCE_SECS
    }

    fn is_near_completion(&self) -> bool {
        near_completion(self.position(), self.duration(), self.completion_tolerance())
    }
}

impl<T: NativePlayerPort + ?Sized> NativePlayerPort for Box<T> {
    fn load(&mut self, path: &Path) -> bool {
        (**self).load(path)
    }

    fn play(&mut self) {
        (**self).play();
    }

    fn pause(&mut self) {
        (**self).pause();
    }

    fn stop(&mut self) {
        (**self).stop();
    }

    fn seek(&mut self, seconds: f64) {
        (**self).seek(seconds);
    }

    fn position(&self) -> f64 {
        (**self).position()
    }

    fn duration(&self) -> f64 {
        (**self).duration()
    }

    fn set_spatial_audio(&mut self, enabled: bool) -> bool {
        (**self).set_spatial_audio(enabled)
    }

    fn set_bass_boost(&mut self, enabled: bool) -> bool {
        (**self).set_bass_boost(enabled)
    }

    fn extract_art(&self, path: &Path, dest: &Path) -> bool {
        (**self).extract_art(path, dest)
    }

    fn completion_tolerance(&self) -> f64 {
        (**self).completion_tolerance()
    }

    fn is_near_completion(&self) -> bool {
        (**self).is_near_completion()
    }
}

pub fn near_completion(position: f64, duration: f64, tolerance: f64) -> bool {
    duration > 0.0 && position >= duration - tolerance
}

fn clamp_seek(seconds: f64, duration: Option<Duration>) -> Duration {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let target = Duration::from_secs_f64(seconds);
    duration.map_or(target, |duration| target.min(duration))
}

fn extract_art_logged(path: &Path, dest: &Path) -> bool {
    match crate::art::extract_art(path, dest) {
        Ok(()) => true,
        Err(err) => {
            debug!("art extraction failed: {err:#}");
            false
        }
    }
}

pub struct RodioPlayer {
    stream: OutputStream,
    sink: Sink,
    current: Option<PathBuf>,
    track_duration: Option<Duration>,
    completion_tolerance: f64,
    effects: Box<dyn AudioEffects>,
}

impl RodioPlayer {
    pub fn new() -> Result<Self> {
        let stream = Self::open_output_stream()?;
        let sink = Sink::connect_new(stream.mixer());
        let effects = effects_for_platform();
        debug!("audio effects backend: {}", effects.name());

        Ok(Self {
            stream,
            sink,
            current: None,
            track_duration: None,
            completion_tolerance: COMPLETION_TOLERANCE_SECS,
            effects,
        })
    }

    pub fn with_completion_tolerance(mut self, seconds: f64) -> Self {
        self.completion_tolerance = seconds.max(0.0);
        self
    }

    fn open_output_stream() -> Result<OutputStream> {
        let mut stream = with_silenced_stderr(|| {
            let host = rodio::cpal::default_host();
            match OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")
                .and_then(|builder| {
                    builder
                        .with_error_callback(|_| {})
                        .open_stream_or_fallback()
                        .context("failed to start default output stream")
                }) {
                Ok(stream) => Ok(stream),
                Err(default_err) => {
                    let mut candidates: Vec<String> = host
                        .output_devices()
                        .ok()
                        .into_iter()
                        .flatten()
                        .filter_map(|device| device.name().ok())
                        .collect();
                    candidates.sort_by_cached_key(|name| {
                        let lower = name.to_ascii_lowercase();
                        let rank = if lower.contains("pulse") {
                            0_u8
                        } else if lower.contains("pipewire") {
                            1_u8
                        } else if lower.contains("default") {
                            2_u8
                        } else {
                            3_u8
                        };
                        (rank, lower)
                    });
                    candidates.dedup();

                    let mut started: Option<OutputStream> = None;
                    for candidate in candidates {
                        let Some(device) = host.output_devices().ok().into_iter().flatten().find(
                            |entry| entry.name().ok().as_deref() == Some(candidate.as_str()),
                        ) else {
                            continue;
                        };
                        let opened = OutputStreamBuilder::from_device(device)
                            .context("failed to open fallback output device")
                            .and_then(|builder| {
                                builder
                                    .with_error_callback(|_| {})
                                    .open_stream_or_fallback()
                                    .context("failed to start fallback output stream")
                            });
                        if let Ok(stream) = opened {
                            started = Some(stream);
                            break;
                        }
                    }

                    started.with_context(|| {
                        format!(
                            "unable to start any audio output stream after default failed: {default_err:#}"
                        )
                    })
                }
            }
        })?;
        stream.log_on_drop(false);
        Ok(stream)
    }

    fn try_load(&mut self, path: &Path) -> Result<()> {
        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.current = None;
        self.track_duration = None;

        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        self.track_duration = source.total_duration().filter(|d| !d.is_zero());
        self.sink.append(source);
        self.sink.pause();
        self.current = Some(path.to_path_buf());
        Ok(())
    }
}

impl NativePlayerPort for RodioPlayer {
    fn load(&mut self, path: &Path) -> bool {
        match self.try_load(path) {
            Ok(()) => true,
            Err(err) => {
                warn!("load failed: {err:#}");
                false
            }
        }
    }

    fn play(&mut self) {
        if self.current.is_some() {
            self.sink.play();
        }
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.current = None;
        self.track_duration = None;
    }

    fn seek(&mut self, seconds: f64) {
        if self.current.is_none() {
            return;
        }
        let target = clamp_seek(seconds, self.track_duration);
        if let Err(err) = self.sink.try_seek(target) {
            warn!("failed to seek current track: {err:?}");
        }
    }

    fn position(&self) -> f64 {
        if self.current.is_none() {
            return 0.0;
        }
        self.sink.get_pos().as_secs_f64()
    }

    fn duration(&self) -> f64 {
        self.track_duration.map_or(0.0, |d| d.as_secs_f64())
    }

    fn set_spatial_audio(&mut self, enabled: bool) -> bool {
        self.effects.set_virtualizer(enabled)
    }

    fn set_bass_boost(&mut self, enabled: bool) -> bool {
        self.effects.set_bass_boost(enabled)
    }

    fn extract_art(&self, path: &Path, dest: &Path) -> bool {
        extract_art_logged(path, dest)
    }

    fn completion_tolerance(&self) -> f64 {
        self.completion_tolerance
    }

    fn is_near_completion(&self) -> bool {
        if self.current.is_some() && !self.sink.is_paused() && self.sink.empty() {
            return true;
        }
        near_completion(self.position(), self.duration(), self.completion_tolerance)
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

pub struct NullPlayer {
    paused: bool,
    current: Option<PathBuf>,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
    fixed_duration: Option<Duration>,
    completion_tolerance: f64,
    effects: Box<dyn AudioEffects>,
}

impl NullPlayer {
    pub fn new() -> Self {
        Self {
            paused: true,
            current: None,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
            fixed_duration: None,
            completion_tolerance: COMPLETION_TOLERANCE_SECS,
            effects: Box::new(UnsupportedEffects),
        }
    }

    pub fn with_effects(mut self, effects: Box<dyn AudioEffects>) -> Self {
        debug!("silent player effects: {}", effects.name());
        self.effects = effects;
        self
    }

    pub fn with_completion_tolerance(mut self, seconds: f64) -> Self {
        self.completion_tolerance = seconds.max(0.0);
        self
    }

    // Used for files whose length cannot be decoded.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.fixed_duration = Some(duration);
        self.track_duration = Some(duration);
        self
    }

    pub fn current_track(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.current.is_some()
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }
}

impl Default for NullPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl NativePlayerPort for NullPlayer {
    fn load(&mut self, path: &Path) -> bool {
        self.paused = true;
        self.current = Some(path.to_path_buf());
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = Self::estimate_duration(path).or(self.fixed_duration);
        true
    }

    fn play(&mut self) {
        if self.current.is_some() && self.paused {
            self.started_at = Some(Instant::now());
            self.paused = false;
        }
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn stop(&mut self) {
        self.current = None;
        self.paused = true;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
    }

    fn seek(&mut self, seconds: f64) {
        if self.current.is_none() {
            return;
        }

        self.position_offset = clamp_seek(seconds, self.track_duration);
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
    }

    fn position(&self) -> f64 {
        if self.current.is_none() {
            return 0.0;
        }
        self.current_position().as_secs_f64()
    }

    fn duration(&self) -> f64 {
        if self.current.is_none() {
            return 0.0;
        }
        self.track_duration.map_or(0.0, |d| d.as_secs_f64())
    }

    fn set_spatial_audio(&mut self, enabled: bool) -> bool {
        self.effects.set_virtualizer(enabled)
    }

    fn set_bass_boost(&mut self, enabled: bool) -> bool {
        self.effects.set_bass_boost(enabled)
    }

    fn extract_art(&self, path: &Path, dest: &Path) -> bool {
        extract_art_logged(path, dest)
    }

    fn completion_tolerance(&self) -> f64 {
        self.completion_tolerance
    }
}
