use crate::art;
use crate::audio::NativePlayerPort;
use crate::error::{PlaybackError, VaultError};
use crate::library::TrackCatalog;
use crate::model::{NowPlaying, PlaybackState, PlaybackStatus, Track};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct Ticker {
    interval: Duration,
    next_due: Option<Instant>,
}

impl Ticker {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    fn schedule(&mut self, now: Instant) {
        self.next_due = Some(now + self.interval);
    }

    fn cancel(&mut self) {
        self.next_due = None;
    }

    fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_some_and(|due| now >= due)
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.next_due
            .map(|due| due.saturating_duration_since(now))
    }
}

pub struct PlaybackController<P: NativePlayerPort> {
    player: P,
    catalog: TrackCatalog,
    state: PlaybackState,
    current_title: String,
    current_art: PathBuf,
    default_art: PathBuf,
    art_cache_dir: Option<PathBuf>,
    ticker: Ticker,
    notice: String,
}

impl<P: NativePlayerPort> PlaybackController<P> {
    pub fn new(player: P, catalog: TrackCatalog) -> Self {
        let default_art = PathBuf::from("album_art.jpg");
        Self {
            player,
            catalog,
            state: PlaybackState::default(),
            current_title: String::new(),
            current_art: default_art.clone(),
            default_art,
            art_cache_dir: None,
            ticker: Ticker::new(DEFAULT_POLL_INTERVAL),
            notice: String::from("Ready"),
        }
    }

    pub fn with_default_art(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_art = path.into();
        self.current_art = self.default_art.clone();
        self
    }

    pub fn with_art_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.art_cache_dir = Some(dir.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.ticker = Ticker::new(interval.max(Duration::from_millis(10)));
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn notice(&self) -> &str {
        &self.notice
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.state
            .current_index
            .and_then(|index| self.catalog.get(index))
    }

    pub fn now_playing(&self) -> NowPlaying {
        NowPlaying {
            is_playing: self.state.status == PlaybackStatus::Playing,
            current_title: self.current_title.clone(),
            current_art_path: self.current_art.clone(),
            position_seconds: self.state.position_seconds,
            duration_seconds: self.state.duration_seconds,
        }
    }

    pub fn play_at(&mut self, index: usize) -> Result<(), PlaybackError> {
        let len = self.catalog.len();
        let Some(track) = self.catalog.get(index).cloned() else {
            let err = PlaybackError::IndexOutOfRange { index, len };
            self.set_notice(err.to_string());
            return Err(err);
        };

        self.release_current();
        self.state.status = PlaybackStatus::Loading;
        // A failed load keeps the index so `next` moves past the bad file.
        self.state.current_index = Some(index);
        self.state.position_seconds = 0.0;
        self.state.duration_seconds = 0.0;
        self.current_title = track.display_name.clone();

        if !self.player.load(&track.path) {
            self.state.status = PlaybackStatus::Idle;
            warn!("could not load {}", track.path.display());
            self.refresh_art(&track.path);
            self.set_notice(format!("Could not play {}", track.display_name));
            return Err(PlaybackError::LoadFailed {
                path: track.path.display().to_string(),
            });
        }

        self.player.play();
        self.state.status = PlaybackStatus::Playing;
        self.state.duration_seconds = self.player.duration();
        self.ticker.schedule(Instant::now());
        info!("playing {}", track.path.display());

        self.refresh_art(&track.path);
        self.set_notice(format!("Playing {}", track.display_name));
        Ok(())
    }

    pub fn toggle_play_pause(&mut self) {
        match self.state.status {
            PlaybackStatus::Playing => {
                self.player.pause();
                self.state.position_seconds = self.player.position();
                self.state.status = PlaybackStatus::Paused;
                self.ticker.cancel();
                self.set_notice("Paused");
            }
            PlaybackStatus::Paused => {
                self.player.play();
                self.state.status = PlaybackStatus::Playing;
                self.ticker.schedule(Instant::now());
                self.set_notice("Resumed");
            }
            PlaybackStatus::Idle | PlaybackStatus::Loading | PlaybackStatus::Ended => {}
        }
    }

    pub fn next(&mut self) -> Result<(), PlaybackError> {
        self.step(1)
    }

    pub fn previous(&mut self) -> Result<(), PlaybackError> {
        self.step(-1)
    }

    pub fn seek(&mut self, target_seconds: f64) {
        if !self.state.status.is_loaded() {
            return;
        }
        self.player.seek(target_seconds);
        self.state.position_seconds = self.player.position();
        self.state.duration_seconds = self.player.duration();
    }

    pub fn tick(&mut self) {
        if self.state.status != PlaybackStatus::Playing {
            self.ticker.cancel();
            return;
        }

        if self.player.is_near_completion() {
            self.state.status = PlaybackStatus::Ended;
            self.state.position_seconds = self.state.duration_seconds;
            self.ticker.cancel();
            debug!("track completed, advancing");
            if let Err(err) = self.next() {
                warn!("auto-advance failed: {err}");
                self.set_notice(err.to_string());
            }
            return;
        }

        self.state.position_seconds = self.player.position();
        self.state.duration_seconds = self.player.duration();
        self.ticker.schedule(Instant::now());
    }

    pub fn tick_due(&self, now: Instant) -> bool {
        self.ticker.is_due(now)
    }

    pub fn next_tick_in(&self, now: Instant) -> Option<Duration> {
        self.ticker.remaining(now)
    }

    pub fn stop(&mut self) {
        self.release_current();
        self.state.status = PlaybackStatus::Idle;
        self.state.position_seconds = 0.0;
        self.set_notice("Stopped");
    }

    // The current track keeps playing when the rescan still contains it.
    pub fn replace_catalog(&mut self, catalog: TrackCatalog) {
        let current_path = self.current_track().map(|track| track.path.clone());
        self.catalog = catalog;

        match current_path.and_then(|path| self.catalog.position_of(&path)) {
            Some(index) => self.state.current_index = Some(index),
            None => {
                if self.state.status.is_loaded() {
                    self.release_current();
                    self.state.status = PlaybackStatus::Idle;
                    self.state.position_seconds = 0.0;
                }
                self.state.current_index = None;
            }
        }
        self.set_notice(format!("Catalog has {} tracks", self.catalog.len()));
    }

    pub fn set_spatial_audio(&mut self, enabled: bool) -> Result<(), VaultError> {
        if self.player.set_spatial_audio(enabled) {
            self.set_notice(format!("Spatial audio {}", on_off(enabled)));
            return Ok(());
        }
        self.set_notice("Spatial audio is not available on this output");
        Err(VaultError::CapabilityUnavailable("spatial audio"))
    }

    pub fn set_bass_boost(&mut self, enabled: bool) -> Result<(), VaultError> {
        if self.player.set_bass_boost(enabled) {
            self.set_notice(format!("Bass boost {}", on_off(enabled)));
            return Ok(());
        }
        self.set_notice("Bass boost is not available on this output");
        Err(VaultError::CapabilityUnavailable("bass boost"))
    }

    fn step(&mut self, delta: i64) -> Result<(), PlaybackError> {
        let len = self.catalog.len();
        if len == 0 {
            self.set_notice("Catalog is empty");
            return Err(PlaybackError::EmptyCatalog);
        }

        let current = self.state.current_index.map_or(-1, |index| index as i64);
        let target = (current + delta).rem_euclid(len as i64) as usize;
        self.play_at(target)
    }

    fn release_current(&mut self) {
        self.ticker.cancel();
        if self.state.status != PlaybackStatus::Idle {
            self.player.stop();
        }
    }

    fn refresh_art(&mut self, track: &Path) {
        let Some(cache_dir) = self.art_cache_dir.as_deref() else {
            self.current_art = self.default_art.clone();
            return;
        };

        let dest = art::cached_art_path(cache_dir, track);
        if dest.is_file() || self.player.extract_art(track, &dest) {
            self.current_art = dest;
        } else {
            debug!("no art for {}, using placeholder", track.display());
            self.current_art = self.default_art.clone();
        }
    }

    fn set_notice(&mut self, message: impl Into<String>) {
        self.notice = message.into();
    }
}

impl<P: NativePlayerPort> Drop for PlaybackController<P> {
    fn drop(&mut self) {
        self.ticker.cancel();
        self.player.stop();
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::track_for_path;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct ScriptedPort {
        loaded: Option<PathBuf>,
        loads: Vec<PathBuf>,
        broken: HashSet<PathBuf>,
        playing: bool,
        position: f64,
        duration: f64,
        stops: usize,
        seeks: Vec<f64>,
        effects: bool,
        art: bool,
    }

    impl NativePlayerPort for ScriptedPort {
        fn load(&mut self, path: &Path) -> bool {
            self.loads.push(path.to_path_buf());
            if self.broken.contains(path) {
                self.loaded = None;
                return false;
            }
            self.loaded = Some(path.to_path_buf());
            self.position = 0.0;
            true
        }

        fn play(&mut self) {
            self.playing = self.loaded.is_some();
        }

        fn pause(&mut self) {
            self.playing = false;
        }

        fn stop(&mut self) {
            self.stops += 1;
            self.playing = false;
            self.loaded = None;
        }

        fn seek(&mut self, seconds: f64) {
            self.seeks.push(seconds);
            self.position = seconds.clamp(0.0, self.duration);
        }

        fn position(&self) -> f64 {
            self.position
        }

        fn duration(&self) -> f64 {
            self.duration
        }

        fn set_spatial_audio(&mut self, _enabled: bool) -> bool {
            self.effects
        }

        fn set_bass_boost(&mut self, _enabled: bool) -> bool {
            self.effects
        }

        fn extract_art(&self, _path: &Path, dest: &Path) -> bool {
            self.art && fs::write(dest, b"jpeg").is_ok()
        }
    }

    fn catalog(names: &[&str]) -> TrackCatalog {
        names
            .iter()
            .map(|name| track_for_path(Path::new(&format!("/vault/Music/{name}"))))
            .collect::<Vec<_>>()
            .into()
    }

    fn controller(names: &[&str]) -> PlaybackController<ScriptedPort> {
        let port = ScriptedPort {
            duration: 120.0,
            ..ScriptedPort::default()
        };
        PlaybackController::new(port, catalog(names))
    }

    #[test]
    fn new_controller_is_idle_without_a_track() {
        let controller = controller(&["a.mp3"]);
        assert_eq!(controller.state().status, PlaybackStatus::Idle);
        assert_eq!(controller.state().current_index, None);
        assert!(!controller.now_playing().is_playing);
        assert_eq!(controller.next_tick_in(Instant::now()), None);
    }

    #[test]
    fn play_at_loads_and_starts_polling() {
        let mut controller = controller(&["a.mp3", "b.mp3"]);
        controller.play_at(1).expect("play");

        assert_eq!(controller.state().status, PlaybackStatus::Playing);
        assert_eq!(controller.state().current_index, Some(1));
        assert_eq!(controller.state().duration_seconds, 120.0);
        assert_eq!(
            controller.player().loads,
            vec![PathBuf::from("/vault/Music/b.mp3")]
        );
        assert!(controller.player().playing);
        let now_playing = controller.now_playing();
        assert!(now_playing.is_playing);
        assert_eq!(now_playing.current_title, "b.mp3");
        assert!(controller.next_tick_in(Instant::now()).is_some());
    }

    #[test]
    fn play_at_rejects_out_of_range_index() {
        let mut controller = controller(&["a.mp3"]);
        let err = controller.play_at(3).expect_err("out of range");
        assert_eq!(err, PlaybackError::IndexOutOfRange { index: 3, len: 1 });
        assert_eq!(controller.state().status, PlaybackStatus::Idle);
        assert_eq!(controller.state().current_index, None);
        assert!(controller.player().loads.is_empty());
    }

    #[test]
    fn play_at_stops_previous_session_first() {
        let mut controller = controller(&["a.mp3", "b.mp3"]);
        controller.play_at(0).expect("play a");
        controller.play_at(1).expect("play b");
        assert_eq!(controller.player().stops, 1);
        assert_eq!(
            controller.player().loaded.as_deref(),
            Some(Path::new("/vault/Music/b.mp3"))
        );
    }

    #[test]
    fn load_failure_degrades_to_idle_and_reports() {
        let mut controller = controller(&["bad.mp3", "good.mp3"]);
        controller
            .player
            .broken
            .insert(PathBuf::from("/vault/Music/bad.mp3"));

        let err = controller.play_at(0).expect_err("load fails");
        assert_eq!(
            err,
            PlaybackError::LoadFailed {
                path: String::from("/vault/Music/bad.mp3")
            }
        );
        assert_eq!(controller.state().status, PlaybackStatus::Idle);
        assert!(controller.notice().contains("bad.mp3"));
        assert_eq!(controller.next_tick_in(Instant::now()), None);

        controller.next().expect("skip past the broken file");
        assert_eq!(controller.state().current_index, Some(1));
        assert_eq!(controller.state().status, PlaybackStatus::Playing);
    }

    #[test]
    fn toggle_pauses_and_resumes() {
        let mut controller = controller(&["a.mp3"]);
        controller.toggle_play_pause();
        assert_eq!(controller.state().status, PlaybackStatus::Idle);

        controller.play_at(0).expect("play");
        controller.toggle_play_pause();
        assert_eq!(controller.state().status, PlaybackStatus::Paused);
        assert!(!controller.player().playing);
        assert_eq!(controller.next_tick_in(Instant::now()), None);

        controller.toggle_play_pause();
        assert_eq!(controller.state().status, PlaybackStatus::Playing);
        assert!(controller.player().playing);
        assert!(controller.next_tick_in(Instant::now()).is_some());
    }

    #[test]
    fn navigation_wraps_in_both_directions() {
        let mut controller = controller(&["A", "B", "C"]);
        controller.play_at(2).expect("play C");

        controller.next().expect("next");
        assert_eq!(controller.state().current_index, Some(0));

        controller.previous().expect("previous");
        assert_eq!(controller.state().current_index, Some(2));
    }

    #[test]
    fn navigation_without_current_track_starts_from_minus_one() {
        let mut forward = controller(&["A", "B", "C"]);
        forward.next().expect("next");
        assert_eq!(forward.state().current_index, Some(0));

        let mut backward = controller(&["A", "B", "C"]);
        backward.previous().expect("previous");
        assert_eq!(backward.state().current_index, Some(1));
    }

    #[test]
    fn navigation_on_empty_catalog_fails_without_mutation() {
        let mut controller = controller(&[]);
        assert_eq!(controller.next(), Err(PlaybackError::EmptyCatalog));
        assert_eq!(controller.previous(), Err(PlaybackError::EmptyCatalog));
        assert_eq!(controller.state().current_index, None);
        assert_eq!(controller.state().status, PlaybackStatus::Idle);
    }

    #[test]
    fn single_track_catalog_navigation_stays_put() {
        let mut controller = controller(&["only.mp3"]);
        controller.play_at(0).expect("play");
        controller.next().expect("next");
        assert_eq!(controller.state().current_index, Some(0));
        controller.previous().expect("previous");
        assert_eq!(controller.state().current_index, Some(0));
    }

    #[test]
    fn seek_is_ignored_without_loaded_track() {
        let mut controller = controller(&["a.mp3"]);
        controller.seek(30.0);
        assert!(controller.player().seeks.is_empty());

        controller.play_at(0).expect("play");
        controller.seek(30.0);
        assert_eq!(controller.player().seeks, vec![30.0]);
        assert_eq!(controller.state().position_seconds, 30.0);

        controller.toggle_play_pause();
        controller.seek(500.0);
        assert_eq!(controller.state().position_seconds, 120.0);
    }

    #[test]
    fn tick_updates_position_while_playing() {
        let mut controller = controller(&["A", "B"]);
        controller.play_at(0).expect("play");
        controller.player.position = 42.0;

        controller.tick();
        assert_eq!(controller.state().position_seconds, 42.0);
        assert_eq!(controller.state().current_index, Some(0));
        assert!(controller.next_tick_in(Instant::now()).is_some());
    }

    #[test]
    fn tick_near_end_advances_to_next_track() {
        let mut controller = controller(&["A", "B", "C"]);
        controller.play_at(0).expect("play");
        controller.player.position = 119.0;

        controller.tick();
        assert_eq!(controller.state().current_index, Some(1));
        assert_eq!(controller.state().status, PlaybackStatus::Playing);
        assert_eq!(
            controller.player().loaded.as_deref(),
            Some(Path::new("/vault/Music/B"))
        );
    }

    #[test]
    fn tick_outside_tolerance_does_not_advance() {
        let mut controller = controller(&["A", "B"]);
        controller.play_at(0).expect("play");
        controller.player.position = 118.0;

        controller.tick();
        assert_eq!(controller.state().current_index, Some(0));
    }

    #[test]
    fn tick_is_inert_unless_playing() {
        let mut controller = controller(&["A", "B"]);
        controller.play_at(0).expect("play");
        controller.toggle_play_pause();
        controller.player.position = 119.5;

        controller.tick();
        assert_eq!(controller.state().current_index, Some(0));
        assert_eq!(controller.state().status, PlaybackStatus::Paused);
    }

    #[test]
    fn stop_releases_player_and_cancels_polling() {
        let mut controller = controller(&["A"]);
        controller.play_at(0).expect("play");
        controller.stop();
        assert_eq!(controller.state().status, PlaybackStatus::Idle);
        assert_eq!(controller.player().loaded, None);
        assert!(!controller.tick_due(Instant::now() + Duration::from_secs(5)));
    }

    #[test]
    fn tick_becomes_due_after_interval() {
        let mut controller =
            controller(&["A"]).with_poll_interval(Duration::from_millis(200));
        controller.play_at(0).expect("play");
        let now = Instant::now();
        assert!(!controller.tick_due(now));
        assert!(controller.tick_due(now + Duration::from_millis(250)));
    }

    #[test]
    fn replace_catalog_remaps_or_stops_current_track() {
        let mut controller = controller(&["A", "B"]);
        controller.play_at(1).expect("play B");

        controller.replace_catalog(catalog(&["B", "C"]));
        assert_eq!(controller.state().current_index, Some(0));
        assert_eq!(controller.state().status, PlaybackStatus::Playing);

        controller.replace_catalog(catalog(&["C"]));
        assert_eq!(controller.state().current_index, None);
        assert_eq!(controller.state().status, PlaybackStatus::Idle);
    }

    #[test]
    fn missing_effects_report_capability_unavailable() {
        let mut controller = controller(&["A"]);
        let err = controller.set_spatial_audio(true).expect_err("no effects");
        assert!(matches!(
            err,
            VaultError::CapabilityUnavailable("spatial audio")
        ));
        assert!(controller.set_bass_boost(true).is_err());

        controller.player.effects = true;
        controller.set_spatial_audio(true).expect("spatial");
        assert_eq!(controller.notice(), "Spatial audio on");
    }

    #[test]
    fn art_falls_back_to_placeholder() {
        let dir = tempdir().expect("tempdir");
        let mut controller = controller(&["A", "B"])
            .with_art_cache(dir.path())
            .with_default_art("placeholder.jpg");

        controller.play_at(0).expect("play");
        assert_eq!(
            controller.now_playing().current_art_path,
            PathBuf::from("placeholder.jpg")
        );
        assert_eq!(controller.state().status, PlaybackStatus::Playing);

        controller.player.art = true;
        controller.play_at(1).expect("play");
        let art = controller.now_playing().current_art_path;
        assert!(art.starts_with(dir.path()));
        assert!(art.is_file());
    }

    proptest::proptest! {
        #[test]
        fn next_then_previous_returns_to_start(len in 1usize..30, start in 0usize..30) {
            let names: Vec<String> = (0..len).map(|n| format!("{n}.mp3")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let mut controller = controller(&refs);
            let start = start % len;
            controller.play_at(start).expect("play");

            controller.next().expect("next");
            controller.previous().expect("previous");
            proptest::prop_assert_eq!(controller.state().current_index, Some(start));
        }

        #[test]
        fn playing_index_stays_in_bounds(ops in proptest::collection::vec(0u8..6, 1..120)) {
            let mut controller = controller(&["A", "B", "C", "D"]);
            for op in ops {
                match op {
                    0 => { let _ = controller.next(); }
                    1 => { let _ = controller.previous(); }
                    2 => controller.toggle_play_pause(),
                    3 => {
                        controller.player.position = 119.5;
                        controller.tick();
                    }
                    4 => controller.seek(60.0),
                    _ => controller.stop(),
                }
                let state = controller.state();
                if state.status.is_loaded() {
                    let index = state.current_index.expect("loaded track has an index");
                    proptest::prop_assert!(index < controller.catalog().len());
                }
            }
        }
    }
}
