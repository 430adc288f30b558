use crate::audio::{NativePlayerPort, NullPlayer, RodioPlayer};
use crate::config;
use crate::error::{AuthError, VaultError};
use crate::gate::{AccessGate, RecoveryResult, VerifyResult};
use crate::library::{self, MediaKind, TrackCatalog};
use crate::model::{PlaybackStatus, Settings};
use crate::playback::PlaybackController;
use crate::store::{CredentialStore, JsonFileStore};
use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const IDLE_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct AppStartupOptions {
    pub config_dir: Option<PathBuf>,
    pub null_audio: bool,
}

pub struct Session<S: CredentialStore, P: NativePlayerPort> {
    pub gate: AccessGate<S>,
    pub controller: PlaybackController<P>,
    pub settings: Settings,
    pub config_root: PathBuf,
    pub status: String,
    pub quit: bool,
}

impl<S: CredentialStore, P: NativePlayerPort> Session<S, P> {
    pub fn new(
        gate: AccessGate<S>,
        controller: PlaybackController<P>,
        settings: Settings,
        config_root: PathBuf,
    ) -> Self {
        let status = if gate.is_configured() {
            String::from("Vault locked. Use: unlock <pin>")
        } else {
            String::from("No PIN configured. Use: setup <pin> <master pin>")
        };
        Self {
            gate,
            controller,
            settings,
            config_root,
            status,
            quit: false,
        }
    }

    pub fn apply_effect_settings(&mut self) {
        if self.settings.spatial_audio && self.controller.set_spatial_audio(true).is_err() {
            warn!("spatial audio enabled in settings but unavailable");
        }
        if self.settings.bass_boost && self.controller.set_bass_boost(true).is_err() {
            warn!("bass boost enabled in settings but unavailable");
        }
    }

    pub fn save_settings(&mut self) {
        if let Err(err) = config::save_settings(&self.config_root, &self.settings) {
            warn!("failed to save settings: {err:#}");
            self.status = format!("save error: {err:#}");
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn report(&mut self, err: impl Into<VaultError>) {
        let err = err.into();
        if err.is_security_related() {
            warn!("{err}");
        } else {
            debug!("{err}");
        }
        self.status = err.to_string();
    }

    fn controller_status(&mut self) {
        self.status = self.controller.notice().to_string();
    }
}

pub fn run() -> Result<()> {
    run_with_startup(AppStartupOptions::default())
}

pub fn run_with_startup(options: AppStartupOptions) -> Result<()> {
    let root = match options.config_dir {
        Some(dir) => config::normalize_path(&dir),
        None => config::config_root()?,
    };
    config::ensure_dir(&root)?;
    let settings = config::load_settings(&root)?;
    let art_cache = config::art_cache_dir(&root);
    config::ensure_dir(&art_cache)?;

    let gate = AccessGate::new(JsonFileStore::new(config::secrets_path(&root)));
    let player = open_player(&settings, options.null_audio);
    let catalog = library::scan_catalog(&settings.scan_roots, MediaKind::Music);
    let controller = PlaybackController::new(player, catalog)
        .with_default_art(settings.default_art.clone())
        .with_art_cache(art_cache)
        .with_poll_interval(Duration::from_millis(settings.poll_interval_ms));

    let mut session = Session::new(gate, controller, settings, root);
    session.apply_effect_settings();
    info!("vault session started in {}", session.config_root.display());

    let lines = spawn_input_reader();
    println!("{}", session.status);
    prompt();

    loop {
        let wait = session
            .controller
            .next_tick_in(Instant::now())
            .unwrap_or(IDLE_WAIT);

        match lines.recv_timeout(wait) {
            Ok(line) => {
                run_command(&mut session, &line);
                println!("{}", session.status);
                if session.quit {
                    break;
                }
                prompt();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if session.controller.tick_due(Instant::now()) {
            poll_playback(&mut session);
        }
    }

    session.controller.stop();
    session.save_settings();
    Ok(())
}

fn open_player(settings: &Settings, null_audio: bool) -> Box<dyn NativePlayerPort> {
    let tolerance = settings.completion_tolerance_ms as f64 / 1000.0;
    if null_audio {
        return Box::new(NullPlayer::new().with_completion_tolerance(tolerance));
    }
    match RodioPlayer::new() {
        Ok(player) => Box::new(player.with_completion_tolerance(tolerance)),
        Err(err) => {
            warn!("no audio output, using silent player: {err:#}");
            Box::new(NullPlayer::new().with_completion_tolerance(tolerance))
        }
    }
}

fn spawn_input_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn poll_playback<S: CredentialStore, P: NativePlayerPort>(session: &mut Session<S, P>) {
    let before = session.controller.state().current_index;
    session.controller.tick();
    if session.controller.state().current_index != before {
        session.controller_status();
        println!("\n{}", session.status);
        prompt();
    }
}

pub fn run_command<S: CredentialStore, P: NativePlayerPort>(
    session: &mut Session<S, P>,
    raw: &str,
) {
    let input = raw.trim();
    if input.is_empty() {
        session.set_status("No command");
        return;
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => {
            if session.gate.is_unlocked() {
                session.set_status(
                    "Commands: list | browse <music|video|photo|document> | play <n> | toggle | next | prev | seek <seconds> | stop | status | spatial <on|off> | bass <on|off> | rescan | lock | quit",
                );
            } else {
                session.set_status(
                    "Commands: setup <pin> <master pin> | unlock <pin> | recover [answer] | master <pin> | quit",
                );
            }
        }
        "quit" | "exit" => {
            session.quit = true;
            session.set_status("Bye");
        }
        "setup" => setup_command(session, rest),
        "unlock" => {
            if rest.is_empty() {
                session.set_status("Usage: unlock <pin>");
            } else if !session.gate.is_configured() {
                session.set_status("No PIN configured. Use: setup <pin> <master pin>");
            } else {
                match session.gate.verify(rest).into_result() {
                    Ok(()) => session.set_status("Vault unlocked"),
                    Err(err) => session.report(err),
                }
            }
        }
        "recover" => recover_command(session, rest),
        "master" => {
            if rest.is_empty() {
                session.set_status("Usage: master <master pin>");
                return;
            }
            match session.gate.master_override(rest) {
                VerifyResult::Granted => session.set_status("Master override accepted, vault unlocked"),
                VerifyResult::Denied => session.set_status("Invalid master PIN"),
            }
        }
        _ if !session.gate.is_unlocked() => {
            session.set_status("Vault is locked. Use: unlock <pin>");
        }
        "lock" => {
            session.controller.stop();
            session.gate.lock();
            session.set_status("Vault locked");
        }
        "list" => {
            let current = session.controller.state().current_index;
            let lines = format_listing(session.controller.catalog(), current);
            if lines.is_empty() {
                session.set_status("No music found. Use: rescan");
            } else {
                session.set_status(lines.join("\n"));
            }
        }
        "browse" => {
            let Some(kind) = MediaKind::from_label(rest) else {
                session.set_status("Usage: browse <music|video|photo|document>");
                return;
            };
            let found = library::scan_catalog(&session.settings.scan_roots, kind);
            let lines = format_listing(&found, None);
            if lines.is_empty() {
                session.set_status(format!("No {} files found", kind.label()));
            } else {
                session.set_status(lines.join("\n"));
            }
        }
        "play" => {
            let Some(index) = rest
                .parse::<usize>()
                .ok()
                .and_then(|number| number.checked_sub(1))
            else {
                session.set_status("Usage: play <number>");
                return;
            };
            match session.controller.play_at(index) {
                Ok(()) => session.controller_status(),
                Err(err) => session.report(err),
            }
        }
        "toggle" | "pause" | "resume" => {
            session.controller.toggle_play_pause();
            session.controller_status();
        }
        "next" => {
            match session.controller.next() {
                Ok(()) => session.controller_status(),
                Err(err) => session.report(err),
            }
        }
        "prev" | "previous" => {
            match session.controller.previous() {
                Ok(()) => session.controller_status(),
                Err(err) => session.report(err),
            }
        }
        "seek" => {
            let Ok(seconds) = rest.parse::<f64>() else {
                session.set_status("Usage: seek <seconds>");
                return;
            };
            if !session.controller.state().status.is_loaded() {
                session.set_status("Nothing is playing");
                return;
            }
            session.controller.seek(seconds);
            let position = session.controller.state().position_seconds;
            session.set_status(format!("Seeked to {}", format_clock(position)));
        }
        "stop" => {
            session.controller.stop();
            session.controller_status();
        }
        "status" => session.set_status(describe_playback(&session.controller)),
        "spatial" | "bass" => effect_command(session, command, rest),
        "rescan" => {
            let catalog = library::scan_catalog(&session.settings.scan_roots, MediaKind::Music);
            session.controller.replace_catalog(catalog);
            session.controller_status();
        }
        _ => session.set_status("Unknown command. Use: help"),
    }
}

fn setup_command<S: CredentialStore, P: NativePlayerPort>(session: &mut Session<S, P>, rest: &str) {
    let mut pins = rest.split_whitespace();
    let (Some(user_pin), Some(master_pin), None) = (pins.next(), pins.next(), pins.next()) else {
        session.set_status("Usage: setup <pin> <master pin>");
        return;
    };
    if session.gate.is_configured() && !session.gate.is_unlocked() {
        session.set_status("PIN already configured. Unlock the vault to change it");
        return;
    }

    match session.gate.setup(user_pin, master_pin) {
        Ok(()) if session.gate.is_unlocked() => session.set_status("PIN updated"),
        Ok(()) => session.set_status("PIN saved. Use: unlock <pin>"),
        Err(err) => session.report(err),
    }
}

fn recover_command<S: CredentialStore, P: NativePlayerPort>(
    session: &mut Session<S, P>,
    rest: &str,
) {
    if rest.is_empty() {
        let question = session.gate.security_question();
        session.set_status(format!("{question} Use: recover <answer>"));
        return;
    }

    match session.gate.begin_recovery(rest) {
        RecoveryResult::Correct(pin) => session.set_status(format!("Your PIN is {pin}")),
        RecoveryResult::Incorrect { attempts_remaining } => session.set_status(format!(
            "Incorrect answer, {attempts_remaining} attempt(s) remaining"
        )),
        RecoveryResult::Lockout => session.report(AuthError::Lockout),
        RecoveryResult::NotConfigured => {
            session.set_status("No PIN configured. Use: setup <pin> <master pin>")
        }
    }
}

fn effect_command<S: CredentialStore, P: NativePlayerPort>(
    session: &mut Session<S, P>,
    effect: &str,
    rest: &str,
) {
    let enabled = match rest {
        "on" => true,
        "off" => false,
        _ => {
            session.set_status(format!("Usage: {effect} <on|off>"));
            return;
        }
    };

    let applied = if effect == "spatial" {
        session.controller.set_spatial_audio(enabled)
    } else {
        session.controller.set_bass_boost(enabled)
    };
    if let Err(err) = applied {
        session.report(err);
        return;
    }

    session.controller_status();
    if effect == "spatial" {
        session.settings.spatial_audio = enabled;
    } else {
        session.settings.bass_boost = enabled;
    }
    session.save_settings();
}

fn format_listing(catalog: &TrackCatalog, current: Option<usize>) -> Vec<String> {
    catalog
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let marker = if Some(index) == current { "*" } else { " " };
            format!(
                "{marker}{:>3}. {} [{}]",
                index + 1,
                track.display_name,
                track.containing_folder
            )
        })
        .collect()
}

fn describe_playback<P: NativePlayerPort>(controller: &PlaybackController<P>) -> String {
    let now_playing = controller.now_playing();
    let label = match controller.state().status {
        PlaybackStatus::Idle => "Idle",
        PlaybackStatus::Loading => "Loading",
        PlaybackStatus::Playing => "Playing",
        PlaybackStatus::Paused => "Paused",
        PlaybackStatus::Ended => "Ended",
    };
    if now_playing.current_title.is_empty() {
        return format!("{label} | {} tracks", controller.catalog().len());
    }
    format!(
        "{label} | {} | {} / {} | art: {}",
        now_playing.current_title,
        format_clock(now_playing.position_seconds),
        format_clock(now_playing.duration_seconds),
        now_playing.current_art_path.display()
    )
}

fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}
