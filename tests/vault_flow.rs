use mediavault::app::{Session, run_command};
use mediavault::audio::NullPlayer;
use mediavault::config;
use mediavault::gate::{AccessGate, RecoveryResult, RecoveryStage, VerifyResult};
use mediavault::library::{self, MediaKind};
use mediavault::model::{PlaybackStatus, Settings};
use mediavault::playback::PlaybackController;
use mediavault::store::JsonFileStore;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn seed_music(root: &Path, names: &[&str]) {
    let music = root.join("Music");
    fs::create_dir_all(&music).expect("mkdir");
    for name in names {
        fs::write(music.join(name), b"not really audio").expect("write track");
    }
}

#[test]
fn credentials_survive_reopening_the_store() {
    let dir = tempdir().expect("tempdir");
    let secrets = config::secrets_path(dir.path());

    let mut gate = AccessGate::new(JsonFileStore::new(&secrets));
    assert_eq!(gate.verify("1234"), VerifyResult::Denied);
    gate.setup("1234", "9999").expect("setup");

    let mut reopened = AccessGate::new(JsonFileStore::new(&secrets));
    assert!(reopened.is_configured());
    assert!(!reopened.is_unlocked());
    assert_eq!(reopened.verify("1234"), VerifyResult::Granted);
    assert!(reopened.is_unlocked());
}

#[test]
fn lockout_requires_master_pin() {
    let dir = tempdir().expect("tempdir");
    let mut gate = AccessGate::new(JsonFileStore::new(config::secrets_path(dir.path())));
    gate.setup("1234", "9999").expect("setup");

    assert_eq!(
        gate.begin_recovery("red"),
        RecoveryResult::Incorrect {
            attempts_remaining: 1
        }
    );
    assert_eq!(gate.begin_recovery("green"), RecoveryResult::Lockout);
    assert_eq!(gate.begin_recovery("blue"), RecoveryResult::Lockout);

    assert_eq!(gate.master_override("1234"), VerifyResult::Denied);
    assert_eq!(gate.recovery_stage(), RecoveryStage::AwaitingMasterOverride);
    assert_eq!(gate.master_override("9999"), VerifyResult::Granted);
    assert!(gate.is_unlocked());
}

#[test]
fn scanned_catalog_plays_and_wraps() {
    let dir = tempdir().expect("tempdir");
    seed_music(dir.path(), &["A.mp3", "B.flac", "C.ogg", "cover.jpg"]);

    let catalog = library::scan_catalog(&[dir.path().join("Music")], MediaKind::Music);
    assert_eq!(catalog.len(), 3);

    let player = NullPlayer::new().with_duration(Duration::from_secs(120));
    let mut controller = PlaybackController::new(player, catalog)
        .with_art_cache(config::art_cache_dir(dir.path()))
        .with_default_art("album_art.jpg");

    controller.play_at(2).expect("play C");
    assert_eq!(controller.now_playing().current_title, "C.ogg");
    assert_eq!(
        controller.now_playing().current_art_path,
        Path::new("album_art.jpg")
    );

    controller.next().expect("wrap forward");
    assert_eq!(controller.state().current_index, Some(0));
    controller.previous().expect("wrap back");
    assert_eq!(controller.state().current_index, Some(2));

    controller.seek(119.5);
    controller.tick();
    assert_eq!(controller.state().current_index, Some(0));
    assert_eq!(controller.state().status, PlaybackStatus::Playing);
}

#[test]
fn shell_session_walks_setup_unlock_and_playback() {
    let dir = tempdir().expect("tempdir");
    seed_music(dir.path(), &["one.mp3", "two.mp3"]);
    let settings = Settings {
        scan_roots: vec![dir.path().join("Music")],
        ..Settings::default()
    };
    let catalog = library::scan_catalog(&settings.scan_roots, MediaKind::Music);
    let controller = PlaybackController::new(NullPlayer::new(), catalog);
    let gate = AccessGate::new(JsonFileStore::new(config::secrets_path(dir.path())));
    let mut session = Session::new(gate, controller, settings, dir.path().to_path_buf());

    run_command(&mut session, "list");
    assert!(session.status.contains("locked"));

    run_command(&mut session, "setup 4321 8765");
    run_command(&mut session, "unlock 4321");
    assert_eq!(session.status, "Vault unlocked");

    run_command(&mut session, "play 2");
    assert_eq!(session.status, "Playing two.mp3");
    run_command(&mut session, "next");
    assert_eq!(session.controller.state().current_index, Some(0));

    run_command(&mut session, "quit");
    assert!(session.quit);
}

#[test]
fn malformed_credential_record_falls_back_to_setup() {
    let dir = tempdir().expect("tempdir");
    let secrets = config::secrets_path(dir.path());
    fs::write(&secrets, r#"{ "security": { "user_pin": 1234 } }"#).expect("seed record");

    let gate = AccessGate::new(JsonFileStore::new(&secrets));
    assert!(!gate.is_configured());

    let controller = PlaybackController::new(NullPlayer::new(), library::TrackCatalog::default());
    let mut session = Session::new(gate, controller, Settings::default(), dir.path().to_path_buf());
    assert!(session.status.contains("setup"));

    run_command(&mut session, "setup 2468 1357");
    assert_eq!(session.status, "PIN saved. Use: unlock <pin>");
    run_command(&mut session, "unlock 2468");
    assert_eq!(session.status, "Vault unlocked");

    let reopened = AccessGate::new(JsonFileStore::new(&secrets));
    assert!(reopened.is_configured());
}
