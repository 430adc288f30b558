#![no_main]

use libfuzzer_sys::fuzz_target;
use mediavault::audio::NullPlayer;
use mediavault::library::{TrackCatalog, track_for_path};
use mediavault::playback::PlaybackController;
use std::path::PathBuf;
use std::time::Duration;

fuzz_target!(|data: &[u8]| {
    let len = data.len() % 32;
    let catalog: TrackCatalog = (0..len)
        .map(|idx| track_for_path(&PathBuf::from(format!("track_{idx}.mp3"))))
        .collect::<Vec<_>>()
        .into();
    let player = NullPlayer::new().with_duration(Duration::from_secs(90));
    let mut controller = PlaybackController::new(player, catalog);

    for byte in data {
        match byte % 8 {
            0 => {
                let _ = controller.play_at(usize::from(*byte) % 40);
            }
            1 => controller.toggle_play_pause(),
            2 => {
                let _ = controller.next();
            }
            3 => {
                let _ = controller.previous();
            }
            4 => controller.seek(f64::from(*byte) - 20.0),
            5 => controller.tick(),
            6 => controller.stop(),
            _ => {
                let _ = controller.now_playing();
            }
        }

        let state = controller.state();
        if state.status.is_loaded() {
            let index = state.current_index.unwrap_or(usize::MAX);
            assert!(index < controller.catalog().len());
        }
    }
});
