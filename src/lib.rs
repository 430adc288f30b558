pub mod app;
pub mod art;
pub mod audio;
pub mod config;
pub mod error;
pub mod gate;
pub mod library;
pub mod logging;
pub mod model;
pub mod playback;
pub mod store;
