use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("PINs must be exactly 4 digits")]
    InvalidFormat,

    #[error("failed to persist credentials: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid security PIN")]
    Denied,

    #[error("too many failed recovery attempts, master PIN required")]
    Lockout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("track index {index} is out of range (catalog has {len} tracks)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to load {path}")]
    LoadFailed { path: String },

    #[error("catalog is empty")]
    EmptyCatalog,
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("{0} is unavailable on this output")]
    CapabilityUnavailable(&'static str),
}

impl VaultError {
    pub fn is_security_related(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Setup(_))
    }
}
