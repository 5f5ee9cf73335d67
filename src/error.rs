//! Error types for the playback core

use thiserror::Error;

use crate::model::TrackSource;

/// Failures raised by backend adapters.
///
/// An unavailable position is not an error; adapters report it as `None`.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Backend could not initialize the track
    #[error("{backend} backend failed to load track: {reason}")]
    LoadFailed { backend: TrackSource, reason: String },

    /// Remote backend was asked to load before an auth token was injected
    #[error("no auth token for the remote backend")]
    MissingToken,

    /// Remote SDK is not connected or has no usable device
    #[error("remote backend unavailable: {0}")]
    RemoteUnavailable(String),

    /// Seek outside the track; callers clamp before reaching an adapter
    #[error("seek to {requested:.2}s is outside 0..={duration:.2}s")]
    SeekOutOfRange { requested: f64, duration: f64 },

    /// Catalog entry that cannot be played
    #[error("invalid track: {0}")]
    InvalidTrack(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote API error: {0}")]
    Remote(#[from] rspotify::ClientError),
}

impl PlaybackError {
    pub fn load_failed(backend: TrackSource, reason: impl ToString) -> Self {
        PlaybackError::LoadFailed {
            backend,
            reason: reason.to_string(),
        }
    }
}

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
