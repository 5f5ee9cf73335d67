//! Playback-related types and state management

use super::track::{Track, TrackSource};

/// Lifecycle of the current track
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

/// Readiness flags of one backend adapter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterReadiness {
    /// Backend accepts seek and position queries
    pub is_ready: bool,
    /// Backend finished loading the current track
    pub is_loaded: bool,
}

impl AdapterReadiness {
    pub fn ready() -> Self {
        Self { is_ready: true, is_loaded: true }
    }
}

/// Clamp a position in seconds into `[0, duration]`.
///
/// An unknown length (zero or invalid) pins the position at the start until
/// the backend reports one.
pub fn clamp_position(position: f64, duration: f64) -> f64 {
    let upper = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
    let position = if position.is_finite() { position } else { 0.0 };
    position.clamp(0.0, upper)
}

/// Snapshot of everything the presentation layer may observe.
///
/// Only the coordinator mutates this; everyone else gets clones through the
/// watch channel.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub current_track: Option<Track>,
    pub status: PlaybackStatus,
    /// Play intent; may be true while the track is still loading
    pub is_playing: bool,
    pub volume: f32,
    /// Seconds, always within `[0, duration]`
    pub seek_position: f64,
    /// Seconds
    pub duration: f64,
    pub is_user_seeking: bool,
    pub direct_readiness: AdapterReadiness,
    pub remote_readiness: AdapterReadiness,
    pub queue_index: Option<usize>,
    pub queue_len: usize,
    pub last_error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: None,
            status: PlaybackStatus::Stopped,
            is_playing: false,
            volume: 1.0,
            seek_position: 0.0,
            duration: 0.0,
            is_user_seeking: false,
            direct_readiness: AdapterReadiness::default(),
            remote_readiness: AdapterReadiness::default(),
            queue_index: None,
            queue_len: 0,
            last_error: None,
        }
    }
}

impl PlaybackState {
    pub fn current_source(&self) -> Option<TrackSource> {
        self.current_track.as_ref().map(|t| t.source)
    }

    pub fn readiness(&self, source: TrackSource) -> AdapterReadiness {
        match source {
            TrackSource::DirectStream => self.direct_readiness,
            TrackSource::RemoteSdk => self.remote_readiness,
        }
    }

    pub(crate) fn set_readiness(&mut self, source: TrackSource, readiness: AdapterReadiness) {
        match source {
            TrackSource::DirectStream => self.direct_readiness = readiness,
            TrackSource::RemoteSdk => self.remote_readiness = readiness,
        }
    }

    /// Whether the adapter behind the current track can answer position queries
    pub fn active_ready(&self) -> bool {
        self.current_source()
            .map(|source| self.readiness(source).is_ready)
            .unwrap_or(false)
    }

    pub(crate) fn set_seek_position(&mut self, position: f64) {
        self.seek_position = clamp_position(position, self.duration);
    }

    pub(crate) fn set_duration(&mut self, duration: f64) {
        self.duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        self.seek_position = clamp_position(self.seek_position, self.duration);
    }

    /// Replace the current track wholesale and reset per-track fields
    pub(crate) fn begin_track(&mut self, track: Track, play: bool) {
        let source = track.source;
        self.duration = track.duration_secs();
        self.seek_position = 0.0;
        self.current_track = Some(track);
        self.status = PlaybackStatus::Loading;
        self.is_playing = play;
        self.is_user_seeking = false;
        self.set_readiness(source, AdapterReadiness::default());
    }
}
