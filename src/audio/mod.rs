//! Audio module - Backend adapters
//!
//! Each playback backend is wrapped in an adapter exposing the same control
//! surface. The set of backends is closed, so adapters are variants of
//! [`Adapter`] rather than trait objects.
//!
//! - `clock`: Playout clock used to answer position queries
//! - `direct_stream`: HTTP stream buffered locally
//! - `remote_sdk`: Remote device driven through the service's Web API

mod clock;
mod direct_stream;
mod remote_sdk;

use std::fmt;
use tokio::sync::mpsc;

use crate::error::PlaybackError;
use crate::model::{AdapterReadiness, Track, TrackSource};

pub use direct_stream::DirectStreamAdapter;
pub use remote_sdk::{RemoteControl, RemoteSdkAdapter, SpotifyRemote};

#[cfg(test)]
pub(crate) use remote_sdk::testing;

/// Identity of one track selection.
///
/// Bumped by the coordinator on every track change; results carrying an older
/// generation are stale and get discarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Asynchronous notifications from adapters to the coordinator
#[derive(Debug)]
pub enum AdapterEvent {
    Loaded {
        source: TrackSource,
        generation: Generation,
        /// Duration measured by the backend itself, if it had to measure one
        duration: Option<f64>,
    },
    LoadFailed {
        source: TrackSource,
        generation: Generation,
        error: PlaybackError,
    },
    EndOfTrack {
        source: TrackSource,
        generation: Generation,
    },
}

impl AdapterEvent {
    pub fn source(&self) -> TrackSource {
        match self {
            AdapterEvent::Loaded { source, .. }
            | AdapterEvent::LoadFailed { source, .. }
            | AdapterEvent::EndOfTrack { source, .. } => *source,
        }
    }

    pub fn generation(&self) -> Generation {
        match self {
            AdapterEvent::Loaded { generation, .. }
            | AdapterEvent::LoadFailed { generation, .. }
            | AdapterEvent::EndOfTrack { generation, .. } => *generation,
        }
    }
}

pub type AdapterEventSender = mpsc::UnboundedSender<AdapterEvent>;
pub type AdapterEventReceiver = mpsc::UnboundedReceiver<AdapterEvent>;

pub fn event_channel() -> (AdapterEventSender, AdapterEventReceiver) {
    mpsc::unbounded_channel()
}

/// One playback backend behind the uniform control surface
#[derive(Clone)]
pub enum Adapter {
    DirectStream(DirectStreamAdapter),
    RemoteSdk(RemoteSdkAdapter),
}

impl Adapter {
    pub fn source(&self) -> TrackSource {
        match self {
            Adapter::DirectStream(_) => TrackSource::DirectStream,
            Adapter::RemoteSdk(_) => TrackSource::RemoteSdk,
        }
    }

    /// Start loading `track`; completion arrives later as an [`AdapterEvent`]
    pub async fn load(&self, track: &Track, generation: Generation) {
        match self {
            Adapter::DirectStream(a) => a.load(track, generation).await,
            Adapter::RemoteSdk(a) => a.load(track, generation).await,
        }
    }

    pub async fn play(&self) {
        match self {
            Adapter::DirectStream(a) => a.play().await,
            Adapter::RemoteSdk(a) => a.play().await,
        }
    }

    pub async fn pause(&self) {
        match self {
            Adapter::DirectStream(a) => a.pause().await,
            Adapter::RemoteSdk(a) => a.pause().await,
        }
    }

    /// Move to `position` seconds; callers clamp to the track first
    pub async fn seek(&self, position: f64) {
        match self {
            Adapter::DirectStream(a) => a.seek(position).await,
            Adapter::RemoteSdk(a) => a.seek(position).await,
        }
    }

    /// Best known position, `None` while the backend cannot be trusted
    pub async fn get_position(&self) -> Option<f64> {
        match self {
            Adapter::DirectStream(a) => a.get_position().await,
            Adapter::RemoteSdk(a) => a.get_position().await,
        }
    }

    pub async fn readiness(&self) -> AdapterReadiness {
        match self {
            Adapter::DirectStream(a) => a.readiness().await,
            Adapter::RemoteSdk(a) => a.readiness().await,
        }
    }

    pub async fn set_volume(&self, volume: f32) {
        match self {
            Adapter::DirectStream(a) => a.set_volume(volume).await,
            Adapter::RemoteSdk(a) => a.set_volume(volume).await,
        }
    }

    /// Drop the current track, cancelling any pending load and silencing output
    pub async fn stop(&self) {
        match self {
            Adapter::DirectStream(a) => a.stop().await,
            Adapter::RemoteSdk(a) => a.stop().await,
        }
    }
}
