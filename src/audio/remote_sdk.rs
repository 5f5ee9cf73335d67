//! Remote SDK adapter
//!
//! Drives a playback device owned by the streaming service. Commands travel
//! through the service's Web API, so every effect is asynchronous: requests
//! are queued to a single worker to keep them ordered, and the position is
//! extrapolated locally and re-synchronized from the remote state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use rspotify::{
    model::{PlayableId, PlayableItem, TrackId},
    prelude::*,
    AuthCodeSpotify, Config, Token,
};
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::{PlaybackError, Result};
use crate::log_backend_result;
use crate::model::{clamp_position, AdapterReadiness, Track, TrackSource};
use super::clock::PlayoutClock;
use super::{AdapterEvent, AdapterEventSender, Generation};

/// What the remote device reports about its playback
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RemoteSnapshot {
    pub item_uri: Option<String>,
    pub progress_ms: u64,
    pub is_playing: bool,
}

/// Control surface of the remote playback service
#[async_trait]
pub trait RemoteControl: Send + Sync {
    /// Authorize with `token` and pick the device to play on
    async fn connect(&self, token: &str) -> Result<String>;
    async fn start(&self, device_id: &str, uri: &str, position_ms: u64) -> Result<()>;
    async fn resume(&self, device_id: &str) -> Result<()>;
    async fn pause(&self, device_id: &str) -> Result<()>;
    async fn seek(&self, device_id: &str, position_ms: u64) -> Result<()>;
    async fn set_volume(&self, device_id: &str, percent: u8) -> Result<()>;
    async fn snapshot(&self) -> Result<Option<RemoteSnapshot>>;
}

/// Spotify Web API implementation of [`RemoteControl`]
pub struct SpotifyRemote {
    client: AuthCodeSpotify,
    device_name: Option<String>,
}

impl SpotifyRemote {
    pub fn new(device_name: Option<String>) -> Self {
        let client = AuthCodeSpotify::with_config(
            Default::default(),
            Default::default(),
            Config {
                token_cached: false,
                token_refreshing: false,
                ..Default::default()
            },
        );
        Self { client, device_name }
    }

    async fn install_token(&self, access_token: &str) -> Result<()> {
        let token = Token {
            access_token: access_token.to_string(),
            expires_in: chrono::Duration::seconds(3600),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(3600)),
            scopes: HashSet::new(),
            refresh_token: None,
        };
        let mut guard = self
            .client
            .token
            .lock()
            .await
            .map_err(|_| PlaybackError::RemoteUnavailable("token store is poisoned".to_string()))?;
        *guard = Some(token);
        tracing::debug!("Remote token installed");
        Ok(())
    }
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(ms.min(i64::MAX as u64) as i64)
}

#[async_trait]
impl RemoteControl for SpotifyRemote {
    async fn connect(&self, token: &str) -> Result<String> {
        self.install_token(token).await?;

        let devices = self.client.device().await?;
        let preferred = self
            .device_name
            .as_deref()
            .and_then(|name| devices.iter().find(|d| d.name == name));
        let device = preferred
            .or_else(|| devices.iter().find(|d| d.is_active))
            .or_else(|| devices.first());

        match device.and_then(|d| d.id.clone().map(|id| (id, d.name.clone()))) {
            Some((id, name)) => {
                tracing::info!(device_name = %name, device_id = %id, "Remote device selected");
                Ok(id)
            }
            None => Err(PlaybackError::RemoteUnavailable("no playback device available".to_string())),
        }
    }

    async fn start(&self, device_id: &str, uri: &str, position_ms: u64) -> Result<()> {
        let id = TrackId::from_uri(uri).map_err(|e| PlaybackError::InvalidTrack(format!("{uri}: {e}")))?;
        tracing::debug!(device_id, uri, position_ms, "API: start_uris_playback");
        self.client
            .start_uris_playback(
                [PlayableId::Track(id)],
                Some(device_id),
                None,
                Some(millis(position_ms)),
            )
            .await?;
        Ok(())
    }

    async fn resume(&self, device_id: &str) -> Result<()> {
        tracing::debug!(device_id, "API: resume_playback");
        self.client.resume_playback(Some(device_id), None).await?;
        Ok(())
    }

    async fn pause(&self, device_id: &str) -> Result<()> {
        tracing::debug!(device_id, "API: pause_playback");
        self.client.pause_playback(Some(device_id)).await?;
        Ok(())
    }

    async fn seek(&self, device_id: &str, position_ms: u64) -> Result<()> {
        tracing::debug!(device_id, position_ms, "API: seek_track");
        self.client.seek_track(millis(position_ms), Some(device_id)).await?;
        Ok(())
    }

    async fn set_volume(&self, device_id: &str, percent: u8) -> Result<()> {
        tracing::debug!(device_id, percent, "API: volume");
        self.client.volume(percent, Some(device_id)).await?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<Option<RemoteSnapshot>> {
        let Some(playback) = self.client.current_playback(None, None::<Vec<_>>).await? else {
            return Ok(None);
        };

        let item_uri = match &playback.item {
            Some(PlayableItem::Track(track)) => track.id.as_ref().map(|id| id.uri()),
            Some(PlayableItem::Episode(episode)) => Some(episode.id.uri()),
            _ => None,
        };

        Ok(Some(RemoteSnapshot {
            item_uri,
            progress_ms: playback
                .progress
                .map(|d| d.num_milliseconds().max(0) as u64)
                .unwrap_or(0),
            is_playing: playback.is_playing,
        }))
    }
}

#[derive(Debug)]
enum RemoteOpKind {
    Start { uri: String, position_ms: u64 },
    Resume,
    Pause,
    Seek { position_ms: u64 },
    Volume { percent: u8 },
}

impl RemoteOpKind {
    fn name(&self) -> &'static str {
        match self {
            RemoteOpKind::Start { .. } => "start",
            RemoteOpKind::Resume => "resume",
            RemoteOpKind::Pause => "pause",
            RemoteOpKind::Seek { .. } => "seek",
            RemoteOpKind::Volume { .. } => "volume",
        }
    }

    /// Ops that leave the reported position untrustworthy until acknowledged
    fn locks_position(&self) -> bool {
        matches!(self, RemoteOpKind::Start { .. } | RemoteOpKind::Seek { .. })
    }
}

#[derive(Debug)]
struct RemoteOp {
    generation: Option<Generation>,
    device_id: String,
    kind: RemoteOpKind,
}

#[derive(Default)]
struct RemoteState {
    token: Option<String>,
    generation: Option<Generation>,
    uri: String,
    device_id: Option<String>,
    readiness: AdapterReadiness,
    clock: PlayoutClock,
    /// Track has been started on the device at least once
    started: bool,
    /// Position-affecting requests not yet acknowledged
    in_flight: u32,
    seen_progress: bool,
    volume: f32,
    load_token: Option<CancellationToken>,
    sync_token: Option<CancellationToken>,
}

impl RemoteState {
    fn loaded_generation(&self) -> Option<Generation> {
        self.generation.filter(|_| self.readiness.is_loaded)
    }

    fn reset(&mut self, generation: Option<Generation>) {
        for token in [self.load_token.take(), self.sync_token.take()].into_iter().flatten() {
            token.cancel();
        }
        self.generation = generation;
        self.uri.clear();
        self.readiness = AdapterReadiness::default();
        self.clock.reset();
        self.started = false;
        self.in_flight = 0;
        self.seen_progress = false;
    }
}

#[derive(Clone)]
pub struct RemoteSdkAdapter {
    remote: Arc<dyn RemoteControl>,
    events: AdapterEventSender,
    ops: mpsc::UnboundedSender<RemoteOp>,
    sync_interval: Duration,
    inner: Arc<Mutex<RemoteState>>,
}

impl RemoteSdkAdapter {
    /// Must be called from within the tokio runtime; spawns the request worker
    pub fn new(remote: Arc<dyn RemoteControl>, config: &AppConfig, events: AdapterEventSender) -> Self {
        let inner = Arc::new(Mutex::new(RemoteState {
            volume: 1.0,
            ..Default::default()
        }));
        let (ops, ops_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_ops(inner.clone(), remote.clone(), ops_rx));

        Self {
            remote,
            events,
            ops,
            sync_interval: config.remote_sync_interval(),
            inner,
        }
    }

    /// Inject the auth token; takes effect on the next `load`
    pub async fn set_token(&self, token: impl Into<String>) {
        self.inner.lock().await.token = Some(token.into());
    }

    pub async fn load(&self, track: &Track, generation: Generation) {
        let load_token = CancellationToken::new();
        let auth = {
            let mut state = self.inner.lock().await;
            state.reset(Some(generation));
            state.uri = track.locator.clone();
            state.clock.set_duration(track.duration_secs());
            state.load_token = Some(load_token.clone());
            state.token.clone()
        };

        let Some(auth) = auth else {
            tracing::warn!(%generation, error = %PlaybackError::MissingToken, "Remote backend cannot become ready");
            return;
        };

        tracing::debug!(track_id = %track.id, %generation, "Connecting remote backend");
        let adapter = self.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = load_token.cancelled() => {
                    tracing::debug!(%generation, "Remote load cancelled");
                    return;
                }
                result = adapter.remote.connect(&auth) => result,
            };
            adapter.finish_load(generation, result).await;
        });
    }

    async fn finish_load(&self, generation: Generation, result: Result<String>) {
        let mut state = self.inner.lock().await;
        if state.generation != Some(generation) {
            tracing::debug!(%generation, "Discarding late remote load result");
            return;
        }
        state.load_token = None;

        let event = match result {
            Ok(device_id) => {
                state.device_id = Some(device_id);
                state.readiness = AdapterReadiness::ready();
                self.spawn_sync(&mut state, generation);
                tracing::info!(%generation, "Remote backend ready");
                AdapterEvent::Loaded {
                    source: TrackSource::RemoteSdk,
                    generation,
                    duration: None,
                }
            }
            Err(e) => {
                state.generation = None;
                tracing::warn!(%generation, error = %e, "Remote backend failed to load");
                AdapterEvent::LoadFailed {
                    source: TrackSource::RemoteSdk,
                    generation,
                    error: PlaybackError::load_failed(TrackSource::RemoteSdk, e),
                }
            }
        };
        drop(state);

        if self.events.send(event).is_err() {
            tracing::debug!("Adapter event receiver dropped");
        }
    }

    fn enqueue(&self, state: &mut RemoteState, kind: RemoteOpKind) {
        let Some(device_id) = state.device_id.clone() else {
            return;
        };
        if kind.locks_position() {
            state.in_flight += 1;
        }
        let op = RemoteOp {
            generation: state.generation,
            device_id,
            kind,
        };
        if self.ops.send(op).is_err() {
            tracing::warn!("Remote request worker has stopped");
        }
    }

    pub async fn play(&self) {
        let mut state = self.inner.lock().await;
        let Some(generation) = state.loaded_generation() else {
            return;
        };
        if state.clock.is_running() {
            return;
        }

        let kind = if state.started {
            RemoteOpKind::Resume
        } else {
            state.started = true;
            RemoteOpKind::Start {
                uri: state.uri.clone(),
                position_ms: (state.clock.position() * 1000.0).round() as u64,
            }
        };
        state.clock.start();
        tracing::debug!(%generation, op = kind.name(), "Remote playback requested");
        self.enqueue(&mut state, kind);
    }

    pub async fn pause(&self) {
        let mut state = self.inner.lock().await;
        if state.loaded_generation().is_none() || !state.clock.is_running() {
            return;
        }
        state.clock.stop();
        if state.started {
            self.enqueue(&mut state, RemoteOpKind::Pause);
        }
    }

    pub async fn seek(&self, position: f64) {
        let mut state = self.inner.lock().await;
        if state.loaded_generation().is_none() {
            return;
        }

        let duration = state.clock.duration();
        let target = clamp_position(position, duration);
        if target != position {
            tracing::warn!(
                error = %PlaybackError::SeekOutOfRange { requested: position, duration },
                "Clamping out-of-range seek"
            );
        }

        state.clock.set_position(target);
        // Before the first start the offset is carried by the start request
        if state.started {
            let position_ms = (target * 1000.0).round() as u64;
            self.enqueue(&mut state, RemoteOpKind::Seek { position_ms });
        }
    }

    pub async fn get_position(&self) -> Option<f64> {
        let state = self.inner.lock().await;
        if !state.readiness.is_ready || state.in_flight > 0 {
            return None;
        }
        Some(state.clock.position())
    }

    pub async fn readiness(&self) -> AdapterReadiness {
        self.inner.lock().await.readiness
    }

    pub async fn set_volume(&self, volume: f32) {
        let mut state = self.inner.lock().await;
        state.volume = volume.clamp(0.0, 1.0);
        let percent = (state.volume * 100.0).round() as u8;
        self.enqueue(&mut state, RemoteOpKind::Volume { percent });
    }

    pub async fn stop(&self) {
        let mut state = self.inner.lock().await;
        if state.started && state.clock.is_running() {
            tracing::debug!("Pausing remote device before switching away");
            self.enqueue(&mut state, RemoteOpKind::Pause);
        }
        state.reset(None);
    }

    fn spawn_sync(&self, state: &mut RemoteState, generation: Generation) {
        let token = CancellationToken::new();
        state.sync_token = Some(token.clone());

        let adapter = self.clone();
        let period = self.sync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let snapshot = match adapter.remote.snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::trace!(error = %e, "Remote sync unavailable");
                        continue;
                    }
                };

                if adapter.apply_snapshot(generation, snapshot).await {
                    tracing::debug!(%generation, "Remote device finished the track");
                    let _ = adapter.events.send(AdapterEvent::EndOfTrack {
                        source: TrackSource::RemoteSdk,
                        generation,
                    });
                    break;
                }
            }
        });
    }

    /// Fold a remote snapshot into the local clock; returns true when the track ended
    async fn apply_snapshot(&self, generation: Generation, snapshot: Option<RemoteSnapshot>) -> bool {
        let mut state = self.inner.lock().await;
        if state.loaded_generation() != Some(generation) || !state.started || state.in_flight > 0 {
            return false;
        }
        let Some(snapshot) = snapshot else {
            return false;
        };

        let ours = snapshot.item_uri.as_deref() == Some(state.uri.as_str());
        let was_playing = state.seen_progress && state.clock.is_running();

        let ended = if ours {
            !snapshot.is_playing && snapshot.progress_ms == 0 && was_playing
        } else {
            snapshot.item_uri.is_some() && was_playing
        };

        if ended {
            let duration = state.clock.duration();
            state.clock.stop();
            state.clock.set_position(duration);
            return true;
        }

        if ours {
            if snapshot.progress_ms > 0 {
                state.seen_progress = true;
            }
            state.clock.sync(snapshot.progress_ms as f64 / 1000.0, snapshot.is_playing);
        }
        false
    }

    #[cfg(test)]
    pub(crate) async fn volume(&self) -> f32 {
        self.inner.lock().await.volume
    }
}

/// Executes remote requests one at a time, in the order they were issued
async fn run_ops(
    inner: Arc<Mutex<RemoteState>>,
    remote: Arc<dyn RemoteControl>,
    mut ops: mpsc::UnboundedReceiver<RemoteOp>,
) {
    while let Some(op) = ops.recv().await {
        let result = match &op.kind {
            RemoteOpKind::Start { uri, position_ms } => remote.start(&op.device_id, uri, *position_ms).await,
            RemoteOpKind::Resume => remote.resume(&op.device_id).await,
            RemoteOpKind::Pause => remote.pause(&op.device_id).await,
            RemoteOpKind::Seek { position_ms } => remote.seek(&op.device_id, *position_ms).await,
            RemoteOpKind::Volume { percent } => remote.set_volume(&op.device_id, *percent).await,
        };
        log_backend_result!(op.kind.name(), result, device = %op.device_id, generation = ?op.generation);

        let mut state = inner.lock().await;
        if op.generation.is_none() || state.generation != op.generation {
            continue;
        }
        if op.kind.locks_position() {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        if result.is_err() {
            match op.kind {
                RemoteOpKind::Start { .. } => {
                    state.started = false;
                    state.clock.stop();
                }
                RemoteOpKind::Resume => state.clock.stop(),
                _ => {}
            }
        }
    }
    tracing::debug!("Remote request worker stopped");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    /// In-memory stand-in for the remote service
    #[derive(Default)]
    pub(crate) struct FakeRemote {
        ops: StdMutex<Vec<String>>,
        snapshot: StdMutex<Option<RemoteSnapshot>>,
        refuse_connect: AtomicBool,
    }

    impl FakeRemote {
        pub(crate) fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }

        pub(crate) fn set_snapshot(&self, snapshot: Option<RemoteSnapshot>) {
            *self.snapshot.lock().unwrap() = snapshot;
        }

        pub(crate) fn refuse_connections(&self) {
            self.refuse_connect.store(true, Ordering::SeqCst);
        }

        fn record(&self, op: String) {
            self.ops.lock().unwrap().push(op);
        }
    }

    #[async_trait]
    impl RemoteControl for FakeRemote {
        async fn connect(&self, token: &str) -> Result<String> {
            if self.refuse_connect.load(Ordering::SeqCst) {
                return Err(PlaybackError::RemoteUnavailable("device offline".to_string()));
            }
            self.record(format!("connect {token}"));
            Ok("fake-device".to_string())
        }

        async fn start(&self, _device_id: &str, uri: &str, position_ms: u64) -> Result<()> {
            self.record(format!("start {uri} @{position_ms}"));
            Ok(())
        }

        async fn resume(&self, _device_id: &str) -> Result<()> {
            self.record("resume".to_string());
            Ok(())
        }

        async fn pause(&self, _device_id: &str) -> Result<()> {
            self.record("pause".to_string());
            Ok(())
        }

        async fn seek(&self, _device_id: &str, position_ms: u64) -> Result<()> {
            self.record(format!("seek {position_ms}"));
            Ok(())
        }

        async fn set_volume(&self, _device_id: &str, percent: u8) -> Result<()> {
            self.record(format!("volume {percent}"));
            Ok(())
        }

        async fn snapshot(&self) -> Result<Option<RemoteSnapshot>> {
            Ok(self.snapshot.lock().unwrap().clone())
        }
    }
}
