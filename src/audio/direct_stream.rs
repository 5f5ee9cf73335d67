//! Direct HTTP stream adapter
//!
//! Buffers the whole stream before reporting readiness, then drives playback
//! from a local playout clock. The stream duration is measured from the
//! buffered size because catalog durations for these streams are unreliable.

use std::sync::Arc;
use std::time::Duration;
use reqwest::Url;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::{PlaybackError, Result};
use crate::model::{clamp_position, AdapterReadiness, Track, TrackSource};
use super::clock::PlayoutClock;
use super::{AdapterEvent, AdapterEventSender, Generation};

const CLIENT_ID_PARAM: &str = "client_id";

#[derive(Default)]
struct DirectState {
    generation: Option<Generation>,
    readiness: AdapterReadiness,
    clock: PlayoutClock,
    volume: f32,
    load_token: Option<CancellationToken>,
    end_timer: Option<CancellationToken>,
}

impl DirectState {
    /// Generation of a fully loaded track, if any
    fn loaded_generation(&self) -> Option<Generation> {
        self.generation.filter(|_| self.readiness.is_loaded)
    }

    fn cancel_end_timer(&mut self) {
        if let Some(timer) = self.end_timer.take() {
            timer.cancel();
        }
    }

    fn reset(&mut self, generation: Option<Generation>) {
        if let Some(token) = self.load_token.take() {
            token.cancel();
        }
        self.cancel_end_timer();
        self.clock.reset();
        self.readiness = AdapterReadiness::default();
        self.generation = generation;
    }
}

#[derive(Clone)]
pub struct DirectStreamAdapter {
    http: reqwest::Client,
    client_id: String,
    bitrate_kbps: u32,
    events: AdapterEventSender,
    inner: Arc<Mutex<DirectState>>,
}

impl DirectStreamAdapter {
    pub fn new(config: &AppConfig, events: AdapterEventSender) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            bitrate_kbps: config.stream_bitrate_kbps.max(1),
            events,
            inner: Arc::new(Mutex::new(DirectState {
                volume: 1.0,
                ..Default::default()
            })),
        })
    }

    fn stream_url(&self, locator: &str) -> Result<Url> {
        let mut url = Url::parse(locator)
            .map_err(|e| PlaybackError::InvalidTrack(format!("{locator}: {e}")))?;
        url.query_pairs_mut().append_pair(CLIENT_ID_PARAM, &self.client_id);
        Ok(url)
    }

    fn measure_duration(&self, buffered_bytes: usize) -> f64 {
        buffered_bytes as f64 * 8.0 / (self.bitrate_kbps as f64 * 1000.0)
    }

    pub async fn load(&self, track: &Track, generation: Generation) {
        let token = CancellationToken::new();
        {
            let mut state = self.inner.lock().await;
            state.reset(Some(generation));
            state.load_token = Some(token.clone());
        }

        let url = match self.stream_url(&track.locator) {
            Ok(url) => url,
            Err(e) => {
                self.finish_load(generation, Err(e)).await;
                return;
            }
        };

        tracing::debug!(track_id = %track.id, %generation, "Buffering direct stream");
        let adapter = self.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(%generation, "Direct stream load cancelled");
                    return;
                }
                result = adapter.fetch(url) => result,
            };
            adapter.finish_load(generation, result).await;
        });
    }

    async fn fetch(&self, url: Url) -> Result<usize> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        Ok(body.len())
    }

    async fn finish_load(&self, generation: Generation, result: Result<usize>) {
        let mut state = self.inner.lock().await;
        if state.generation != Some(generation) {
            tracing::debug!(%generation, "Discarding late direct stream load result");
            return;
        }
        state.load_token = None;

        let event = match result {
            Ok(0) => {
                state.generation = None;
                AdapterEvent::LoadFailed {
                    source: TrackSource::DirectStream,
                    generation,
                    error: PlaybackError::load_failed(TrackSource::DirectStream, "stream is empty"),
                }
            }
            Ok(bytes) => {
                let duration = self.measure_duration(bytes);
                state.clock.set_duration(duration);
                state.readiness = AdapterReadiness::ready();
                tracing::info!(%generation, bytes, duration, "Direct stream buffered");
                AdapterEvent::Loaded {
                    source: TrackSource::DirectStream,
                    generation,
                    duration: Some(duration),
                }
            }
            Err(e) => {
                state.generation = None;
                tracing::warn!(%generation, error = %e, "Direct stream failed to load");
                let error = match e {
                    load_failed @ PlaybackError::LoadFailed { .. } => load_failed,
                    other => PlaybackError::load_failed(TrackSource::DirectStream, other),
                };
                AdapterEvent::LoadFailed {
                    source: TrackSource::DirectStream,
                    generation,
                    error,
                }
            }
        };
        drop(state);

        if self.events.send(event).is_err() {
            tracing::debug!("Adapter event receiver dropped");
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
        state.clock.start();
        self.arm_end_timer(&mut state, generation);
        tracing::debug!(%generation, position = state.clock.position(), volume = state.volume, "Direct stream playing");
    }

    pub async fn pause(&self) {
        let mut state = self.inner.lock().await;
        if state.loaded_generation().is_none() || !state.clock.is_running() {
            return;
        }
        state.clock.stop();
        state.cancel_end_timer();
        tracing::debug!(position = state.clock.position(), "Direct stream paused");
    }

    pub async fn seek(&self, position: f64) {
        let mut state = self.inner.lock().await;
        let Some(generation) = state.loaded_generation() else {
            return;
        };

        let duration = state.clock.duration();
        let target = clamp_position(position, duration);
        if target != position {
            tracing::warn!(
                error = %PlaybackError::SeekOutOfRange { requested: position, duration },
                "Clamping out-of-range seek"
            );
        }

        state.clock.set_position(target);
        if state.clock.is_running() {
            self.arm_end_timer(&mut state, generation);
        }
    }

    pub async fn get_position(&self) -> Option<f64> {
        let state = self.inner.lock().await;
        if !state.readiness.is_ready {
            return None;
        }
        Some(state.clock.position())
    }

    pub async fn readiness(&self) -> AdapterReadiness {
        self.inner.lock().await.readiness
    }

    pub async fn set_volume(&self, volume: f32) {
        self.inner.lock().await.volume = volume.clamp(0.0, 1.0);
    }

    pub async fn stop(&self) {
        let mut state = self.inner.lock().await;
        if state.generation.is_some() {
            tracing::debug!("Stopping direct stream");
        }
        state.reset(None);
    }

    /// Schedule the end-of-track notification for the remaining playout time
    fn arm_end_timer(&self, state: &mut DirectState, generation: Generation) {
        state.cancel_end_timer();
        let timer = CancellationToken::new();
        state.end_timer = Some(timer.clone());

        let remaining = Duration::from_secs_f64(state.clock.remaining());
        let adapter = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => return,
                _ = tokio::time::sleep(remaining) => {}
            }

            let mut state = adapter.inner.lock().await;
            if timer.is_cancelled() || state.loaded_generation() != Some(generation) {
                return;
            }
            state.clock.stop();
            state.end_timer = None;
            drop(state);

            tracing::debug!(%generation, "Direct stream reached end of track");
            let _ = adapter.events.send(AdapterEvent::EndOfTrack {
                source: TrackSource::DirectStream,
                generation,
            });
        });
    }

    #[cfg(test)]
    pub(crate) async fn volume(&self) -> f32 {
        self.inner.lock().await.volume
    }
}
