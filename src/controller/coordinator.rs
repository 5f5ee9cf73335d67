//! Playback coordinator
//!
//! Single owner of [`PlaybackState`]. User commands, adapter events and
//! sampler readings all arrive through one inbox and are applied one at a
//! time, so ordering problems reduce to recognising stale messages by their
//! track generation.

use tokio::sync::{mpsc, watch};

use crate::audio::{
    Adapter, AdapterEvent, AdapterEventReceiver, DirectStreamAdapter, Generation, RemoteSdkAdapter,
};
use crate::config::AppConfig;
use crate::model::{
    clamp_position, AdapterReadiness, PlayQueue, PlaybackState, PlaybackStatus, Track, TrackSource,
};
use super::sampler::{PositionSampler, Sample};
use super::{Command, PlayerHandle};

/// "Previous" restarts the current track instead when past this point
const RESTART_THRESHOLD_SECS: f64 = 3.0;

#[derive(Debug)]
pub enum CoordinatorMsg {
    Command(Command),
    Adapter(AdapterEvent),
    Sample(Sample),
}

/// Receiving ends of everything the coordinator reacts to
pub struct Inbox {
    commands: mpsc::UnboundedReceiver<Command>,
    adapter_events: AdapterEventReceiver,
    samples: mpsc::UnboundedReceiver<Sample>,
}

impl Inbox {
    /// Next message from any source; `None` once every command handle is gone
    pub async fn next(&mut self) -> Option<CoordinatorMsg> {
        tokio::select! {
            command = self.commands.recv() => command.map(CoordinatorMsg::Command),
            Some(event) = self.adapter_events.recv() => Some(CoordinatorMsg::Adapter(event)),
            Some(sample) = self.samples.recv() => Some(CoordinatorMsg::Sample(sample)),
        }
    }
}

pub struct Coordinator {
    state: PlaybackState,
    state_tx: watch::Sender<PlaybackState>,
    direct: Adapter,
    remote: Adapter,
    generation: Generation,
    sampler: PositionSampler,
    queue: PlayQueue,
}

impl Coordinator {
    pub fn new(
        config: &AppConfig,
        direct: DirectStreamAdapter,
        remote: RemoteSdkAdapter,
        adapter_events: AdapterEventReceiver,
    ) -> (Self, Inbox, PlayerHandle) {
        let state = PlaybackState {
            volume: config.initial_volume.clamp(0.0, 1.0),
            ..PlaybackState::default()
        };
        let (state_tx, state_rx) = watch::channel(state.clone());
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (samples_tx, samples) = mpsc::unbounded_channel();

        let coordinator = Self {
            state,
            state_tx,
            direct: Adapter::DirectStream(direct),
            remote: Adapter::RemoteSdk(remote),
            generation: Generation::default(),
            sampler: PositionSampler::new(config.frame_interval(), samples_tx),
            queue: PlayQueue::new(),
        };
        let inbox = Inbox {
            commands,
            adapter_events,
            samples,
        };
        (coordinator, inbox, PlayerHandle::new(commands_tx, state_rx))
    }

    pub async fn run(mut self, mut inbox: Inbox) {
        tracing::info!("Playback coordinator started");
        while let Some(msg) = inbox.next().await {
            if !self.handle(msg).await {
                break;
            }
        }
        self.shutdown().await;
        self.publish();
        tracing::info!("Playback coordinator stopped");
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Apply one message; returns false once the coordinator should stop
    pub async fn handle(&mut self, msg: CoordinatorMsg) -> bool {
        let keep_running = match msg {
            CoordinatorMsg::Command(command) => self.handle_command(command).await,
            CoordinatorMsg::Adapter(event) => {
                self.handle_adapter_event(event).await;
                true
            }
            CoordinatorMsg::Sample(sample) => {
                self.handle_sample(sample);
                true
            }
        };
        self.reconcile_sampler();
        self.publish();
        keep_running
    }

    fn adapter(&self, source: TrackSource) -> &Adapter {
        match source {
            TrackSource::DirectStream => &self.direct,
            TrackSource::RemoteSdk => &self.remote,
        }
    }

    fn publish(&mut self) {
        let state = &self.state;
        self.state_tx.send_if_modified(|published| {
            if published != state {
                *published = state.clone();
                true
            } else {
                false
            }
        });
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::SelectTrack(track) => self.select_track(track).await,
            Command::PlayPause => {
                if self.state.is_playing {
                    self.pause().await
                } else {
                    self.play().await
                }
            }
            Command::Play => self.play().await,
            Command::Pause => self.pause().await,
            Command::Next => self.next_track().await,
            Command::Previous => self.previous_track().await,
            Command::SeekRelative(delta) => self.seek_relative(delta).await,
            Command::SeekAbsolute(position) => self.seek_absolute(position).await,
            Command::BeginUserSeek => self.begin_user_seek(),
            Command::EndUserSeek(position) => self.end_user_seek(position).await,
            Command::SetVolume(volume) => self.set_volume(volume).await,
            Command::SetQueue(tracks) => self.set_queue(tracks),
            Command::SetRemoteToken(token) => self.set_remote_token(token).await,
            Command::Shutdown => {
                self.shutdown().await;
                return false;
            }
        }
        true
    }

    // ========================================================================
    // Track lifecycle
    // ========================================================================

    async fn select_track(&mut self, track: Track) {
        if track.locator.trim().is_empty() {
            tracing::warn!(track_id = %track.id, "Refusing track without a stream locator");
            self.state.last_error = Some(format!("Track {} has no stream locator", track.id));
            return;
        }
        self.state.last_error = None;
        self.queue.select(&track);
        self.start_track(track, true).await;
    }

    /// Make `track` current and start loading it on its adapter
    async fn start_track(&mut self, track: Track, play: bool) {
        self.sampler.cancel();
        self.generation = self.generation.next();
        let generation = self.generation;

        if let Some(previous) = self.state.current_source() {
            self.adapter(previous).stop().await;
            self.state.set_readiness(previous, AdapterReadiness::default());
        }

        tracing::info!(
            track_id = %track.id,
            source = %track.source,
            %generation,
            play,
            "Loading track"
        );
        self.state.begin_track(track.clone(), play);
        self.sync_queue_position();
        self.adapter(track.source).load(&track, generation).await;
    }

    async fn next_track(&mut self) {
        let play = self.state.is_playing;
        match self.queue.advance() {
            Some(track) => self.start_track(track, play).await,
            None => self.finish_queue().await,
        }
    }

    async fn previous_track(&mut self) {
        if self.state.seek_position > RESTART_THRESHOLD_SECS {
            self.seek_absolute(0.0).await;
            return;
        }
        let play = self.state.is_playing;
        match self.queue.retreat() {
            Some(track) => self.start_track(track, play).await,
            None => self.seek_absolute(0.0).await,
        }
    }

    async fn finish_queue(&mut self) {
        tracing::info!("Reached the end of the queue");
        self.sampler.cancel();
        if let Some(source) = self.state.current_source() {
            self.adapter(source).pause().await;
        }
        self.state.is_playing = false;
        self.state.status = PlaybackStatus::Stopped;
    }

    fn set_queue(&mut self, tracks: Vec<Track>) {
        tracing::debug!(count = tracks.len(), "Queue replaced");
        self.queue.replace(tracks, self.state.current_track.as_ref());
        self.sync_queue_position();
    }

    fn sync_queue_position(&mut self) {
        self.state.queue_index = self.queue.cursor();
        self.state.queue_len = self.queue.len();
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn play(&mut self) {
        let Some(track) = self.state.current_track.clone() else {
            if let Some(track) = self.queue.advance() {
                self.start_track(track, true).await;
            }
            return;
        };

        if self.state.status == PlaybackStatus::Stopped {
            self.start_track(track, true).await;
            return;
        }

        self.state.is_playing = true;
        if self.state.readiness(track.source).is_ready {
            self.adapter(track.source).play().await;
            self.state.status = PlaybackStatus::Playing;
        }
    }

    async fn pause(&mut self) {
        self.state.is_playing = false;
        let Some(source) = self.state.current_source() else {
            return;
        };
        if self.state.readiness(source).is_ready {
            self.adapter(source).pause().await;
            if self.state.status == PlaybackStatus::Playing {
                self.state.status = PlaybackStatus::Paused;
            }
        }
    }

    async fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
        self.state.volume = volume;
        self.direct.set_volume(volume).await;
        self.remote.set_volume(volume).await;
    }

    async fn set_remote_token(&mut self, token: String) {
        if let Adapter::RemoteSdk(remote) = &self.remote {
            remote.set_token(token).await;
            tracing::debug!("Remote auth token injected");
        }
    }

    async fn shutdown(&mut self) {
        self.sampler.cancel();
        self.direct.stop().await;
        self.remote.stop().await;
        self.state.is_playing = false;
        self.state.status = PlaybackStatus::Stopped;
        self.state.direct_readiness = AdapterReadiness::default();
        self.state.remote_readiness = AdapterReadiness::default();
    }

    // ========================================================================
    // Seeking
    // ========================================================================

    async fn seek_relative(&mut self, delta: f64) {
        let Some(source) = self.state.current_source() else {
            return;
        };
        let live = if self.state.readiness(source).is_ready {
            self.adapter(source).get_position().await
        } else {
            None
        };
        let base = live.unwrap_or(self.state.seek_position);
        let target = clamp_position(base + delta, self.state.duration);
        tracing::debug!(delta, base, target, "Relative seek");
        self.apply_seek(source, target).await;
    }

    async fn seek_absolute(&mut self, requested: f64) {
        let Some(source) = self.state.current_source() else {
            return;
        };
        let target = clamp_position(requested, self.state.duration);
        tracing::debug!(requested, target, "Absolute seek");
        self.apply_seek(source, target).await;
    }

    /// Send an already clamped seek to the adapter and publish it
    async fn apply_seek(&mut self, source: TrackSource, target: f64) {
        // A seek made while loading is replayed once the adapter is ready
        if self.state.readiness(source).is_ready {
            self.adapter(source).seek(target).await;
        }
        self.state.set_seek_position(target);

        // Readings taken before the seek must not overwrite it
        if self.sampler.is_running() {
            let adapter = match source {
                TrackSource::DirectStream => &self.direct,
                TrackSource::RemoteSdk => &self.remote,
            };
            self.sampler.restart(self.generation, adapter);
        }
    }

    fn begin_user_seek(&mut self) {
        if self.state.current_track.is_none() {
            return;
        }
        self.state.is_user_seeking = true;
    }

    async fn end_user_seek(&mut self, position: f64) {
        if !std::mem::replace(&mut self.state.is_user_seeking, false) {
            tracing::debug!("User seek committed without a matching begin");
        }
        self.seek_absolute(position).await;
    }

    // ========================================================================
    // Adapter events and samples
    // ========================================================================

    fn is_current(&self, source: TrackSource, generation: Generation) -> bool {
        self.generation == generation && self.state.current_source() == Some(source)
    }

    async fn handle_adapter_event(&mut self, event: AdapterEvent) {
        if !self.is_current(event.source(), event.generation()) {
            tracing::debug!(
                source = %event.source(),
                generation = %event.generation(),
                current = %self.generation,
                "Ignoring stale adapter event"
            );
            return;
        }

        match event {
            AdapterEvent::Loaded { source, duration, .. } => self.on_loaded(source, duration).await,
            AdapterEvent::LoadFailed { source, error, .. } => {
                tracing::warn!(%source, error = %error, "Track failed to load, skipping");
                self.state.last_error = Some(error.to_string());
                self.state.set_readiness(source, AdapterReadiness::default());
                self.next_track().await;
            }
            AdapterEvent::EndOfTrack { source, .. } => {
                tracing::info!(%source, generation = %self.generation, "Track finished");
                self.next_track().await;
            }
        }
    }

    async fn on_loaded(&mut self, source: TrackSource, duration: Option<f64>) {
        let readiness = self.adapter(source).readiness().await;
        self.state.set_readiness(source, readiness);
        if let Some(duration) = duration {
            tracing::debug!(catalog = self.state.duration, measured = duration, "Backend reported duration");
            self.state.set_duration(duration);
        }

        let adapter = self.adapter(source);
        if self.state.seek_position > 0.0 {
            adapter.seek(self.state.seek_position).await;
        }
        if self.state.is_playing {
            adapter.play().await;
            self.state.status = PlaybackStatus::Playing;
        } else {
            self.state.status = PlaybackStatus::Paused;
        }
        tracing::debug!(%source, status = ?self.state.status, "Track ready");
    }

    fn handle_sample(&mut self, sample: Sample) {
        if !self.sampler.is_current(&sample) {
            tracing::trace!(cycle = sample.cycle, "Dropping sample from a cancelled cycle");
            return;
        }
        if self.state.is_user_seeking {
            return;
        }
        self.state.set_seek_position(sample.position);
    }

    /// Start, keep or stop sampling for the current `is_playing && ready` condition
    fn reconcile_sampler(&mut self) {
        let Some(source) = self.state.current_source() else {
            self.sampler.cancel();
            return;
        };
        let should_run = self.state.is_playing
            && self.state.status == PlaybackStatus::Playing
            && self.state.active_ready();
        let adapter = match source {
            TrackSource::DirectStream => &self.direct,
            TrackSource::RemoteSdk => &self.remote,
        };
        self.sampler.reconcile(should_run, self.generation, adapter);
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    #[cfg(test)]
    pub(crate) fn sampler(&self) -> &PositionSampler {
        &self.sampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use crate::audio::event_channel;
    use crate::audio::testing::FakeRemote;
    use tokio::time::{timeout_at, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 16 kB per second of audio at 128 kbit/s
    const BYTES_PER_SEC: usize = 16_000;

    struct Harness {
        coordinator: Coordinator,
        inbox: Inbox,
        _handle: PlayerHandle,
        remote: Arc<FakeRemote>,
    }

    impl Harness {
        async fn new() -> Self {
            let config = AppConfig {
                client_id: "cid".to_string(),
                frame_interval_ms: 5,
                remote_sync_interval_ms: 20,
                ..AppConfig::default()
            };
            let remote = Arc::new(FakeRemote::default());
            let (tx, rx) = event_channel();
            let direct = DirectStreamAdapter::new(&config, tx.clone()).unwrap();
            let remote_adapter = RemoteSdkAdapter::new(remote.clone(), &config, tx);
            remote_adapter.set_token("tok").await;
            let (coordinator, inbox, handle) = Coordinator::new(&config, direct, remote_adapter, rx);
            Self {
                coordinator,
                inbox,
                _handle: handle,
                remote,
            }
        }

        fn state(&self) -> &PlaybackState {
            self.coordinator.state()
        }

        async fn command(&mut self, command: Command) {
            self.coordinator.handle(CoordinatorMsg::Command(command)).await;
        }

        async fn inject(&mut self, msg: CoordinatorMsg) {
            self.coordinator.handle(msg).await;
        }

        async fn pump_until(&mut self, what: &str, done: impl Fn(&PlaybackState) -> bool) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !done(self.coordinator.state()) {
                let msg = timeout_at(deadline, self.inbox.next())
                    .await
                    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
                    .expect("inbox closed");
                self.coordinator.handle(msg).await;
            }
        }

        async fn select_and_wait(&mut self, track: Track, status: PlaybackStatus) {
            self.command(Command::SelectTrack(track)).await;
            self.pump_until("track to load", |s| s.status == status).await;
        }

        fn current_cycle(&self) -> (Generation, u64) {
            self.coordinator.sampler().current_cycle().expect("sampler should be running")
        }
    }

    fn remote_track(id: &str, duration_ms: u64) -> Track {
        Track {
            id: id.to_string(),
            title: id.to_uppercase(),
            artist: "Remote Artist".to_string(),
            source: TrackSource::RemoteSdk,
            locator: format!("spotify:track:{id}"),
            duration_ms,
        }
    }

    fn direct_track(id: &str, locator: String, duration_ms: u64) -> Track {
        Track {
            id: id.to_string(),
            title: id.to_uppercase(),
            artist: "Stream Artist".to_string(),
            source: TrackSource::DirectStream,
            locator,
            duration_ms,
        }
    }

    async fn stream_server(route: &str, seconds: usize) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; seconds * BYTES_PER_SEC]))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn selected_track_loads_then_plays() {
        let mut h = Harness::new().await;

        h.command(Command::SelectTrack(remote_track("a", 180_000))).await;
        assert_eq!(h.state().status, PlaybackStatus::Loading);
        assert!(h.state().is_playing);
        assert_eq!(h.state().duration, 180.0);
        assert!(!h.coordinator.sampler().is_running());

        h.pump_until("playing", |s| s.status == PlaybackStatus::Playing).await;
        assert_eq!(h.state().remote_readiness, AdapterReadiness::ready());
        assert_eq!(h.state().queue_index, Some(0));
        assert!(h.coordinator.sampler().is_running());
    }

    #[tokio::test]
    async fn play_twice_matches_play_once() {
        let mut h = Harness::new().await;
        h.select_and_wait(remote_track("a", 180_000), PlaybackStatus::Playing).await;
        h.command(Command::Pause).await;
        assert_eq!(h.state().status, PlaybackStatus::Paused);

        h.command(Command::Play).await;
        let once = h.state().clone();
        let cycle = h.current_cycle();
        h.command(Command::Play).await;
        assert_eq!(*h.state(), once);
        assert_eq!(h.current_cycle(), cycle);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let ops = h.remote.ops();
        assert_eq!(ops.iter().filter(|op| op.starts_with("start")).count(), 1);
        assert_eq!(ops.iter().filter(|op| *op == "resume").count(), 1);
    }

    #[tokio::test]
    async fn relative_seek_is_clamped_to_track() {
        let mut h = Harness::new().await;
        h.command(Command::SelectTrack(remote_track("a", 200_000))).await;
        h.command(Command::Pause).await;
        h.pump_until("paused", |s| s.status == PlaybackStatus::Paused).await;

        for (base, delta) in [(50.0, -60.0), (50.0, -5.0), (50.0, 0.0), (50.0, 30.5), (50.0, 500.0), (199.0, 2.0)] {
            h.command(Command::SeekAbsolute(base)).await;
            h.command(Command::SeekRelative(delta)).await;
            let expected = f64::clamp(base + delta, 0.0, 200.0);
            assert_eq!(h.state().seek_position, expected, "base {base} delta {delta}");
        }
    }

    #[tokio::test]
    async fn absolute_seek_is_clamped_to_track() {
        let mut h = Harness::new().await;
        h.command(Command::SelectTrack(remote_track("a", 200_000))).await;
        h.command(Command::Pause).await;
        h.pump_until("paused", |s| s.status == PlaybackStatus::Paused).await;

        for (requested, expected) in [(-3.0, 0.0), (1000.0, 200.0), (42.5, 42.5)] {
            h.command(Command::SeekAbsolute(requested)).await;
            assert_eq!(h.state().seek_position, expected);
        }
    }

    #[tokio::test]
    async fn seeks_on_track_without_duration_stay_at_start() {
        let mut h = Harness::new().await;
        h.command(Command::SelectTrack(remote_track("a", 0))).await;
        h.command(Command::Pause).await;
        h.pump_until("paused", |s| s.status == PlaybackStatus::Paused).await;

        h.command(Command::SeekAbsolute(42.0)).await;
        assert_eq!(h.state().seek_position, 0.0);
        h.command(Command::SeekRelative(10.0)).await;
        assert_eq!(h.state().duration, 0.0);
        assert_eq!(h.state().seek_position, 0.0);
    }

    #[tokio::test]
    async fn user_seek_on_paused_track_publishes_immediately() {
        let mut h = Harness::new().await;
        h.command(Command::SelectTrack(remote_track("a", 180_000))).await;
        h.command(Command::Pause).await;
        h.pump_until("paused", |s| s.status == PlaybackStatus::Paused).await;

        h.command(Command::BeginUserSeek).await;
        assert!(h.state().is_user_seeking);
        h.command(Command::EndUserSeek(120.0)).await;

        assert_eq!(h.state().seek_position, 120.0);
        assert!(!h.state().is_user_seeking);
        assert!(!h.coordinator.sampler().is_running());
    }

    #[tokio::test]
    async fn samples_are_suppressed_while_user_seeks() {
        let mut h = Harness::new().await;
        h.select_and_wait(remote_track("a", 180_000), PlaybackStatus::Playing).await;

        h.command(Command::BeginUserSeek).await;
        let before = h.state().seek_position;
        let (generation, cycle) = h.current_cycle();
        h.inject(CoordinatorMsg::Sample(Sample { generation, cycle, position: 77.0 })).await;
        assert_eq!(h.state().seek_position, before);

        h.command(Command::EndUserSeek(10.0)).await;
        assert_eq!(h.state().seek_position, 10.0);

        // a reading queued before the commit belongs to the old cycle
        h.inject(CoordinatorMsg::Sample(Sample { generation, cycle, position: 77.0 })).await;
        assert_eq!(h.state().seek_position, 10.0);

        let (generation, cycle) = h.current_cycle();
        h.inject(CoordinatorMsg::Sample(Sample { generation, cycle, position: 11.0 })).await;
        assert_eq!(h.state().seek_position, 11.0);
    }

    #[tokio::test]
    async fn direct_track_seeks_back_past_start() {
        let server = stream_server("/tracks/a/stream", 200).await;
        let mut h = Harness::new().await;
        let track = direct_track("a", format!("{}/tracks/a/stream", server.uri()), 199_000);

        h.select_and_wait(track, PlaybackStatus::Playing).await;
        assert_eq!(h.state().duration, 200.0);

        h.command(Command::SeekAbsolute(50.0)).await;
        h.pump_until("sampled position", |s| s.seek_position >= 50.0).await;

        h.command(Command::SeekRelative(-60.0)).await;
        assert_eq!(h.state().seek_position, 0.0);
    }

    #[tokio::test]
    async fn switching_source_cancels_previous_sampling() {
        let server = stream_server("/a", 200).await;
        let mut h = Harness::new().await;
        let a = direct_track("a", format!("{}/a", server.uri()), 200_000);

        h.select_and_wait(a, PlaybackStatus::Playing).await;
        h.pump_until("A sampled", |s| s.seek_position > 0.0).await;
        let (a_generation, a_cycle) = h.current_cycle();

        h.command(Command::SelectTrack(remote_track("b", 180_000))).await;
        assert_eq!(h.state().seek_position, 0.0);
        assert_eq!(h.state().direct_readiness, AdapterReadiness::default());

        h.inject(CoordinatorMsg::Sample(Sample {
            generation: a_generation,
            cycle: a_cycle,
            position: 150.0,
        }))
        .await;
        assert_eq!(h.state().seek_position, 0.0);
        assert_eq!(h.state().current_source(), Some(TrackSource::RemoteSdk));

        h.pump_until("B playing", |s| s.status == PlaybackStatus::Playing).await;
        let (generation, _) = h.current_cycle();
        assert_eq!(generation, h.coordinator.generation());
        assert_ne!(generation, a_generation);
    }

    #[tokio::test]
    async fn stale_load_completion_is_ignored() {
        let mut h = Harness::new().await;
        h.command(Command::SelectTrack(remote_track("x", 100_000))).await;
        let stale = h.coordinator.generation();
        h.command(Command::SelectTrack(remote_track("y", 120_000))).await;

        h.inject(CoordinatorMsg::Adapter(AdapterEvent::Loaded {
            source: TrackSource::RemoteSdk,
            generation: stale,
            duration: Some(5.0),
        }))
        .await;
        assert_eq!(h.state().status, PlaybackStatus::Loading);
        assert_eq!(h.state().duration, 120.0);
        assert!(!h.state().remote_readiness.is_ready);

        h.pump_until("y playing", |s| s.status == PlaybackStatus::Playing).await;
        assert_eq!(h.state().current_track.as_ref().map(|t| t.id.as_str()), Some("y"));
    }

    #[tokio::test]
    async fn seek_during_load_is_replayed_on_ready() {
        let mut h = Harness::new().await;
        h.command(Command::SelectTrack(remote_track("a", 180_000))).await;
        h.command(Command::SeekAbsolute(30.0)).await;
        assert_eq!(h.state().seek_position, 30.0);

        h.pump_until("playing", |s| s.status == PlaybackStatus::Playing).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.remote.ops().contains(&"start spotify:track:a @30000".to_string()));
    }

    #[tokio::test]
    async fn end_of_track_advances_queue() {
        let mut h = Harness::new().await;
        let first = remote_track("one", 180_000);
        let second = remote_track("two", 90_000);
        h.command(Command::SetQueue(vec![first.clone(), second.clone()])).await;
        h.select_and_wait(first, PlaybackStatus::Playing).await;

        let finished = h.coordinator.generation();
        h.inject(CoordinatorMsg::Adapter(AdapterEvent::EndOfTrack {
            source: TrackSource::RemoteSdk,
            generation: finished,
        }))
        .await;

        assert_eq!(h.state().current_track.as_ref(), Some(&second));
        assert_eq!(h.state().status, PlaybackStatus::Loading);
        assert!(h.state().is_playing);
        assert_eq!(h.state().queue_index, Some(1));

        // a duplicate end for the finished track must not skip again
        h.inject(CoordinatorMsg::Adapter(AdapterEvent::EndOfTrack {
            source: TrackSource::RemoteSdk,
            generation: finished,
        }))
        .await;
        assert_eq!(h.state().current_track.as_ref(), Some(&second));
    }

    #[tokio::test]
    async fn failed_load_skips_to_next_track() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let mut h = Harness::new().await;
        let broken = direct_track("broken", format!("{}/missing", server.uri()), 60_000);
        let next = remote_track("next", 90_000);
        h.command(Command::SetQueue(vec![broken.clone(), next])).await;

        h.command(Command::SelectTrack(broken)).await;
        h.pump_until("skip to next", |s| {
            s.current_track.as_ref().is_some_and(|t| t.id == "next")
        })
        .await;

        let error = h.state().last_error.clone().unwrap_or_default();
        assert!(error.contains("direct"), "unexpected error {error:?}");
        h.pump_until("next playing", |s| s.status == PlaybackStatus::Playing).await;
    }

    #[tokio::test]
    async fn end_of_queue_stops_playback() {
        let mut h = Harness::new().await;
        let only = remote_track("only", 60_000);
        h.command(Command::SetQueue(vec![only.clone()])).await;
        h.select_and_wait(only, PlaybackStatus::Playing).await;

        let generation = h.coordinator.generation();
        h.inject(CoordinatorMsg::Adapter(AdapterEvent::EndOfTrack {
            source: TrackSource::RemoteSdk,
            generation,
        }))
        .await;

        assert_eq!(h.state().status, PlaybackStatus::Stopped);
        assert!(!h.state().is_playing);
        assert!(!h.coordinator.sampler().is_running());

        // play after the queue ran out replays the last track
        h.command(Command::Play).await;
        assert_eq!(h.state().status, PlaybackStatus::Loading);
        assert!(h.coordinator.generation() > generation);
    }

    #[tokio::test]
    async fn previous_restarts_then_goes_back() {
        let mut h = Harness::new().await;
        let first = remote_track("one", 180_000);
        let second = remote_track("two", 180_000);
        h.command(Command::SetQueue(vec![first.clone(), second.clone()])).await;
        h.command(Command::SelectTrack(second)).await;
        h.command(Command::Pause).await;
        h.pump_until("paused", |s| s.status == PlaybackStatus::Paused).await;

        h.command(Command::SeekAbsolute(10.0)).await;
        h.command(Command::Previous).await;
        assert_eq!(h.state().seek_position, 0.0);
        assert_eq!(h.state().queue_index, Some(1));

        h.command(Command::Previous).await;
        assert_eq!(h.state().current_track.as_ref(), Some(&first));
        assert!(!h.state().is_playing);
    }

    #[tokio::test]
    async fn track_without_locator_is_rejected() {
        let mut h = Harness::new().await;
        let mut track = remote_track("empty", 1_000);
        track.locator = "   ".to_string();

        h.command(Command::SelectTrack(track)).await;

        assert!(h.state().current_track.is_none());
        assert!(h.state().last_error.is_some());
        assert_eq!(h.state().status, PlaybackStatus::Stopped);
    }

    #[tokio::test]
    async fn volume_is_clamped_and_forwarded() {
        let mut h = Harness::new().await;
        h.select_and_wait(remote_track("a", 60_000), PlaybackStatus::Playing).await;

        h.command(Command::SetVolume(1.5)).await;
        assert_eq!(h.state().volume, 1.0);
        h.command(Command::SetVolume(0.5)).await;
        assert_eq!(h.state().volume, 0.5);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.remote.ops().contains(&"volume 50".to_string()));
    }

    #[tokio::test]
    async fn handle_drives_running_coordinator() {
        let h = Harness::new().await;
        let Harness { coordinator, inbox, _handle: handle, .. } = h;
        let task = tokio::spawn(coordinator.run(inbox));

        handle.select_track(remote_track("a", 60_000));
        let mut states = handle.subscribe();
        timeout_at(
            Instant::now() + Duration::from_secs(5),
            states.wait_for(|s| s.status == PlaybackStatus::Playing),
        )
        .await
        .expect("timed out waiting for playback")
        .expect("coordinator stopped");

        handle.shutdown();
        timeout_at(Instant::now() + Duration::from_secs(5), task)
            .await
            .expect("coordinator did not stop")
            .unwrap();
        assert_eq!(handle.state().status, PlaybackStatus::Stopped);
    }
}
