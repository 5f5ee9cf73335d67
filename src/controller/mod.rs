//! Controller module - Playback coordination and input handling
//!
//! It is organized into submodules by responsibility:
//!
//! - `coordinator`: Owner of the playback state, reacts to commands and adapter events
//! - `sampler`: Frame-paced position polling of the active adapter
//! - `input`: Key event handling for the terminal front-end

mod coordinator;
mod input;
mod sampler;

use coordinator::Coordinator;

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::audio::{self, DirectStreamAdapter, RemoteControl, RemoteSdkAdapter};
use crate::config::AppConfig;
use crate::model::{PlaybackState, Track, UiState};

/// Requests accepted by the coordinator
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SelectTrack(Track),
    PlayPause,
    Play,
    Pause,
    Next,
    Previous,
    /// Seconds relative to the live position
    SeekRelative(f64),
    SeekAbsolute(f64),
    BeginUserSeek,
    /// Commit an interactive seek at the given position
    EndUserSeek(f64),
    SetVolume(f32),
    SetQueue(Vec<Track>),
    /// Auth token for the remote backend, used from the next remote load
    SetRemoteToken(String),
    Shutdown,
}

/// Cheap handle used by the front-end to drive playback and observe state
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<PlaybackState>,
}

impl PlayerHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>, state: watch::Receiver<PlaybackState>) -> Self {
        Self { commands, state }
    }

    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("Playback coordinator is gone, command dropped");
        }
    }

    pub fn select_track(&self, track: Track) {
        self.send(Command::SelectTrack(track));
    }

    pub fn play_pause(&self) {
        self.send(Command::PlayPause);
    }

    pub fn next(&self) {
        self.send(Command::Next);
    }

    pub fn previous(&self) {
        self.send(Command::Previous);
    }

    pub fn seek_relative(&self, delta: f64) {
        self.send(Command::SeekRelative(delta));
    }

    pub fn seek_absolute(&self, position: f64) {
        self.send(Command::SeekAbsolute(position));
    }

    pub fn begin_user_seek(&self) {
        self.send(Command::BeginUserSeek);
    }

    pub fn end_user_seek(&self, position: f64) {
        self.send(Command::EndUserSeek(position));
    }

    pub fn set_volume(&self, volume: f32) {
        self.send(Command::SetVolume(volume));
    }

    pub fn set_queue(&self, tracks: Vec<Track>) {
        self.send(Command::SetQueue(tracks));
    }

    pub fn set_remote_token(&self, token: String) {
        self.send(Command::SetRemoteToken(token));
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Latest published snapshot
    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }
}

/// Build both adapters and run a coordinator on its own task
pub fn spawn_player(
    config: &AppConfig,
    remote: Arc<dyn RemoteControl>,
) -> anyhow::Result<(PlayerHandle, JoinHandle<()>)> {
    let (events_tx, events_rx) = audio::event_channel();
    let direct = DirectStreamAdapter::new(config, events_tx.clone())?;
    let remote = RemoteSdkAdapter::new(remote, config, events_tx);

    let (coordinator, inbox, handle) = Coordinator::new(config, direct, remote, events_rx);
    match &config.remote_token {
        Some(token) => handle.set_remote_token(token.clone()),
        None => tracing::warn!("No remote token configured, remote tracks will not become ready"),
    }
    let task = tokio::spawn(coordinator.run(inbox));
    Ok((handle, task))
}

/// Front-end controller: turns key presses into coordinator commands
pub struct AppController {
    player: PlayerHandle,
    ui: UiState,
    tracks: Vec<Track>,
    seek_step: f64,
    reported_error: Option<String>,
}

impl AppController {
    pub fn new(player: PlayerHandle, tracks: Vec<Track>, config: &AppConfig) -> Self {
        Self {
            player,
            ui: UiState::default(),
            tracks,
            seek_step: config.seek_step_secs,
            reported_error: None,
        }
    }

    pub fn ui_state(&self) -> &UiState {
        &self.ui
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn should_quit(&self) -> bool {
        self.ui.should_quit
    }

    /// Mirror coordinator-side errors into the front-end notification
    pub fn observe(&mut self, state: &PlaybackState) {
        if state.last_error != self.reported_error {
            if let Some(error) = &state.last_error {
                self.ui.set_error(error.clone());
            }
            self.reported_error = state.last_error.clone();
        }
        self.ui.auto_clear_old_errors();
    }
}
