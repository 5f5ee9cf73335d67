mod audio;
mod config;
mod controller;
mod error;
mod logging;
mod model;
mod view;

use std::io;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::watch;

use audio::SpotifyRemote;
use config::AppConfig;
use controller::{AppController, PlayerHandle};
use model::PlaybackState;
use view::AppView;

/// Redraw at least this often so error notifications expire
const IDLE_REDRAW: Duration = Duration::from_millis(250);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    let _log_guard = match logging::init_logging(&config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!(catalog = %config.catalog_path.display(), "=== TuneHub Starting ===");

    let tracks = model::load_catalog(&config.catalog_path)?;

    let remote = Arc::new(SpotifyRemote::new(config.remote_device.clone()));
    let (player, player_task) = controller::spawn_player(&config, remote)?;
    player.set_queue(tracks.clone());
    player.set_volume(config.initial_volume);

    tracing::info!("Starting TUI...");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut controller = AppController::new(player.clone(), tracks, &config);
    let res = run_app(&mut terminal, &mut controller, player.subscribe()).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    stop_player(&player, player_task).await;
    tracing::info!("TuneHub shutting down");
    Ok(())
}

async fn stop_player(player: &PlayerHandle, task: tokio::task::JoinHandle<()>) {
    player.shutdown();
    match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
        Ok(Ok(())) => tracing::debug!("Player stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Player task failed"),
        Err(_) => tracing::warn!("Player did not stop in time"),
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    controller: &mut AppController,
    mut states: watch::Receiver<PlaybackState>,
) -> io::Result<()> {
    let mut events = EventStream::new();

    loop {
        let playback = states.borrow_and_update().clone();
        controller.observe(&playback);

        // Draw UI
        terminal.draw(|f| {
            AppView::render(f, &playback, controller.ui_state(), controller.tracks());
        })?;

        if controller.should_quit() {
            break;
        }

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) => controller.handle_key_event(key, &playback),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            },
            changed = states.changed() => {
                if changed.is_err() {
                    tracing::warn!("Playback coordinator stopped unexpectedly");
                    break;
                }
            }
            _ = tokio::time::sleep(IDLE_REDRAW) => {}
        }
    }

    Ok(())
}
