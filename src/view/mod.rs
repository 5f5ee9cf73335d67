//! View module - UI rendering
//!
//! This module handles all UI rendering for the application using ratatui.
//! It is organized into submodules by component type:
//!
//! - `utils`: Shared utility functions (formatting, scrollable lists)
//! - `tracks`: Catalog track list
//! - `progress`: Progress bar rendering
//! - `overlays`: Modal overlays (error, help)

mod utils;
mod tracks;
mod progress;
mod overlays;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};

use crate::model::{PlaybackState, Track, UiState};

pub struct AppView;

impl AppView {
    pub fn render(frame: &mut Frame, playback: &PlaybackState, ui_state: &UiState, tracks: &[Track]) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),    // Track list
                Constraint::Length(3), // Progress bar with playback info
            ])
            .split(frame.area());

        let playing_id = playback.current_track.as_ref().map(|t| t.id.as_str());
        tracks::render_track_list(frame, chunks[0], tracks, ui_state.selected, playing_id);

        progress::render_progress_bar(frame, chunks[1], playback, ui_state);

        if ui_state.error_message.is_some() {
            overlays::render_error_notification(frame, ui_state);
        }

        if ui_state.show_help_popup {
            overlays::render_help_popup(frame);
        }
    }
}
