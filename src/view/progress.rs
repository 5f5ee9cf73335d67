//! Progress bar rendering

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Gauge},
    Frame,
};

use crate::model::{PlaybackState, PlaybackStatus, UiState};
use super::utils::format_duration;

pub fn render_progress_bar(
    frame: &mut Frame,
    area: Rect,
    playback: &PlaybackState,
    ui_state: &UiState,
) {
    let status_text = match &playback.current_track {
        None => " No track playing".to_string(),
        Some(track) => {
            let icon = match playback.status {
                PlaybackStatus::Loading => "…",
                PlaybackStatus::Playing => "▶",
                PlaybackStatus::Paused => "⏸",
                PlaybackStatus::Stopped => "■",
            };
            format!(" {} {} [{}]", icon, track.display_name(), track.source)
        }
    };

    // While dragging, show the uncommitted target rather than the live position
    let position = ui_state.seek_intent.unwrap_or(playback.seek_position);
    let time_str = format!(
        "{} / {}",
        format_duration(position),
        format_duration(playback.duration)
    );

    let progress_ratio = if playback.duration > 0.0 {
        (position / playback.duration).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let queue_text = match playback.queue_index {
        Some(index) => format!("Queue: {}/{}", index + 1, playback.queue_len),
        None => format!("Queue: -/{}", playback.queue_len),
    };
    let volume_text = format!("Vol: {}%", (playback.volume * 100.0).round() as u32);
    let controls_info = format!(" {} | {} ", queue_text, volume_text);

    let gauge_color = if ui_state.seek_intent.is_some() {
        Color::Yellow
    } else {
        Color::Green
    };

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("{} ", status_text))
                .title_bottom(Line::from(controls_info).right_aligned()),
        )
        .gauge_style(Style::default().fg(gauge_color))
        .ratio(progress_ratio)
        .label(time_str);

    frame.render_widget(gauge, area);
}
