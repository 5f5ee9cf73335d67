//! Catalog track list

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, ListItem},
    Frame,
};

use crate::model::Track;
use super::utils::{calculate_num_width, format_duration, render_scrollable_list, truncate_string};

pub fn render_track_list(
    frame: &mut Frame,
    area: Rect,
    tracks: &[Track],
    selected: usize,
    playing_id: Option<&str>,
) {
    let content_width = area.width.saturating_sub(2) as usize;
    let num_width = calculate_num_width(tracks.len());
    let source_width = 8;
    let duration_width = 6;
    // leading space + separators
    let name_width = content_width.saturating_sub(1 + num_width + source_width + duration_width + 9);

    let items: Vec<ListItem> = tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let is_playing = playing_id == Some(track.id.as_str());
            let marker = if is_playing { "▶" } else { " " };
            let text = format!(
                " {:>num_width$} {} {} │ {:<source_width$} │ {:>duration_width$}",
                i + 1,
                marker,
                truncate_string(&track.display_name(), name_width),
                track.source.label(),
                format_duration(track.duration_secs()),
            );

            let style = if i == selected {
                Style::default().fg(Color::Black).bg(Color::Green).add_modifier(Modifier::BOLD)
            } else if is_playing {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(text).style(style)
        })
        .collect();

    let title = format!(" Tracks ({}) ", tracks.len());
    render_scrollable_list(
        frame,
        area,
        items,
        selected,
        Block::default().borders(Borders::ALL).title(title),
    );
}
