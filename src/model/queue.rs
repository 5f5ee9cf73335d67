//! Ordered play queue with a cursor on the current track

use super::track::Track;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayQueue {
    tracks: Vec<Track>,
    cursor: Option<usize>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the queued tracks, keeping the cursor on `current` if it is still queued
    pub fn replace(&mut self, tracks: Vec<Track>, current: Option<&Track>) {
        self.cursor = current.and_then(|c| tracks.iter().position(|t| t.id == c.id));
        self.tracks = tracks;
    }

    /// Move the cursor to `track`, appending it if it is not queued yet
    pub fn select(&mut self, track: &Track) -> usize {
        let index = match self.tracks.iter().position(|t| t.id == track.id) {
            Some(index) => index,
            None => {
                self.tracks.push(track.clone());
                self.tracks.len() - 1
            }
        };
        self.cursor = Some(index);
        index
    }

    pub fn advance(&mut self) -> Option<Track> {
        let next = self.cursor.map_or(0, |c| c + 1);
        let track = self.tracks.get(next)?.clone();
        self.cursor = Some(next);
        Some(track)
    }

    pub fn retreat(&mut self) -> Option<Track> {
        let prev = self.cursor?.checked_sub(1)?;
        let track = self.tracks.get(prev)?.clone();
        self.cursor = Some(prev);
        Some(track)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}
