//! Track catalog loaded from disk

use std::fs;
use std::path::Path;
use anyhow::{Context, Result};

use super::track::Track;

/// Load the catalog file, returning an empty catalog if it does not exist
pub fn load_catalog(path: &Path) -> Result<Vec<Track>> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Catalog file not found, starting with an empty queue");
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    let tracks = parse_catalog(&content)?;
    tracing::info!(count = tracks.len(), path = %path.display(), "Catalog loaded");
    Ok(tracks)
}

/// Parse a JSON array of tracks, dropping entries without a locator
pub fn parse_catalog(content: &str) -> Result<Vec<Track>> {
    let tracks: Vec<Track> = serde_json::from_str(content).context("parsing catalog JSON")?;
    Ok(tracks
        .into_iter()
        .filter(|track| {
            let playable = !track.locator.trim().is_empty();
            if !playable {
                tracing::warn!(track_id = %track.id, "Skipping catalog entry without a locator");
            }
            playable
        })
        .collect())
}
