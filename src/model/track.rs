//! Catalog track records

use std::fmt;
use serde::{Deserialize, Serialize};

/// Which backend a track streams from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackSource {
    /// Plain HTTP stream buffered locally
    DirectStream,
    /// Remote device driven through the streaming service's SDK
    RemoteSdk,
}

impl TrackSource {
    pub fn label(self) -> &'static str {
        match self {
            TrackSource::DirectStream => "direct",
            TrackSource::RemoteSdk => "remote",
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A playable item as supplied by the catalog
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub source: TrackSource,
    /// Stream URL for direct tracks, service URI for remote ones
    pub locator: String,
    pub duration_ms: u64,
}

impl Track {
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    pub fn display_name(&self) -> String {
        match (self.title.is_empty(), self.artist.is_empty()) {
            (true, _) => self.id.clone(),
            (false, true) => self.title.clone(),
            (false, false) => format!("{} - {}", self.artist, self.title),
        }
    }
}
