//! Model module - Playback state and data types
//!
//! - `track`: Catalog track records and their source
//! - `playback`: Shared playback state published by the coordinator
//! - `queue`: Ordered play queue
//! - `catalog`: Loading tracks from disk
//! - `types`: Terminal front-end state

mod track;
mod playback;
mod queue;
mod catalog;
mod types;

pub use track::{Track, TrackSource};

pub use playback::{clamp_position, AdapterReadiness, PlaybackState, PlaybackStatus};

pub use queue::PlayQueue;

pub use catalog::load_catalog;

pub use types::UiState;
