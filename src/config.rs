//! Application configuration
//!
//! Settings come from `tunehub.json` in the working directory when present,
//! then environment variables override individual fields.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "tunehub.json";
const DEFAULT_CATALOG: &str = "catalog.json";
const DEFAULT_LOG_DIR: &str = ".logs";
const DEFAULT_LOG_FILTER: &str = "tunehub_rs=debug,rspotify=info,reqwest=info,warn";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Client identifier appended to direct stream requests
    pub client_id: String,
    /// Auth token for the remote SDK backend
    pub remote_token: Option<String>,
    /// Preferred remote playback device; the active device is used otherwise
    pub remote_device: Option<String>,
    pub catalog_path: PathBuf,
    pub frame_interval_ms: u64,
    pub remote_sync_interval_ms: u64,
    pub seek_step_secs: f64,
    pub stream_bitrate_kbps: u32,
    pub initial_volume: f32,
    pub request_timeout_secs: u64,
    pub log_dir: PathBuf,
    /// `EnvFilter` directives used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            remote_token: None,
            remote_device: None,
            catalog_path: PathBuf::from(DEFAULT_CATALOG),
            frame_interval_ms: 16,
            remote_sync_interval_ms: 1000,
            seek_step_secs: 10.0,
            stream_bitrate_kbps: 128,
            initial_volume: 1.0,
            request_timeout_secs: 30,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    /// Load `tunehub.json` and apply environment overrides
    pub fn load() -> Result<Self> {
        let config = Self::load_from(Path::new(CONFIG_FILE))?;
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::info!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = non_empty("TUNEHUB_CLIENT_ID").or_else(|| non_empty("SOUNDCLOUD_CLIENT_ID")) {
            self.client_id = id;
        }
        if let Some(token) = non_empty("TUNEHUB_REMOTE_TOKEN") {
            self.remote_token = Some(token);
        }
        if let Some(device) = non_empty("TUNEHUB_REMOTE_DEVICE") {
            self.remote_device = Some(device);
        }
        if let Some(path) = non_empty("TUNEHUB_CATALOG") {
            self.catalog_path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty("TUNEHUB_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn remote_sync_interval(&self) -> Duration {
        Duration::from_millis(self.remote_sync_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
