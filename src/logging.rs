//! File-based logging for TuneHub
//!
//! The terminal belongs to the TUI, so every event goes to a daily rolling
//! file instead. Playback tasks log from hot paths (sampler cycles, remote
//! sync), which is why the writer is non-blocking.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::AppConfig;

const LOG_FILE_PREFIX: &str = "tunehub";
const LOG_FILE_SUFFIX: &str = "log";
const MAX_LOG_FILES: usize = 7;

/// Route `tracing` output to `<log_dir>/tunehub.YYYY-MM-DD.log`.
///
/// `RUST_LOG` takes precedence over the configured filter. The returned
/// guard flushes buffered lines when dropped, so keep it alive until exit.
pub fn init_logging(config: &AppConfig) -> anyhow::Result<WorkerGuard> {
    let appender = log_file_appender(&config.log_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(log_filter(std::env::var("RUST_LOG").ok(), &config.log_filter))
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(dir = %config.log_dir.display(), "Logging initialized");
    Ok(guard)
}

fn log_file_appender(dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)?;
    Ok(appender)
}

/// Pick the directive set: a valid `RUST_LOG` wins, then the configured
/// filter, then plain `warn`
fn log_filter(env: Option<String>, configured: &str) -> EnvFilter {
    env.filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Log the outcome of a backend request, with optional extra fields
#[macro_export]
macro_rules! log_backend_result {
    ($operation:expr, $result:expr $(, $($field:tt)+)?) => {
        match &$result {
            Ok(_) => tracing::debug!(operation = $operation, $($($field)+,)? "Backend request successful"),
            Err(e) => tracing::warn!(operation = $operation, $($($field)+,)? error = %e, "Backend request failed"),
        }
    };
}
