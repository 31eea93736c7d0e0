use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub const LOG_ENV: &str = "HN_STATION_LOG";

/// Installs the global subscriber. The terminal belongs to the UI, so
/// events go to the configured log file as JSON lines; without a file,
/// logging stays off.
pub fn init(cfg: &LogConfig) -> Result<()> {
    let Some(path) = cfg.file.as_deref() else {
        return Ok(());
    };
    let file = open_log_file(path)?;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .try_init()
        .context("telemetry: install subscriber")?;

    tracing::info!(version = crate::VERSION, path = %path.display(), "logging started");
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("telemetry: create directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("telemetry: open log file {}", path.display()))
}
