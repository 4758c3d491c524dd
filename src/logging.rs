use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Log file name for a run started now, e.g. `20261016_093000.log`.
pub fn log_file_name() -> String {
    format!("{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_log_file(directory: &Path) -> anyhow::Result<(PathBuf, File)> {
    fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;
    let path = directory.join(log_file_name());
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    Ok((path, file))
}

/// Install the global subscriber: console output on stderr, plus a file in
/// `config.directory` when set. Returns the log file path.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<PathBuf>> {
    let console = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (path, file_layer) = match &config.directory {
        Some(directory) => {
            let (path, file) = open_log_file(directory)?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true);
            (Some(path), Some(layer))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(filter(&config.level))
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(path)
}
