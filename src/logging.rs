//! Tracing subscriber setup: console plus optional timestamped log file

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Log file path for a run started now
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("gigscout_{}.log", Local::now().format("%Y%m%d_%H%M%S")))
}

/// Filter directive: `RUST_LOG` wins, then `--verbose`, then the config level
fn build_filter(level: &str, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    if verbose {
        EnvFilter::new("gigscout=debug,info")
    } else {
        EnvFilter::new(format!("gigscout={level},warn"))
    }
}

/// Subscriber with the file layer under the console layer
///
/// The file layer is stacked first so both console formats sit on the same
/// inner subscriber type.
fn build_subscriber(
    filter: EnvFilter,
    format: &str,
    file: Option<File>,
) -> Box<dyn Subscriber + Send + Sync> {
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });
    let base = tracing_subscriber::registry().with(filter).with(file_layer);

    match format {
        "json" => Box::new(base.with(fmt::layer().json())),
        _ => Box::new(base.with(fmt::layer().pretty())),
    }
}

/// Install the global subscriber
///
/// `format_override` (from the command line) takes precedence over
/// `config.format`. Returns the log file path when one was opened.
pub fn init(
    config: &LoggingConfig,
    verbose: bool,
    format_override: Option<&str>,
) -> Result<Option<PathBuf>> {
    let filter = build_filter(&config.level, verbose);

    let (path, file) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let path = log_file_path(dir);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            (Some(path), Some(file))
        }
        None => (None, None),
    };

    build_subscriber(filter, format_override.unwrap_or(&config.format), file).try_init()?;

    Ok(path)
}
