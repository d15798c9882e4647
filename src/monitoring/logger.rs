use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Install the global subscriber: console and/or an append-mode log file.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = settings.log_to_console.then(|| fmt::layer().with_target(false));

    let file = if settings.log_to_file {
        let file = open_log_file(settings)?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

fn open_log_file(settings: &LoggingSettings) -> Result<File> {
    if let Some(parent) = settings.file_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.file_path)
        .with_context(|| format!("Failed to open log file: {}", settings.file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_directories() {
        let dir = std::env::temp_dir().join(format!("forecast-panel-logs-{}", std::process::id()));
        let settings = LoggingSettings {
            log_to_console: false,
            log_to_file: true,
            file_path: dir.join("nested").join("panel.log"),
            level: "debug".to_string(),
        };

        assert!(open_log_file(&settings).is_ok());
        assert!(settings.file_path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
