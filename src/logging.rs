//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over the configured level. When a log file is configured,
//! every line goes to both stdout and the file.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level {:?}", config.level))?;

    let file = open_log_file(&config.file)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match (config.json, file) {
        (true, Some(file)) => builder
            .json()
            .with_writer(std::io::stdout.and(Mutex::new(file)))
            .try_init(),
        (true, None) => builder.json().try_init(),
        (false, Some(file)) => builder
            .with_ansi(false)
            .with_writer(std::io::stdout.and(Mutex::new(file)))
            .try_init(),
        (false, None) => builder.try_init(),
    };

    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}

/// Open `path` for appending, creating parent directories. Blank disables it.
fn open_log_file(path: &str) -> Result<Option<File>> {
    if path.trim().is_empty() {
        return Ok(None);
    }

    let path = Path::new(path);
    if let Some(parent) = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    Ok(Some(file))
}

#[cfg(test)]
mod tests {
    use super::open_log_file;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn blank_path_disables_file_logging() {
        assert!(open_log_file("").unwrap().is_none());
        assert!(open_log_file("   ").unwrap().is_none());
    }

    #[test]
    fn log_file_parent_directories_are_created() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("coinpulse-logs-{unique}"));
        let log_path = root.join("nested").join("app.log");

        let file = open_log_file(log_path.to_str().unwrap()).expect("log file should open");

        assert!(file.is_some());
        assert!(log_path.exists());

        std::fs::remove_dir_all(&root).expect("temp log directory should be removable");
    }
}
