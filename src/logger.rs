use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{Level, LevelFilter};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::config::ConfigManager;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Initialize the logging system
///
/// Console output goes through `env_logger` and honours `RUST_LOG`
/// (`error`, `warn`, `info` (default), `debug`, `trace`, `off`).
///
/// Lifecycle events are also appended to `clipgit.log` in the config directory:
/// - Linux: ~/.config/clipgit/clipgit.log or $XDG_CONFIG_HOME/clipgit/clipgit.log
/// - macOS: ~/Library/Application Support/clipgit/clipgit.log
/// - Windows: %APPDATA%\clipgit\clipgit.log
///
/// ```bash
/// RUST_LOG=debug clipgit watch --repo ~/clips
/// ```
pub fn init_logger() -> Result<()> {
    ConfigManager::ensure_config_dir()?;

    let default_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {}",
                console_prefix(Local::now(), record.level()),
                record.args()
            )
        })
        .filter_level(default_level)
        .target(env_logger::Target::Stdout)
        .try_init()
        .ok(); // Ignore error if logger is already initialized

    log_to_file(&format!("Logger initialized with level: {default_level:?}"))?;

    Ok(())
}

/// `2024-01-31 23:59:59 [INFO ]`
fn console_prefix(at: DateTime<Local>, level: Level) -> String {
    format!("{} [{:5}]", at.format("%Y-%m-%d %H:%M:%S"), level)
}

/// Append a line to the log file in the config directory
pub fn log_to_file(message: &str) -> Result<()> {
    append_line(&ConfigManager::log_file_path()?, message)
}

fn append_line(log_path: &Path, message: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    writeln!(
        file,
        "[{}] {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )?;

    Ok(())
}

/// Rotate the log file to `clipgit.log.old` once it exceeds 10MB
pub fn rotate_log_if_needed() -> Result<()> {
    rotate_if_larger(&ConfigManager::log_file_path()?, MAX_LOG_SIZE)
}

fn rotate_if_larger(log_path: &Path, max_size: u64) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(log_path)?;
    if metadata.len() <= max_size {
        return Ok(());
    }

    let old_log_path = log_path.with_extension("log.old");
    if old_log_path.exists() {
        std::fs::remove_file(&old_log_path)?;
    }
    std::fs::rename(log_path, &old_log_path)?;

    log::info!("Log file rotated to {}", old_log_path.display());
    Ok(())
}
