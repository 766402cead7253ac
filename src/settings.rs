use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConfigManager;
use crate::sync::{HistoryMode, DEFAULT_POLL_INTERVAL_SECS};

/// Defaults persisted between runs; command-line flags take precedence.
///
/// The encryption password is never written here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between pulls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,

    /// Credentials file with USERNAME= / PASSWORD= lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_file: Option<PathBuf>,

    /// Write policy used when no mode flag is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_mode: Option<HistoryMode>,
}

impl Settings {
    /// Load settings from the config directory, defaults if the file is absent
    pub fn load() -> Result<Self> {
        Self::load_from(&ConfigManager::settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&ConfigManager::settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
    }

    /// Apply the given overrides; `None` leaves a value untouched.
    pub fn update(
        &mut self,
        poll_interval_secs: Option<u64>,
        env_file: Option<PathBuf>,
        history_mode: Option<HistoryMode>,
    ) {
        if poll_interval_secs.is_some() {
            self.poll_interval_secs = poll_interval_secs;
        }
        if env_file.is_some() {
            self.env_file = env_file;
        }
        if history_mode.is_some() {
            self.history_mode = history_mode;
        }
    }
}

/// Print the persisted settings
pub fn show_settings() -> Result<()> {
    let settings = Settings::load()?;
    let path = ConfigManager::settings_path()?;

    println!("{}", "Current configuration:".bold());
    println!("  {} {}", "File:".cyan(), path.display());
    println!(
        "  {} {}s",
        "Poll interval:".cyan(),
        settings.poll_interval_secs()
    );
    println!(
        "  {} {}",
        "Env file:".cyan(),
        settings
            .env_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "  {} {}",
        "History mode:".cyan(),
        settings.history_mode.unwrap_or_default()
    );

    Ok(())
}

/// Update and persist settings from command-line values
pub fn update_settings(
    poll_interval_secs: Option<u64>,
    env_file: Option<PathBuf>,
    history_mode: Option<HistoryMode>,
) -> Result<()> {
    let mut settings = Settings::load()?;
    settings.update(poll_interval_secs, env_file, history_mode);
    settings.save()?;

    println!("{}", "Configuration updated".green());
    Ok(())
}
