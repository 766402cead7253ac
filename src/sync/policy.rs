use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::git::RepositoryGateway;

/// Commit message for every file written in timestamped mode
pub const TIMESTAMPED_MESSAGE: &str = "Add new clipboard content";

/// File that accumulates entries in single-file mode
pub const SINGLE_FILE_NAME: &str = "clipboard.txt";

/// File overwritten and force-pushed in overwrite mode
pub const OVERWRITE_FILE_NAME: &str = "clip.txt";

/// How detected clipboard content is persisted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryMode {
    /// New `clipboard_<YYYYMMDD_HHmmss>.txt` file and commit per change
    #[default]
    Timestamped,
    /// Numbered entries appended to `clipboard.txt`
    SingleFileAppend,
    /// `clip.txt` rewritten, last commit amended and force-pushed
    OverwriteForce,
}

impl HistoryMode {
    /// `single_file` wins over `no_history`.
    pub fn from_flags(no_history: bool, single_file: bool) -> Self {
        if single_file {
            HistoryMode::SingleFileAppend
        } else if no_history {
            HistoryMode::OverwriteForce
        } else {
            HistoryMode::Timestamped
        }
    }
}

impl std::fmt::Display for HistoryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HistoryMode::Timestamped => "timestamped",
            HistoryMode::SingleFileAppend => "single-file-append",
            HistoryMode::OverwriteForce => "overwrite-force",
        };
        f.write_str(name)
    }
}

/// Settings fixed for the lifetime of a sync engine.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub history_mode: HistoryMode,
    pub encryption_password: Option<String>,
    pub poll_interval_secs: u64,
    pub pull_only: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy {
            history_mode: HistoryMode::default(),
            encryption_password: None,
            poll_interval_secs: super::DEFAULT_POLL_INTERVAL_SECS,
            pull_only: false,
        }
    }
}

impl SyncPolicy {
    /// Password to encrypt with; an empty password disables encryption.
    pub fn encryption_password(&self) -> Option<&str> {
        self.encryption_password
            .as_deref()
            .filter(|pw| !pw.is_empty())
    }

    pub fn encryption_enabled(&self) -> bool {
        self.encryption_password().is_some()
    }
}

/// `clipboard_20240131_235959.txt`
pub fn timestamped_file_name(at: DateTime<Local>) -> String {
    format!("clipboard_{}.txt", at.format("%Y%m%d_%H%M%S"))
}

/// One delimited entry of the single-file log, trailing blank line included.
pub fn format_entry(number: u64, at: DateTime<Local>, content: &str) -> String {
    format!(
        "#{number} - {}\n\n{content}\n\n#{number} - END\n\n",
        at.to_rfc3339_opts(SecondsFormat::Secs, false)
    )
}

/// Highest entry number closed by a `#<n> - END` marker.
pub fn last_entry_number(existing: &str) -> u64 {
    existing
        .lines()
        .filter_map(|line| line.strip_prefix('#')?.strip_suffix(" - END"))
        .filter_map(|number| number.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

/// The shared working copy: the gateway plus the single-file entry counter.
///
/// Callers hold this behind one lock so file writes, commits, pulls and
/// counter updates never interleave.
pub struct WorkingCopy {
    gateway: Box<dyn RepositoryGateway>,
    entries_written: Option<u64>,
}

impl WorkingCopy {
    pub fn new(gateway: Box<dyn RepositoryGateway>) -> Self {
        WorkingCopy {
            gateway,
            entries_written: None,
        }
    }

    pub fn gateway(&self) -> &dyn RepositoryGateway {
        self.gateway.as_ref()
    }

    /// Write `content` according to `mode` and publish it. Returns the file written.
    pub fn persist(&mut self, mode: HistoryMode, content: &str) -> Result<String> {
        match mode {
            HistoryMode::Timestamped => self.write_timestamped(content),
            HistoryMode::SingleFileAppend => self.append_entry(content),
            HistoryMode::OverwriteForce => self.overwrite(content),
        }
    }

    fn write_timestamped(&mut self, content: &str) -> Result<String> {
        let file_name = timestamped_file_name(Local::now());
        write_file(self.gateway.workdir(), &file_name, content)?;
        self.gateway.commit_and_push(&file_name, TIMESTAMPED_MESSAGE)?;
        Ok(file_name)
    }

    fn append_entry(&mut self, content: &str) -> Result<String> {
        let path = self.gateway.workdir().join(SINGLE_FILE_NAME);

        let written = match self.entries_written {
            Some(n) => n,
            None => match fs::read_to_string(&path) {
                Ok(existing) => last_entry_number(&existing),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()))
                }
            },
        };
        let number = written + 1;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(format_entry(number, Local::now(), content).as_bytes())
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        self.entries_written = Some(number);

        self.gateway
            .commit_and_push(SINGLE_FILE_NAME, &format!("Added clipboard entry #{number}"))?;
        Ok(SINGLE_FILE_NAME.to_string())
    }

    fn overwrite(&mut self, content: &str) -> Result<String> {
        write_file(self.gateway.workdir(), OVERWRITE_FILE_NAME, content)?;
        self.gateway.commit_and_force_push(OVERWRITE_FILE_NAME)?;
        Ok(OVERWRITE_FILE_NAME.to_string())
    }
}

fn write_file(workdir: &Path, file_name: &str, content: &str) -> Result<()> {
    let path = workdir.join(file_name);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}
