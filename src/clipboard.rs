//! Clipboard access seams.
//!
//! The engine reads through [`ClipboardSource`] and hands pulled content to a
//! [`ContentSink`]. [`SystemClipboard`] implements both on top of `arboard`.

use anyhow::{anyhow, Context, Result};
use std::sync::Mutex;

/// Something the clipboard loop can read text from.
pub trait ClipboardSource: Send + Sync {
    /// Current clipboard text, or `None` when the clipboard holds no text.
    fn read_text(&self) -> Result<Option<String>>;
}

/// Receiver for content pulled from the remote.
pub trait ContentSink: Send + Sync {
    fn deliver(&self, content: &str) -> Result<()>;
}

impl<F> ContentSink for F
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    fn deliver(&self, content: &str) -> Result<()> {
        self(content)
    }
}

/// The OS clipboard.
pub struct SystemClipboard {
    inner: Mutex<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let clipboard = arboard::Clipboard::new().context("Failed to access system clipboard")?;
        Ok(SystemClipboard {
            inner: Mutex::new(clipboard),
        })
    }

    pub fn write_text(&self, text: &str) -> Result<()> {
        let mut clipboard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("Clipboard lock poisoned"))?;
        clipboard
            .set_text(text.to_owned())
            .context("Failed to write clipboard text")
    }
}

impl ClipboardSource for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>> {
        let mut clipboard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("Clipboard lock poisoned"))?;
        match clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(e).context("Failed to read clipboard text"),
        }
    }
}

impl ContentSink for SystemClipboard {
    fn deliver(&self, content: &str) -> Result<()> {
        self.write_text(content)
    }
}
