//! # clipgit
//!
//! Mirrors clipboard text through a git remote so several machines share one clipboard.
//!
//! ## Overview
//!
//! `clipgit` watches the local clipboard and commits every new text value into a local
//! working copy, pushing it to `origin`. In the other direction it periodically pulls the
//! working copy and places incoming content back on the clipboard. Payloads can be
//! encrypted with a password so the repository only ever holds opaque base64 blobs.
//!
//! ## Write modes
//!
//! - **Timestamped** (default): one `clipboard_<YYYYMMDD_HHmmss>.txt` file and commit per change
//! - **Single file**: numbered entries appended to `clipboard.txt`
//! - **Overwrite**: `clip.txt` rewritten, the last commit amended and force-pushed
//!
//! ## Architecture
//!
//! - Encryption of payloads ([`crypto`])
//! - Change detection ([`detector`]) and clipboard access ([`clipboard`])
//! - Git working copy operations ([`git`])
//! - The polling loops and write policies ([`sync`])
//! - Configuration, persisted settings and logging ([`config`], [`settings`], [`logger`])

/// Clipboard read/write seams and the system clipboard.
pub mod clipboard;

/// Platform-specific configuration directory lookup.
pub mod config;

/// Password-based AES-256-CBC encryption of clipboard payloads.
pub mod crypto;

/// Decides whether a clipboard read is new content.
pub mod detector;

/// Git repository operations for one working copy bound to `origin`.
///
/// Provides staging, committing, amending, pushing (optionally forced), pulling
/// and tree diffs on top of libgit2. Credentials are re-read from an env file
/// on every remote operation.
pub mod git;

/// Logging configuration and utilities.
///
/// Sets up console logging (configurable via `RUST_LOG`) plus a persistent log
/// file in the config directory, rotated when it grows past 10MB.
pub mod logger;

/// Defaults persisted in `config.toml`.
pub mod settings;

/// The sync engine: clipboard loop, remote loop and write policies.
pub mod sync;
