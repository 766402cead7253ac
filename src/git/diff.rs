use anyhow::{Context, Result};
use git2::{Delta, Oid};

use super::manager::GitManager;

/// How a file changed between two tips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One changed file, with its working copy content when it could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: String,
    pub kind: ChangeKind,
    pub content: Option<Vec<u8>>,
}

impl ChangeRecord {
    /// Added or modified with readable content
    pub fn is_surfaceable(&self) -> bool {
        matches!(self.kind, ChangeKind::Added | ChangeKind::Modified) && self.content.is_some()
    }
}

impl GitManager {
    /// Files changed from `old` to `new`, in diff order (sorted by path).
    ///
    /// Content is read from the working copy, so `new` should be checked out.
    /// Deltas other than add/modify/delete are skipped.
    pub fn changes_between(&self, old: Option<Oid>, new: Oid) -> Result<Vec<ChangeRecord>> {
        let old_tree = match old {
            Some(oid) => Some(
                self.repo
                    .find_commit(oid)
                    .and_then(|commit| commit.tree())
                    .context("Failed to load previous tree")?,
            ),
            None => None,
        };
        let new_tree = self
            .repo
            .find_commit(new)
            .and_then(|commit| commit.tree())
            .context("Failed to load new tree")?;

        let diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), None)
            .context("Failed to diff trees")?;

        let workdir = self.workdir()?;
        let mut changes = Vec::new();

        for delta in diff.deltas() {
            let kind = match delta.status() {
                Delta::Added => ChangeKind::Added,
                Delta::Modified => ChangeKind::Modified,
                Delta::Deleted => ChangeKind::Deleted,
                _ => continue,
            };

            let file = if kind == ChangeKind::Deleted {
                delta.old_file()
            } else {
                delta.new_file()
            };
            let Some(path) = file.path() else {
                continue;
            };

            let content = match kind {
                ChangeKind::Deleted => None,
                _ => match std::fs::read(workdir.join(path)) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        log::warn!("Error reading pulled content for {}: {}", path.display(), e);
                        None
                    }
                },
            };

            changes.push(ChangeRecord {
                path: path.to_string_lossy().into_owned(),
                kind,
                content,
            });
        }

        Ok(changes)
    }
}
