use anyhow::{Context, Result};
use git2::{Oid, Signature};
use std::path::Path;

use super::manager::GitManager;

const FALLBACK_NAME: &str = "clipgit";
const FALLBACK_EMAIL: &str = "clipgit@localhost";

impl GitManager {
    /// Stage a single file, given relative to the working copy root
    pub fn stage_path(&self, relative: &Path) -> Result<()> {
        let mut index = self
            .repo
            .index()
            .context("Failed to get repository index")?;

        index
            .add_path(relative)
            .with_context(|| format!("Failed to stage {}", relative.display()))?;

        index.write().context("Failed to write index")?;

        Ok(())
    }

    /// Signature from the local git identity, or a fixed one when none is configured
    pub fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(signature) => Ok(signature.to_owned()),
            Err(_) => {
                Signature::now(FALLBACK_NAME, FALLBACK_EMAIL).context("Failed to create signature")
            }
        }
    }

    /// Create a commit on HEAD from the current index
    pub fn commit(&self, message: &str) -> Result<Oid> {
        let mut index = self
            .repo
            .index()
            .context("Failed to get repository index")?;

        let tree_oid = index.write_tree().context("Failed to write tree")?;

        let tree = self
            .repo
            .find_tree(tree_oid)
            .context("Failed to find tree")?;

        let signature = self.signature()?;

        let parent_commit = self.head_commit()?;
        let parents: Vec<_> = parent_commit.iter().collect();

        let oid = self
            .repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &parents,
            )
            .context("Failed to create commit")?;

        Ok(oid)
    }

    /// Replace the HEAD commit with one carrying the current index and `message`.
    ///
    /// Falls back to a regular commit when HEAD is unborn.
    pub fn amend_head(&self, message: &str) -> Result<Oid> {
        let Some(head) = self.head_commit()? else {
            return self.commit(message);
        };

        let mut index = self
            .repo
            .index()
            .context("Failed to get repository index")?;
        let tree_oid = index.write_tree().context("Failed to write tree")?;
        let tree = self
            .repo
            .find_tree(tree_oid)
            .context("Failed to find tree")?;

        let signature = self.signature()?;

        let oid = head
            .amend(
                Some("HEAD"),
                Some(&signature),
                Some(&signature),
                None,
                Some(message),
                Some(&tree),
            )
            .context("Failed to amend commit")?;

        Ok(oid)
    }
}
