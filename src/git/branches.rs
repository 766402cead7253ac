use anyhow::{anyhow, Context, Result};
use git2::{Commit, ErrorCode, Oid};

use super::manager::GitManager;

/// Remote and merge ref a local branch tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub remote: String,
    pub merge_ref: String,
}

impl GitManager {
    /// Short name of the branch HEAD points at, even when unborn
    pub fn current_branch(&self) -> Result<String> {
        let branch_ref = self.head_ref_name()?;
        Ok(branch_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&branch_ref)
            .to_string())
    }

    /// Full name of the branch HEAD points at (`refs/heads/...`), even when unborn
    pub fn head_ref_name(&self) -> Result<String> {
        let head = self
            .repo
            .find_reference("HEAD")
            .context("Failed to find HEAD")?;

        match head.symbolic_target() {
            Some(target) => Ok(target.to_string()),
            None => Err(anyhow!("HEAD is detached")),
        }
    }

    /// Commit at HEAD, or `None` for a repository without commits
    pub fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head
                    .peel_to_commit()
                    .context("Failed to get commit from HEAD")?;
                Ok(Some(commit))
            }
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e).context("Failed to get HEAD"),
        }
    }

    /// Id of the commit at HEAD
    pub fn tip(&self) -> Result<Option<Oid>> {
        Ok(self.head_commit()?.map(|commit| commit.id()))
    }

    /// Tracking configuration of the current branch, `None` when it has none
    pub fn upstream(&self) -> Result<Option<Upstream>> {
        let branch_ref = self.head_ref_name()?;

        let remote = match self.repo.branch_upstream_remote(&branch_ref) {
            Ok(buf) => buf
                .as_str()
                .ok_or_else(|| anyhow!("Upstream remote name is not valid UTF-8"))?
                .to_string(),
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read upstream remote"),
        };

        let merge_ref = match self.repo.branch_upstream_merge(&branch_ref) {
            Ok(buf) => buf
                .as_str()
                .ok_or_else(|| anyhow!("Upstream branch name is not valid UTF-8"))?
                .to_string(),
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read upstream branch"),
        };

        Ok(Some(Upstream { remote, merge_ref }))
    }
}
