use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::credentials::CredentialSource;
use super::manager::GitManager;
use crate::crypto;

/// Remote every push goes to
pub const ORIGIN: &str = "origin";

/// Remote ref the current branch is pushed to in append mode
pub const PUSH_TARGET: &str = "refs/heads/master";

/// Message used for every amended commit in force-push mode
pub const FORCE_COMMIT_MESSAGE: &str = "Update clipboard content";

/// Operations the sync engine performs against one working copy.
///
/// Every call opens the repository afresh; a path that is not a repository
/// fails each of them with [`RepositoryNotFound`](super::RepositoryNotFound).
/// Transport and authentication failures propagate unchanged; retrying is the
/// caller's job.
pub trait RepositoryGateway: Send {
    /// Root of the working copy files are written into
    fn workdir(&self) -> &Path;

    /// Stage `file`, commit with `message`, and push to `origin` if present.
    fn commit_and_push(&self, file: &str, message: &str) -> Result<()>;

    /// Stage `file`, amend the last commit (or create the first one), and
    /// force-push the branch so the remote holds exactly that commit.
    fn commit_and_force_push(&self, file: &str) -> Result<()>;

    /// Pull from the tracked remote and return the content of the first added
    /// or modified file, decrypted when a password is given.
    fn pull(&self, decryption_password: Option<&str>) -> Result<Option<String>>;
}

/// libgit2-backed gateway
pub struct GitGateway {
    repo_path: PathBuf,
    credentials: Arc<dyn CredentialSource>,
}

impl GitGateway {
    pub fn new(repo_path: impl Into<PathBuf>, credentials: Arc<dyn CredentialSource>) -> Self {
        GitGateway {
            repo_path: repo_path.into(),
            credentials,
        }
    }

    fn open(&self) -> Result<GitManager> {
        GitManager::open(&self.repo_path)
    }
}

impl RepositoryGateway for GitGateway {
    fn workdir(&self) -> &Path {
        &self.repo_path
    }

    fn commit_and_push(&self, file: &str, message: &str) -> Result<()> {
        let git_manager = self.open()?;

        log::info!("Staging file: {file}");
        git_manager.stage_path(Path::new(file))?;
        git_manager.commit(message)?;
        log::info!("Committed changes: {message}");

        if git_manager.has_remote(ORIGIN) {
            let refspec = format!("{}:{}", git_manager.head_ref_name()?, PUSH_TARGET);
            git_manager.push(ORIGIN, &refspec, self.credentials.as_ref())?;
            log::info!("Pushed changes to remote: {ORIGIN}");
        } else {
            log::debug!("No '{ORIGIN}' remote, skipping push");
        }

        Ok(())
    }

    fn commit_and_force_push(&self, file: &str) -> Result<()> {
        let git_manager = self.open()?;

        log::info!("Staging file: {file}");
        git_manager.stage_path(Path::new(file))?;
        git_manager.amend_head(FORCE_COMMIT_MESSAGE)?;
        log::info!("Committed changes: {FORCE_COMMIT_MESSAGE}");

        if git_manager.has_remote(ORIGIN) {
            let branch_ref = git_manager.head_ref_name()?;
            let refspec = format!("+{branch_ref}:{branch_ref}");
            git_manager.push(ORIGIN, &refspec, self.credentials.as_ref())?;
            log::info!("Force pushed changes to remote: {ORIGIN}");
        } else {
            log::debug!("No '{ORIGIN}' remote, skipping push");
        }

        Ok(())
    }

    fn pull(&self, decryption_password: Option<&str>) -> Result<Option<String>> {
        let git_manager = self.open()?;

        let Some(upstream) = git_manager.upstream()? else {
            log::debug!("Current branch has no tracked remote, nothing to pull");
            return Ok(None);
        };

        let old_tip = git_manager.tip()?;
        git_manager.pull(&upstream, self.credentials.as_ref())?;
        let Some(new_tip) = git_manager.tip()? else {
            return Ok(None);
        };

        if old_tip == Some(new_tip) {
            return Ok(None);
        }

        log::info!("Pulled changes from remote: {}", upstream.remote);

        let password = decryption_password.filter(|pw| !pw.is_empty());
        for change in git_manager.changes_between(old_tip, new_tip)? {
            if !change.is_surfaceable() {
                continue;
            }
            let Some(bytes) = change.content else {
                continue;
            };

            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    log::error!("Pulled content for {} is not UTF-8 text", change.path);
                    continue;
                }
            };

            let content = match password {
                Some(pw) => match crypto::try_decrypt(&text, pw) {
                    Ok(plain) => plain,
                    Err(e) => {
                        log::error!("Error decrypting pulled content for {}: {}", change.path, e);
                        continue;
                    }
                },
                None => text,
            };

            log::info!("Pulled content for {}", change.path);
            return Ok(Some(content));
        }

        Ok(None)
    }
}
