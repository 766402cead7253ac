use anyhow::{anyhow, Context, Result};
use git2::build::CheckoutBuilder;

use super::branches::Upstream;
use super::credentials::{remote_callbacks, CredentialSource};
use super::manager::GitManager;

impl GitManager {
    /// Push `refspec` to `remote_name`
    pub fn push(
        &self,
        remote_name: &str,
        refspec: &str,
        credentials: &dyn CredentialSource,
    ) -> Result<()> {
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .with_context(|| format!("Failed to find remote '{remote_name}'"))?;

        // libgit2 reports per-ref rejections here rather than failing the push
        let mut rejected: Option<String> = None;
        let mut callbacks = remote_callbacks(credentials);
        callbacks.push_update_reference(|refname, status| {
            if let Some(message) = status {
                rejected = Some(format!("{refname}: {message}"));
            }
            Ok(())
        });

        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(callbacks);

        if let Err(e) = remote.push(&[refspec], Some(&mut push_options)) {
            let remote_url = remote.url().unwrap_or("unknown");
            return Err(anyhow!(
                "Failed to push to remote '{remote_name}' at '{remote_url}': {e}\n\
                \n\
                Possible causes:\n\
                1. Authentication failed - check USERNAME/PASSWORD in the env file\n\
                2. No permission to push to this repository\n\
                3. Network connectivity issues\n\
                4. Remote history diverged (use --no-history to force-push)"
            ));
        }
        drop(push_options);

        match rejected {
            Some(reason) => Err(anyhow!("Remote '{remote_name}' rejected push of {reason}")),
            None => Ok(()),
        }
    }

    /// Fetch `refspecs` from `remote_name`
    pub fn fetch(
        &self,
        remote_name: &str,
        refspecs: &[&str],
        credentials: &dyn CredentialSource,
    ) -> Result<()> {
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .with_context(|| format!("Failed to find remote '{remote_name}'"))?;

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.remote_callbacks(remote_callbacks(credentials));

        remote
            .fetch(refspecs, Some(&mut fetch_options), None)
            .with_context(|| format!("Failed to fetch from remote '{remote_name}'"))?;

        Ok(())
    }

    /// Fetch the upstream branch and merge it into the current branch.
    ///
    /// Fast-forwards when possible and otherwise creates a merge commit. A
    /// merge with conflicts is aborted and the working copy restored.
    pub fn pull(&self, upstream: &Upstream, credentials: &dyn CredentialSource) -> Result<()> {
        self.fetch(&upstream.remote, &[upstream.merge_ref.as_str()], credentials)?;

        let fetch_head = self
            .repo
            .find_reference("FETCH_HEAD")
            .context("Failed to find FETCH_HEAD")?;

        let fetch_commit = self
            .repo
            .reference_to_annotated_commit(&fetch_head)
            .context("Failed to get fetch commit")?;

        let (analysis, _) = self
            .repo
            .merge_analysis(&[&fetch_commit])
            .context("Failed to analyze merge")?;

        if analysis.is_up_to_date() {
            return Ok(());
        }

        let branch_ref = self.head_ref_name()?;

        if analysis.is_fast_forward() || analysis.is_unborn() {
            let message = format!("Fast-forward to {}", fetch_commit.id());
            match self.repo.find_reference(&branch_ref) {
                Ok(mut reference) => {
                    reference
                        .set_target(fetch_commit.id(), &message)
                        .context("Failed to set reference target")?;
                }
                Err(_) => {
                    self.repo
                        .reference(&branch_ref, fetch_commit.id(), true, &message)
                        .context("Failed to create branch reference")?;
                }
            }

            self.repo.set_head(&branch_ref).context("Failed to set HEAD")?;

            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))
                .context("Failed to checkout HEAD")?;

            return Ok(());
        }

        self.merge_fetched(&fetch_commit, upstream)
    }

    fn merge_fetched(&self, fetch_commit: &git2::AnnotatedCommit<'_>, upstream: &Upstream) -> Result<()> {
        self.repo
            .merge(&[fetch_commit], None, None)
            .context("Failed to merge fetched changes")?;

        let mut index = self
            .repo
            .index()
            .context("Failed to get repository index")?;

        if index.has_conflicts() {
            self.repo.cleanup_state().context("Failed to clean up merge state")?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))
                .context("Failed to restore working copy")?;
            return Err(anyhow!(
                "Merge with {}/{} has conflicts; local tip kept",
                upstream.remote,
                upstream.merge_ref
            ));
        }

        let tree_oid = index.write_tree().context("Failed to write merge tree")?;
        let tree = self
            .repo
            .find_tree(tree_oid)
            .context("Failed to find merge tree")?;

        let signature = self.signature()?;
        let local = self
            .head_commit()?
            .ok_or_else(|| anyhow!("Cannot merge into a branch without commits"))?;
        let remote = self
            .repo
            .find_commit(fetch_commit.id())
            .context("Failed to find fetched commit")?;

        let message = format!("Merge {} of {}", upstream.merge_ref, upstream.remote);
        self.repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                &message,
                &tree,
                &[&local, &remote],
            )
            .context("Failed to create merge commit")?;

        self.repo.cleanup_state().context("Failed to clean up merge state")?;

        Ok(())
    }
}
