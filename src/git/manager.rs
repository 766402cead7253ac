use anyhow::{anyhow, Context, Result};
use git2::{ErrorCode, Repository, RepositoryInitOptions};
use std::path::{Path, PathBuf};

/// Returned by every gateway operation when the path is not a git repository.
#[derive(Debug, thiserror::Error)]
#[error("Repository not found at '{}'", path.display())]
pub struct RepositoryNotFound {
    pub path: PathBuf,
}

/// Handle on one opened git repository
pub struct GitManager {
    pub(super) repo: Repository,
}

impl GitManager {
    /// Open an existing repository without searching parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RepositoryNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        match Repository::open(path) {
            Ok(repo) => Ok(GitManager { repo }),
            Err(e) if e.code() == ErrorCode::NotFound => Err(RepositoryNotFound {
                path: path.to_path_buf(),
            }
            .into()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to open git repository at {}", path.display())),
        }
    }

    /// Initialize a new repository whose first branch is `master`
    pub fn init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("master");

        let repo = Repository::init_opts(path, &opts).with_context(|| {
            format!("Failed to initialize git repository at {}", path.display())
        })?;

        Ok(GitManager { repo })
    }

    /// Root of the working copy
    pub fn workdir(&self) -> Result<&Path> {
        self.repo
            .workdir()
            .ok_or_else(|| anyhow!("Repository at {} is bare", self.repo.path().display()))
    }

    /// Check if a remote exists
    pub fn has_remote(&self, name: &str) -> bool {
        self.repo.find_remote(name).is_ok()
    }

    /// Add a remote to the repository
    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        self.repo
            .remote(name, url)
            .with_context(|| format!("Failed to add remote '{name}' with URL '{url}'"))?;
        Ok(())
    }
}

/// Startup check: the path must exist and be a non-bare git working copy.
pub fn ensure_working_copy(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(anyhow!(
            "Repository path '{}' does not exist.",
            path.display()
        ));
    }

    let manager = GitManager::open(path)
        .map_err(|_| anyhow!("'{}' is not a git repository.", path.display()))?;
    manager.workdir()?;

    Ok(())
}
