//! Git working copy operations for clipboard synchronization.
//!
//! Wraps libgit2 for the handful of operations the sync engine needs: staging a
//! single file, committing or amending, pushing (optionally forced), pulling
//! with fast-forward or merge, and diffing two tips. [`RepositoryGateway`] is
//! the seam the engine talks to; [`GitGateway`] is the libgit2-backed
//! implementation bound to one working copy and its `origin` remote.

mod branches;
mod credentials;
mod diff;
mod gateway;
mod manager;
mod operations;
mod remote;

pub use credentials::{parse_credentials, Credential, CredentialSource, EnvFileCredentials, StaticCredentials};
pub use diff::{ChangeKind, ChangeRecord};
pub use gateway::{GitGateway, RepositoryGateway, FORCE_COMMIT_MESSAGE, ORIGIN, PUSH_TARGET};
pub use manager::{ensure_working_copy, GitManager, RepositoryNotFound};
