//! Protocol seam between the orchestrator and git.

use std::path::Path;

use super::{CancelToken, GitError, GitErrorKind, GitRef, Tree};

/// Request/response view of the git plumbing commands the engine needs.
///
/// [`GitRunner`](super::GitRunner) speaks to the real binary; tests swap in
/// a deterministic fake.
pub trait GitClient: Clone + Send + Sync {
    /// Return a client bound to `dir`, leaving `self` untouched.
    fn with_work_dir(&self, dir: &Path) -> Self;

    /// Return a client whose long-running calls observe `token`.
    fn with_cancel(&self, _token: &CancelToken) -> Self {
        self.clone()
    }

    fn work_dir(&self) -> Option<&Path>;

    fn requires_work_dir(&self) -> Result<(), GitError> {
        match self.work_dir() {
            Some(_) => Ok(()),
            None => Err(GitError::new(
                GitErrorKind::NoWorkDir,
                "a working directory must be set before calling this operation",
            )),
        }
    }

    fn ls_remote(&self, remote_url: &str, pattern: &str) -> Result<Vec<GitRef>, GitError>;

    fn clone_repo(
        &self,
        remote_url: &str,
        shallow: bool,
        depth: u32,
        branch: Option<&str>,
    ) -> Result<(), GitError>;

    fn ls_tree(&self, reference: &str, path: &str) -> Result<Tree, GitError>;

    fn cat_file(&self, hash: &str) -> Result<Vec<u8>, GitError>;
}
