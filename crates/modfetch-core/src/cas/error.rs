//! Orchestrator errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::git::{GitError, GitErrorKind};
use crate::store::StoreError;

/// Failure of a CAS clone.
///
/// Git and store failures are forwarded unchanged, so callers can still
/// match on [`GitErrorKind`] via [`CasError::git_kind`].
#[derive(Debug, Error)]
pub enum CasError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("refusing to materialize path outside the target directory: {0:?}")]
    UnsafePath(String),

    #[error("git metadata file {name:?} not found in {}", .dir.display())]
    MissingGitFile { name: String, dir: PathBuf },
}

impl CasError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The originating git sentinel, if this failure came from git.
    pub fn git_kind(&self) -> Option<GitErrorKind> {
        match self {
            CasError::Git(err) => Some(err.kind()),
            _ => None,
        }
    }
}
