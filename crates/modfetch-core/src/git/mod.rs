//! Git plumbing client.
//!
//! This module drives git's scriptable subcommands and nothing else:
//! - Discovering remote refs (`ls-remote`)
//! - Blob-filtered bare clones into a bound working directory
//! - Recursive tree listing (`ls-tree`) and blob reads (`cat-file`)
//!
//! Every failure is reported as a [`GitError`] carrying exactly one
//! [`GitErrorKind`].

mod client;
mod error;
mod process;
mod runner;
mod scratch;
mod types;

pub use client::GitClient;
pub use error::{GitError, GitErrorKind};
pub use process::CancelToken;
pub use runner::{GitRunner, get_repo_name};
pub use scratch::ScratchDir;
pub use types::{
    EntryKind, GitRef, MODE_EXECUTABLE, MODE_GITLINK, MODE_SYMLINK, Tree, TreeEntry, is_object_id,
};

#[cfg(test)]
mod tests;
