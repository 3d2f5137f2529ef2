//! Closed error taxonomy for git plumbing calls.

use std::fmt;
use std::io;

use thiserror::Error;

/// Maximum number of stderr bytes carried in an error's context.
const MAX_DIAGNOSTIC_BYTES: usize = 512;

/// The fixed set of failure classes a git operation can report.
///
/// Callers branch on the kind, never on the rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitErrorKind {
    /// Operation requires a bound local directory; none set.
    NoWorkDir,
    /// Subprocess could not run, or the remote failed before answering.
    CommandSpawn,
    /// Remote is reachable but the requested ref does not exist.
    NoMatchingReference,
    /// The clone itself failed.
    GitClone,
    /// Local tree or object read failed.
    ReadTree,
}

impl GitErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GitErrorKind::NoWorkDir => "no working directory set",
            GitErrorKind::CommandSpawn => "failed to run git command",
            GitErrorKind::NoMatchingReference => "no matching reference",
            GitErrorKind::GitClone => "failed to clone repository",
            GitErrorKind::ReadTree => "failed to read tree",
        }
    }
}

impl fmt::Display for GitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A git failure: one [`GitErrorKind`] plus free-form context.
#[derive(Debug, Error)]
#[error("{kind}: {context}")]
pub struct GitError {
    kind: GitErrorKind,
    context: String,
    #[source]
    source: Option<io::Error>,
}

impl GitError {
    pub fn new(kind: GitErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(kind: GitErrorKind, context: impl Into<String>, source: io::Error) -> Self {
        Self {
            kind,
            context: context.into(),
            source: Some(source),
        }
    }

    /// Build an error from a failed command and its stderr.
    pub(crate) fn from_stderr(kind: GitErrorKind, args: &[&str], stderr: &[u8]) -> Self {
        Self::new(
            kind,
            format!("git {}: {}", args.join(" "), truncate_diagnostic(stderr)),
        )
    }

    pub fn kind(&self) -> GitErrorKind {
        self.kind
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// True when the call was aborted through a [`CancelToken`](super::CancelToken).
    pub fn is_cancelled(&self) -> bool {
        self.source
            .as_ref()
            .is_some_and(|e| e.kind() == io::ErrorKind::Interrupted)
    }
}

fn truncate_diagnostic(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= MAX_DIAGNOSTIC_BYTES {
        return text.to_string();
    }
    let mut end = MAX_DIAGNOSTIC_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
