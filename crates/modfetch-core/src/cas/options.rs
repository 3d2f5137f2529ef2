//! Clone options.

use std::path::PathBuf;

use crate::git::CancelToken;

/// Git metadata files copied into `<target>/.git` by default.
pub const DEFAULT_INCLUDED_GIT_FILES: &[&str] = &["HEAD", "config"];

/// Default history depth for symbolic refs.
pub const DEFAULT_DEPTH: u32 = 1;

/// Inputs of a single CAS clone.
#[derive(Debug, Clone)]
pub struct CloneOptions {
    /// Remote URL, or a local directory used in place. Empty means the
    /// current directory.
    pub source_url: String,
    /// Directory that receives the working tree
    pub target_dir: PathBuf,
    /// Root of the shared content store
    pub store_path: PathBuf,
    /// Files copied verbatim from the fetched repository into `.git/`
    pub included_git_files: Vec<String>,
    /// Branch, tag or object id; `None` means the remote's `HEAD`
    pub reference: Option<String>,
    /// History depth for symbolic refs; 0 fetches full history
    pub depth: u32,
    /// Parent directory for scratch clones (system temp dir if `None`)
    pub temp_dir: Option<PathBuf>,
    pub cancel: CancelToken,
}

impl CloneOptions {
    pub fn new(
        source_url: impl Into<String>,
        target_dir: impl Into<PathBuf>,
        store_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            target_dir: target_dir.into(),
            store_path: store_path.into(),
            included_git_files: DEFAULT_INCLUDED_GIT_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reference: None,
            depth: DEFAULT_DEPTH,
            temp_dir: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_included_git_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_git_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The requested ref, defaulting to `HEAD`.
    pub fn reference(&self) -> &str {
        self.reference.as_deref().unwrap_or("HEAD")
    }
}
