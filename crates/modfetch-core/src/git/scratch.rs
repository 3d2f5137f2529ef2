//! Caller-owned temporary directories.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A freshly created, empty directory removed on cleanup or drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl ScratchDir {
    pub(crate) fn create(base: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("modfetch-");
        let dir = match base {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                builder.tempdir_in(base)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory. Safe to call more than once.
    pub fn cleanup(&mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(err) = self.cleanup() {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove temp dir");
        }
    }
}
