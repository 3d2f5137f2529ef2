//! Completion marker for materialized clones.
//!
//! A target directory is complete if and only if the marker file exists.
//! Reusing a complete directory additionally needs a record naming the same
//! source and ref as the new request.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CasError;

pub const CLONE_COMPLETE_MARKER: &str = ".modfetch-clone-complete";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub source: String,
    pub reference: String,
    pub commit: String,
    pub completed_at: DateTime<Utc>,
    pub blobs_fetched: usize,
    pub blobs_reused: usize,
}

impl CompletionRecord {
    pub fn matches(&self, source: &str, reference: &str) -> bool {
        self.source == source && self.reference == reference
    }
}

pub fn marker_path(dir: &Path) -> PathBuf {
    dir.join(CLONE_COMPLETE_MARKER)
}

pub fn is_complete(dir: &Path) -> bool {
    marker_path(dir).is_file()
}

/// Read the record of a complete directory, if it has a parseable one.
pub fn read_record(dir: &Path) -> Option<CompletionRecord> {
    let bytes = fs::read(marker_path(dir)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// The record of `dir` if it is a complete result of `source` at `reference`.
///
/// `None` when the marker is missing, unreadable or names another request.
pub fn reusable_record(dir: &Path, source: &str, reference: &str) -> Option<CompletionRecord> {
    read_record(dir).filter(|r| r.matches(source, reference))
}

/// Write the marker atomically (tmp + rename). This is the commit point.
pub(crate) fn write_marker(dir: &Path, record: &CompletionRecord) -> Result<(), CasError> {
    let path = marker_path(dir);
    let tmp_path = dir.join(format!("{}.{}.tmp", CLONE_COMPLETE_MARKER, std::process::id()));

    let bytes = serde_json::to_vec_pretty(record)
        .map_err(|e| CasError::io("Failed to serialize completion record", e.into()))?;
    fs::write(&tmp_path, bytes).map_err(|e| {
        CasError::io(format!("Failed to write marker: {}", tmp_path.display()), e)
    })?;
    fs::rename(&tmp_path, &path).map_err(|e| {
        CasError::io(format!("Failed to commit marker: {}", path.display()), e)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record() -> CompletionRecord {
        CompletionRecord {
            source: "https://example.com/modules.git".to_string(),
            reference: "HEAD".to_string(),
            commit: "3b18e512dba79e4c8300dd08aeb37f8e728b8dad".to_string(),
            completed_at: Utc::now(),
            blobs_fetched: 3,
            blobs_reused: 1,
        }
    }

    #[test]
    fn write_then_read() {
        let tmp = TempDir::new().unwrap();
        assert!(!is_complete(tmp.path()));

        let rec = record();
        write_marker(tmp.path(), &rec).unwrap();
        assert!(is_complete(tmp.path()));
        assert_eq!(read_record(tmp.path()), Some(rec));
    }

    #[test]
    fn empty_marker_counts_as_complete() {
        let tmp = TempDir::new().unwrap();
        fs::write(marker_path(tmp.path()), b"").unwrap();
        assert!(is_complete(tmp.path()));
        assert_eq!(read_record(tmp.path()), None);
        assert_eq!(reusable_record(tmp.path(), "https://example.com/modules.git", "HEAD"), None);
    }

    #[test]
    fn reuse_requires_same_source_and_ref() {
        let tmp = TempDir::new().unwrap();
        let rec = record();
        write_marker(tmp.path(), &rec).unwrap();

        assert_eq!(
            reusable_record(tmp.path(), "https://example.com/modules.git", "HEAD"),
            Some(rec)
        );
        assert!(reusable_record(tmp.path(), "https://example.com/modules.git", "v2.0.0").is_none());
        assert!(reusable_record(tmp.path(), "https://example.com/other.git", "HEAD").is_none());
    }
}
