//! Typed results of git plumbing output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// File mode of an executable blob.
pub const MODE_EXECUTABLE: &str = "100755";
/// File mode of a symbolic link; the blob holds the link target.
pub const MODE_SYMLINK: &str = "120000";
/// File mode of a submodule (gitlink) entry.
pub const MODE_GITLINK: &str = "160000";

/// One row of remote reference discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    /// Object id, 40 or 64 hex chars depending on the remote's hash algorithm
    pub hash: String,
    /// Reference name (e.g., "HEAD", "refs/heads/main")
    #[serde(rename = "ref")]
    pub name: String,
}

impl GitRef {
    /// Parse a `<hash>\t<ref>` line.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (hash, name) = line.split_once('\t')?;
        let hash = hash.trim();
        let name = name.trim();
        if !is_object_id(hash) || name.is_empty() {
            return None;
        }
        Some(Self {
            hash: hash.to_string(),
            name: name.to_string(),
        })
    }
}

/// Object type of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    Commit,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
            EntryKind::Commit => "commit",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "blob" => Some(EntryKind::Blob),
            "tree" => Some(EntryKind::Tree),
            "commit" => Some(EntryKind::Commit),
            _ => None,
        }
    }
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Slash-separated path relative to the repository root, lossily
    /// decoded when git reports bytes that are not UTF-8
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Octal permission string (e.g., "100644")
    pub mode: String,
    pub hash: String,
    /// Path bytes exactly as git stores them
    #[serde(skip)]
    raw_path: Vec<u8>,
}

impl TreeEntry {
    pub fn new(
        path: impl Into<String>,
        kind: EntryKind,
        mode: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            raw_path: path.as_bytes().to_vec(),
            path,
            kind,
            mode: mode.into(),
            hash: hash.into(),
        }
    }

    /// Parse a `<mode> <type> <hash>\t<path>` record.
    pub fn parse_record(record: &[u8]) -> Option<Self> {
        let tab = record.iter().position(|&b| b == b'\t')?;
        let (meta, path) = (&record[..tab], &record[tab + 1..]);
        let meta = std::str::from_utf8(meta).ok()?;
        let mut fields = meta.split(' ');
        let mode = fields.next()?;
        let kind = EntryKind::parse(fields.next()?)?;
        let hash = fields.next()?;
        if fields.next().is_some() || path.is_empty() || !is_object_id(hash) {
            return None;
        }
        Some(Self {
            path: String::from_utf8_lossy(path).into_owned(),
            kind,
            mode: mode.to_string(),
            hash: hash.to_string(),
            raw_path: path.to_vec(),
        })
    }

    pub fn raw_path(&self) -> &[u8] {
        if self.raw_path.is_empty() {
            self.path.as_bytes()
        } else {
            &self.raw_path
        }
    }

    /// Relative filesystem path of the entry.
    ///
    /// On unix this is built from the raw bytes, so names that are not
    /// UTF-8 survive unchanged.
    #[cfg(unix)]
    pub fn fs_path(&self) -> PathBuf {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        PathBuf::from(OsStr::from_bytes(self.raw_path()))
    }

    #[cfg(not(unix))]
    pub fn fs_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn is_executable(&self) -> bool {
        self.mode == MODE_EXECUTABLE
    }

    pub fn is_symlink(&self) -> bool {
        self.mode == MODE_SYMLINK
    }

    pub fn is_submodule(&self) -> bool {
        self.kind == EntryKind::Commit || self.mode == MODE_GITLINK
    }
}

/// Ordered tree listing, in the order git produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    /// Parse NUL-terminated `ls-tree -z` output.
    pub fn parse(output: &[u8]) -> Option<Self> {
        let entries = output
            .split(|&b| b == 0)
            .filter(|record| !record.is_empty())
            .map(TreeEntry::parse_record)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { entries })
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn blobs(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::Blob)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Tree {
    type Item = TreeEntry;
    type IntoIter = std::vec::IntoIter<TreeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// True for a full-length object id of either hash algorithm.
pub fn is_object_id(s: &str) -> bool {
    matches!(s.len(), 40 | 64) && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
