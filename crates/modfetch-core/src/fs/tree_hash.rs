//! Deterministic tree hashing for materialized clones
//!
//! Computes a stable hash of a directory tree, useful for:
//! - Checking that two clones of the same ref are identical
//! - Change detection between runs

use anyhow::Context;
use std::fs;
use std::path::Path;

/// Compute deterministic tree hash of a directory
///
/// # Algorithm
/// - Recursive directory traversal, entries sorted by name
/// - Files: `path || 0x00 || exec flag || content`
/// - Symlinks: `path || 0x01 || link target` (not followed)
/// - Directories: `path || 0xFF`, then their children
/// - Output: blake3 hex string
///
/// Names listed in `skip` are ignored at the top level only, so git
/// metadata and the completion marker do not affect the hash.
///
/// # Example
/// ```no_run
/// use modfetch_core::fs::hash_tree;
/// use std::path::Path;
///
/// let hash = hash_tree(Path::new("/path/to/dir"), &[".git"])?;
/// assert_eq!(hash.len(), 64); // blake3 hex output
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn hash_tree(path: &Path, skip: &[&str]) -> anyhow::Result<String> {
    let mut hasher = blake3::Hasher::new();
    hash_dir_recursive(&mut hasher, path, "", skip)?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_dir_recursive(
    hasher: &mut blake3::Hasher,
    dir: &Path,
    base: &str,
    skip: &[&str],
) -> anyhow::Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut sorted_entries: Vec<_> = entries
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    sorted_entries.sort_by_key(|e| e.file_name());

    for entry in sorted_entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if base.is_empty() && skip.iter().any(|s| *s == name_str) {
            continue;
        }
        let rel_path = if base.is_empty() {
            name_str.to_string()
        } else {
            format!("{}/{}", base, name_str)
        };

        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat file: {}", entry.path().display()))?;

        if ty.is_symlink() {
            let target = fs::read_link(entry.path())
                .with_context(|| format!("Failed to read link: {}", entry.path().display()))?;
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0x01]);
            hasher.update(target.to_string_lossy().as_bytes());
        } else if ty.is_dir() {
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0xFF]);
            hash_dir_recursive(hasher, &entry.path(), &rel_path, skip)?;
        } else if ty.is_file() {
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0x00]);
            hasher.update(&[u8::from(is_executable(&entry.path())?)]);
            let content = fs::read(entry.path())
                .with_context(|| format!("Failed to read file: {}", entry.path().display()))?;
            hasher.update(&content);
        } else {
            anyhow::bail!(
                "Unsupported filesystem entry type: {}",
                entry.path().display()
            );
        }
    }

    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> anyhow::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let meta =
        fs::metadata(path).with_context(|| format!("Failed to stat file: {}", path.display()))?;
    Ok(meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> anyhow::Result<bool> {
    Ok(false)
}
