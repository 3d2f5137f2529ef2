//! Working-tree construction from a tree listing and the content store.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::git::{EntryKind, Tree, TreeEntry};
use crate::store::ContentStore;

use super::CasError;
use super::marker::CLONE_COMPLETE_MARKER;

/// Write every entry of `tree` under `target`.
///
/// Blobs must already be in `store`. Submodule entries are returned
/// untouched; they are never recursed into.
pub(crate) fn materialize(
    store: &ContentStore,
    tree: &Tree,
    target: &Path,
) -> Result<Vec<TreeEntry>, CasError> {
    let mut submodules = Vec::new();

    for entry in tree.entries() {
        if entry.path == CLONE_COMPLETE_MARKER {
            tracing::warn!(path = %entry.path, "skipping entry that shadows the completion marker");
            continue;
        }
        let dest = safe_join(target, &entry.fs_path())
            .ok_or_else(|| CasError::UnsafePath(entry.path.clone()))?;

        match entry.kind {
            EntryKind::Tree => {
                fs::create_dir_all(&dest).map_err(|e| {
                    CasError::io(format!("Failed to create directory: {}", dest.display()), e)
                })?;
            }
            EntryKind::Commit => {
                tracing::debug!(path = %entry.path, commit = %entry.hash, "recording submodule");
                submodules.push(entry.clone());
            }
            EntryKind::Blob if entry.is_submodule() => submodules.push(entry.clone()),
            EntryKind::Blob => {
                ensure_parent(&dest)?;
                if entry.is_symlink() {
                    write_symlink(store, entry, &dest)?;
                } else {
                    store.copy_to(&entry.hash, &dest)?;
                    set_mode(&dest, entry.is_executable())?;
                }
            }
        }
    }

    Ok(submodules)
}

/// Join a relative repository path onto `root`, rejecting escapes.
fn safe_join(root: &Path, rel: &Path) -> Option<PathBuf> {
    let only_normal = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if rel.as_os_str().is_empty() || !only_normal {
        return None;
    }
    Some(root.join(rel))
}

fn ensure_parent(dest: &Path) -> Result<(), CasError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            CasError::io(format!("Failed to create directory: {}", parent.display()), e)
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn write_symlink(store: &ContentStore, entry: &TreeEntry, dest: &Path) -> Result<(), CasError> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let link_target = store.read(&entry.hash)?;
    std::os::unix::fs::symlink(OsStr::from_bytes(&link_target), dest).map_err(|e| {
        CasError::io(format!("Failed to create symlink: {}", dest.display()), e)
    })
}

#[cfg(not(unix))]
fn write_symlink(store: &ContentStore, entry: &TreeEntry, dest: &Path) -> Result<(), CasError> {
    // Same fallback as git with core.symlinks=false: a file holding the target.
    store.copy_to(&entry.hash, dest)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, executable: bool) -> Result<(), CasError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if executable { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
        CasError::io(format!("Failed to set permissions: {}", path.display()), e)
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _executable: bool) -> Result<(), CasError> {
    Ok(())
}
