//! The CAS clone pipeline.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::git::{
    GitClient, GitError, GitErrorKind, GitRef, GitRunner, ScratchDir, Tree, TreeEntry, is_object_id,
};
use crate::store::ContentStore;

use super::marker::{self, CompletionRecord};
use super::materialize::materialize;
use super::{CasError, CloneOptions};

/// Cache misses buffered before they are flushed to the store.
const STORE_BATCH_SIZE: usize = 64;

/// Store temp files older than this belong to writers that died.
const STALE_TEMP_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// How the result directory came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneOrigin {
    /// Built by this call.
    Fetched,
    /// Already complete from an earlier call; left untouched.
    Reused,
    /// Source was a local directory, used in place.
    Local,
}

/// Outcome of a successful clone.
#[derive(Debug, Clone, Serialize)]
pub struct CloneReport {
    pub path: PathBuf,
    pub origin: CloneOrigin,
    /// Resolved object id, when known
    pub commit: Option<String>,
    pub blobs_fetched: usize,
    pub blobs_reused: usize,
    /// Submodule entries recorded but not expanded
    pub submodules: Vec<TreeEntry>,
}

impl CloneReport {
    fn without_fetch(path: PathBuf, origin: CloneOrigin, commit: Option<String>) -> Self {
        Self {
            path,
            origin,
            commit,
            blobs_fetched: 0,
            blobs_reused: 0,
            submodules: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct FetchStats {
    fetched: usize,
    reused: usize,
}

/// Turns a remote source plus ref into a complete local directory.
///
/// Git discovery and blob reads go through `G`; blob bytes are
/// deduplicated in a [`ContentStore`] shared by every clone using the same
/// store path.
#[derive(Debug)]
pub struct Cas<G = GitRunner> {
    git: G,
    store: ContentStore,
    options: CloneOptions,
}

impl Cas<GitRunner> {
    pub fn new(options: CloneOptions) -> Self {
        Self::with_client(GitRunner::new(), options)
    }
}

impl<G: GitClient> Cas<G> {
    pub fn with_client(git: G, options: CloneOptions) -> Self {
        let store = ContentStore::new(options.store_path.clone());
        Self {
            git,
            store,
            options,
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn options(&self) -> &CloneOptions {
        &self.options
    }

    #[tracing::instrument(
        name = "cas_clone",
        skip(self),
        fields(source = %self.options.source_url, target = %self.options.target_dir.display())
    )]
    pub fn clone(&self) -> Result<CloneReport, CasError> {
        let source = self.resolve_source()?;
        let source_path = Path::new(&source);
        if source_path.is_dir() {
            let path = std::path::absolute(source_path).map_err(|e| {
                CasError::io(format!("Failed to resolve path: {}", source), e)
            })?;
            tracing::debug!(path = %path.display(), "using local directory in place");
            return Ok(CloneReport::without_fetch(path, CloneOrigin::Local, None));
        }

        let target = self.options.target_dir.as_path();
        let reference = self.options.reference();
        if let Some(record) = self.prepare_target(target, &source, reference)? {
            tracing::debug!(commit = %record.commit, "target already complete");
            return Ok(CloneReport::without_fetch(
                target.to_path_buf(),
                CloneOrigin::Reused,
                Some(record.commit),
            ));
        }
        self.sweep_store_temp();

        let git = self.git.with_cancel(&self.options.cancel);
        let commit = self.resolve_ref(&git, &source, reference)?;

        let mut scratch = ScratchDir::create(self.options.temp_dir.as_deref())
            .map_err(|e| CasError::io("Failed to create temp dir", e))?;
        let repo = git.with_work_dir(scratch.path());

        // Object ids are not valid `--branch` values and need full history.
        let (shallow, branch) = if is_object_id(reference) {
            (false, None)
        } else if reference == "HEAD" {
            (self.options.depth > 0, None)
        } else {
            (self.options.depth > 0, Some(reference))
        };
        repo.clone_repo(&source, shallow, self.options.depth, branch)?;

        let tree = repo.ls_tree(&commit, ".")?;
        tracing::debug!(entries = tree.len(), %commit, "enumerated tree");

        let stats = self.fetch_blobs(&repo, &tree)?;
        let submodules = materialize(&self.store, &tree, target)?;
        self.copy_git_files(scratch.path(), target)?;

        marker::write_marker(
            target,
            &CompletionRecord {
                source: source.clone(),
                reference: reference.to_string(),
                commit: commit.clone(),
                completed_at: Utc::now(),
                blobs_fetched: stats.fetched,
                blobs_reused: stats.reused,
            },
        )?;

        if let Err(err) = scratch.cleanup() {
            tracing::warn!(path = %scratch.path().display(), error = %err, "failed to remove temp dir");
        }

        tracing::info!(
            %commit,
            fetched = stats.fetched,
            reused = stats.reused,
            "clone complete"
        );
        Ok(CloneReport {
            path: target.to_path_buf(),
            origin: CloneOrigin::Fetched,
            commit: Some(commit),
            blobs_fetched: stats.fetched,
            blobs_reused: stats.reused,
            submodules,
        })
    }

    fn resolve_source(&self) -> Result<String, CasError> {
        if !self.options.source_url.is_empty() {
            return Ok(self.options.source_url.clone());
        }
        let cwd = std::env::current_dir()
            .map_err(|e| CasError::io("Failed to read current directory", e))?;
        Ok(cwd.to_string_lossy().into_owned())
    }

    /// Returns the record of `target` if it already holds a complete clone
    /// of `source` at `reference`.
    ///
    /// Anything else found at `target` is removed: debris from an
    /// interrupted run, or a complete clone of a different request.
    fn prepare_target(
        &self,
        target: &Path,
        source: &str,
        reference: &str,
    ) -> Result<Option<CompletionRecord>, CasError> {
        if target.exists() {
            if let Some(record) = marker::reusable_record(target, source, reference) {
                return Ok(Some(record));
            }
            if marker::is_complete(target) {
                tracing::debug!(reference, "removing complete clone of another request");
            } else {
                tracing::debug!(
                    marker = marker::CLONE_COMPLETE_MARKER,
                    "removing incomplete clone directory"
                );
            }
            fs::remove_dir_all(target).map_err(|e| {
                CasError::io(format!("Failed to remove stale clone: {}", target.display()), e)
            })?;
        }
        fs::create_dir_all(target).map_err(|e| {
            CasError::io(format!("Failed to create target directory: {}", target.display()), e)
        })?;
        Ok(None)
    }

    /// Drop temp files abandoned in the store by crashed writers.
    fn sweep_store_temp(&self) {
        match self.store.purge_stale_temp(STALE_TEMP_AGE) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "removed stale store temp files"),
            Err(err) => tracing::warn!(error = %err, "failed to sweep store temp dir"),
        }
    }

    fn resolve_ref(&self, git: &G, source: &str, reference: &str) -> Result<String, CasError> {
        if is_object_id(reference) {
            return Ok(reference.to_string());
        }
        let refs = git.ls_remote(source, reference)?;
        let selected = select_ref(&refs, reference).ok_or_else(|| {
            GitError::new(
                GitErrorKind::NoMatchingReference,
                format!("no reference matching {:?} on {}", reference, source),
            )
        })?;
        tracing::debug!(reference, resolved = %selected.hash, name = %selected.name, "resolved ref");

        // An annotated tag points at a tag object; record the commit it peels to.
        if selected.name.starts_with("refs/tags/") && !selected.name.ends_with(PEELED_SUFFIX) {
            match git.ls_remote(source, &format!("{}{}", reference, PEELED_SUFFIX)) {
                Ok(peeled) => {
                    if let Some(commit) = select_ref(&peeled, reference) {
                        return Ok(commit.hash.clone());
                    }
                }
                Err(err) if err.kind() == GitErrorKind::NoMatchingReference => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(selected.hash.clone())
    }

    /// Store every blob of `tree`, fetching only cache misses.
    fn fetch_blobs(&self, repo: &G, tree: &Tree) -> Result<FetchStats, CasError> {
        let mut stats = FetchStats::default();
        let mut seen = HashSet::new();
        let mut pending: HashMap<String, Vec<u8>> = HashMap::new();

        for entry in tree.blobs().filter(|e| !e.is_submodule()) {
            if !seen.insert(entry.hash.as_str()) {
                continue;
            }
            if self.store.contains(&entry.hash) {
                stats.reused += 1;
                continue;
            }
            let data = repo.cat_file(&entry.hash)?;
            pending.insert(entry.hash.clone(), data);
            stats.fetched += 1;
            if pending.len() >= STORE_BATCH_SIZE {
                self.store.store_batch(&pending)?;
                pending.clear();
            }
        }
        if !pending.is_empty() {
            self.store.store_batch(&pending)?;
        }
        Ok(stats)
    }

    /// Copy the configured metadata files into `<target>/.git`.
    fn copy_git_files(&self, repo_dir: &Path, target: &Path) -> Result<(), CasError> {
        if self.options.included_git_files.is_empty() {
            return Ok(());
        }
        let git_dir = target.join(".git");
        fs::create_dir_all(&git_dir).map_err(|e| {
            CasError::io(format!("Failed to create directory: {}", git_dir.display()), e)
        })?;

        for name in &self.options.included_git_files {
            let src = [repo_dir.join(name), repo_dir.join(".git").join(name)]
                .into_iter()
                .find(|p| p.is_file())
                .ok_or_else(|| CasError::MissingGitFile {
                    name: name.clone(),
                    dir: repo_dir.to_path_buf(),
                })?;
            let dest = git_dir.join(name);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    CasError::io(format!("Failed to create directory: {}", parent.display()), e)
                })?;
            }
            fs::copy(&src, &dest).map_err(|e| {
                CasError::io(format!("Failed to copy git file: {}", src.display()), e)
            })?;
        }
        Ok(())
    }
}

/// Suffix `ls-remote` puts on the row of the commit an annotated tag peels to.
const PEELED_SUFFIX: &str = "^{}";

/// Pick the best match for `reference` among `ls-remote` rows.
///
/// Exact names win, then branches, then tags (peeled rows first), then
/// whatever came first.
fn select_ref<'a>(refs: &'a [GitRef], reference: &str) -> Option<&'a GitRef> {
    let branch = format!("refs/heads/{}", reference);
    let tag = format!("refs/tags/{}", reference);
    let peeled_tag = format!("{}{}", tag, PEELED_SUFFIX);
    refs.iter()
        .find(|r| r.name == reference)
        .or_else(|| refs.iter().find(|r| r.name == branch))
        .or_else(|| refs.iter().find(|r| r.name == peeled_tag))
        .or_else(|| refs.iter().find(|r| r.name == tag))
        .or_else(|| refs.first())
}
