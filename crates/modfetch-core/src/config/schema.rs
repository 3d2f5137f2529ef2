//! Configuration schema for modfetch.toml

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::cas::{CloneOptions, DEFAULT_DEPTH, DEFAULT_INCLUDED_GIT_FILES};
use crate::git::GitRunner;

/// Environment variable overriding `store_path`
pub const ENV_STORE_PATH: &str = "MODFETCH_STORE_PATH";
/// Environment variable overriding `git_binary`
pub const ENV_GIT_BINARY: &str = "MODFETCH_GIT";

/// Root configuration structure for modfetch.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Content store root (defaults to the user cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Git executable, resolved through `PATH` when relative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_binary: Option<PathBuf>,

    /// History depth for symbolic refs; 0 fetches everything
    pub depth: u32,

    /// Files copied from the fetched repository into `<target>/.git`
    pub included_git_files: Vec<String>,

    /// Parent directory for scratch clones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            git_binary: None,
            depth: DEFAULT_DEPTH,
            included_git_files: DEFAULT_INCLUDED_GIT_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            temp_dir: None,
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default content store location
    ///
    /// # Returns
    /// - Linux: `$XDG_CACHE_HOME/modfetch/store` or `~/.cache/modfetch/store`
    /// - macOS: `~/Library/Caches/modfetch/store`
    /// - Windows: `%LOCALAPPDATA%\modfetch\store`
    pub fn default_store_path() -> anyhow::Result<PathBuf> {
        let base = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine cache directory"))?;
        Ok(base.join("modfetch").join("store"))
    }

    pub fn store_path(&self) -> anyhow::Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_store_path(),
        }
    }

    pub fn git_binary(&self) -> PathBuf {
        self.git_binary
            .clone()
            .unwrap_or_else(|| PathBuf::from("git"))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STORE_PATH).filter(|v| !v.is_empty()) {
            self.store_path = Some(PathBuf::from(path));
        }
        if let Some(git) = lookup(ENV_GIT_BINARY).filter(|v| !v.is_empty()) {
            self.git_binary = Some(PathBuf::from(git));
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for name in &self.included_git_files {
            validate_git_file(name)
                .with_context(|| format!("Invalid included_git_files entry: '{}'", name))?;
        }
        if let Some(store) = &self.store_path
            && store.as_os_str().is_empty()
        {
            anyhow::bail!("store_path must not be empty");
        }
        Ok(())
    }

    /// Git runner honouring `git_binary` and `temp_dir`.
    pub fn runner(&self) -> GitRunner {
        let runner = GitRunner::new().with_git_binary(self.git_binary());
        match &self.temp_dir {
            Some(dir) => runner.with_temp_base(dir),
            None => runner,
        }
    }

    /// Clone options for `source` into `target`, filled from this config.
    pub fn clone_options(
        &self,
        source: impl Into<String>,
        target: impl Into<PathBuf>,
    ) -> anyhow::Result<CloneOptions> {
        let mut options = CloneOptions::new(source, target, self.store_path()?)
            .with_depth(self.depth)
            .with_included_git_files(self.included_git_files.iter().cloned());
        if let Some(dir) = &self.temp_dir {
            options = options.with_temp_dir(dir);
        }
        Ok(options)
    }
}

/// Git metadata names must stay inside `.git/`.
fn validate_git_file(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        anyhow::bail!("file name must not be empty");
    }
    let only_normal = Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !only_normal {
        anyhow::bail!("file name must be a relative path without '..'");
    }
    Ok(())
}
