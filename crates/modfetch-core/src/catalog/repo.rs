//! Catalog repository checkout.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cas::{self, Cas, CloneReport, CompletionRecord};
use crate::config::FetchConfig;
use crate::git::{GitClient, get_repo_name};

use super::source::CatalogSource;

const GITHUB_HOST: &str = "github.com";
const GITLAB_HOST: &str = "gitlab.com";
const BITBUCKET_HOST: &str = "bitbucket.org";
const AZURE_DEVOPS_HOST: &str = "dev.azure.com";

/// Directory name used when the source has no usable repository name.
const FALLBACK_REPO_NAME: &str = "temp";

/// A catalog repository available on local disk.
#[derive(Debug, Clone)]
pub struct Repo {
    source: CatalogSource,
    path: PathBuf,
    remote_url: Option<String>,
    branch_name: String,
    report: Option<CloneReport>,
}

impl Repo {
    /// Make `source` available under `temp_dir` and read its git metadata.
    ///
    /// Local directories are used in place. `cas://` sources go through the
    /// content-addressed engine (only if `allow_cas`); everything else is a
    /// plain checkout. Both remote paths reuse a directory whose completion
    /// record names the same source and ref.
    pub fn new(
        source: &str,
        temp_dir: &Path,
        allow_cas: bool,
        config: &FetchConfig,
    ) -> Result<Self> {
        let mut source = CatalogSource::parse(source, allow_cas)?;
        if source.url.is_empty() {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            source.url = cwd.to_string_lossy().into_owned();
        }

        let (path, report) = if Path::new(&source.url).is_dir() {
            (local_path(&source.url)?, None)
        } else {
            fs::create_dir_all(temp_dir).with_context(|| {
                format!("Failed to create directory: {}", temp_dir.display())
            })?;
            let path = temp_dir.join(repo_dir_name(&source.url));
            let report = if source.use_cas {
                clone_cas(&source, &path, config)?
            } else {
                clone_plain(&source, &path, config)?
            };
            (path, Some(report))
        };

        let remote_url = parse_remote_url(&path)?;
        let branch_name = parse_branch_name(&path)?;
        tracing::debug!(
            path = %path.display(),
            remote = ?remote_url,
            branch = %branch_name,
            "opened catalog repo"
        );

        Ok(Self {
            source,
            path,
            remote_url,
            branch_name,
            report,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    /// URL of the preferred remote, if the repository has one.
    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_deref()
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    /// Outcome of the fetch; `None` for local directories.
    pub fn report(&self) -> Option<&CloneReport> {
        self.report.as_ref()
    }

    /// Browsable URL of `module_dir` (relative to the repository root).
    ///
    /// Without a remote this is the local path of the module.
    pub fn module_url(&self, module_dir: &str) -> Result<String> {
        let Some(remote) = &self.remote_url else {
            return Ok(self.path.join(module_dir).to_string_lossy().into_owned());
        };
        browse_url(remote, &self.branch_name, module_dir)
    }
}

fn local_path(raw: &str) -> Result<PathBuf> {
    let path = Path::new(raw);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let abs = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve path: {}", raw))?;
    tracing::debug!(from = raw, to = %abs.display(), "converted relative catalog path");
    Ok(abs)
}

fn repo_dir_name(url: &str) -> String {
    let name = get_repo_name(url);
    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_REPO_NAME.to_string()
    } else {
        name
    }
}

fn clone_cas(source: &CatalogSource, path: &Path, config: &FetchConfig) -> Result<CloneReport> {
    let mut options = config.clone_options(source.url.clone(), path)?;
    if let Some(reference) = &source.reference {
        options = options.with_reference(reference.clone());
    }
    Cas::with_client(config.runner(), options)
        .clone()
        .with_context(|| format!("Failed to fetch {}", source.url))
}

fn clone_plain(source: &CatalogSource, path: &Path, config: &FetchConfig) -> Result<CloneReport> {
    let reference = source.reference.as_deref().unwrap_or("HEAD");
    if let Some(record) = cas::reusable_record(path, &source.url, reference) {
        tracing::debug!(path = %path.display(), "reusing complete checkout");
        return Ok(CloneReport {
            path: path.to_path_buf(),
            origin: cas::CloneOrigin::Reused,
            commit: Some(record.commit),
            blobs_fetched: 0,
            blobs_reused: 0,
            submodules: Vec::new(),
        });
    }
    if path.exists() {
        tracing::debug!(
            marker = cas::CLONE_COMPLETE_MARKER,
            reference,
            "removing incomplete or stale checkout"
        );
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove stale checkout: {}", path.display()))?;
    }

    tracing::info!(source = %source.url, path = %path.display(), "cloning catalog");
    let runner = config.runner();
    runner
        .clone_checkout(&source.url, config.depth, source.reference.as_deref(), path)
        .with_context(|| format!("Failed to clone {}", source.url))?;
    let commit = runner.with_work_dir(path).rev_parse("HEAD")?;

    cas::write_marker(
        path,
        &CompletionRecord {
            source: source.url.clone(),
            reference: reference.to_string(),
            commit: commit.clone(),
            completed_at: Utc::now(),
            blobs_fetched: 0,
            blobs_reused: 0,
        },
    )?;

    Ok(CloneReport {
        path: path.to_path_buf(),
        origin: cas::CloneOrigin::Fetched,
        commit: Some(commit),
        blobs_fetched: 0,
        blobs_reused: 0,
        submodules: Vec::new(),
    })
}

/// Read the remote URL from `<dir>/.git/config`.
///
/// `origin` wins; otherwise the first remote with a URL. `Ok(None)` when
/// the repository has no remotes.
pub fn parse_remote_url(dir: &Path) -> Result<Option<String>> {
    let config_path = dir.join(".git").join("config");
    if !config_path.is_file() {
        anyhow::bail!(
            "the specified path {:?} is not a git repository (no .git/config file found)",
            dir
        );
    }

    let config = git2::Config::open(&config_path)
        .with_context(|| format!("Failed to parse git config: {}", config_path.display()))?;
    if let Ok(url) = config.get_string("remote.origin.url") {
        return Ok(Some(url));
    }

    let mut entries = config
        .entries(Some(r"remote\..*\.url"))
        .with_context(|| format!("Failed to read remotes from {}", config_path.display()))?;
    while let Some(entry) = entries.next() {
        let entry = entry?;
        if let Some(url) = entry.value() {
            return Ok(Some(url.to_string()));
        }
    }
    Ok(None)
}

/// Read the checked-out branch (or detached commit) from `<dir>/.git/HEAD`.
pub fn parse_branch_name(dir: &Path) -> Result<String> {
    let head_path = dir.join(".git").join("HEAD");
    let data = fs::read_to_string(&head_path).map_err(|_| {
        anyhow::anyhow!(
            "the specified path {:?} is not a git repository (no .git/HEAD file found)",
            dir
        )
    })?;

    match data.trim().rsplit('/').next() {
        Some(name) if !name.trim().is_empty() => {
            Ok(name.trim_start_matches("ref: ").trim().to_string())
        }
        _ => anyhow::bail!("could not get branch name for repo {:?}", dir),
    }
}

/// Host and `owner/repo` path of a remote URL, including scp-like forms.
fn split_remote(remote: &str) -> Result<(String, String)> {
    let parsed = match Url::parse(remote) {
        Ok(url) if url.host_str().is_some() => url,
        _ => {
            let normalized = match remote.split_once(':') {
                Some((host, path)) if !host.contains('/') => format!("ssh://{}/{}", host, path),
                _ => format!("https://{}", remote),
            };
            Url::parse(&normalized)
                .with_context(|| format!("Failed to parse remote URL: {}", remote))?
        }
    };

    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("remote URL has no host: {}", remote))?
        .to_ascii_lowercase();
    let path = parsed.path().trim_matches('/');
    let full_name = path.strip_suffix(".git").unwrap_or(path).to_string();
    Ok((host, full_name))
}

fn browse_url(remote: &str, branch: &str, module_dir: &str) -> Result<String> {
    let (host, full_name) = split_remote(remote)?;

    let github_style = host == GITHUB_HOST || is_self_hosted(&host, "github.");
    let gitlab_style = host == GITLAB_HOST || is_self_hosted(&host, "gitlab.");

    if github_style {
        Ok(format!("https://{}/{}/tree/{}/{}", host, full_name, branch, module_dir))
    } else if gitlab_style {
        Ok(format!("https://{}/{}/-/tree/{}/{}", host, full_name, branch, module_dir))
    } else if host == BITBUCKET_HOST {
        Ok(format!("https://{}/{}/browse/{}?at={}", host, full_name, module_dir, branch))
    } else if host == AZURE_DEVOPS_HOST {
        Ok(format!(
            "https://{}/{}?path={}&version=GB{}",
            host, full_name, module_dir, branch
        ))
    } else {
        anyhow::bail!("hosting: {:?} is not supported yet", host)
    }
}

/// `github.corp.example` style hosts.
fn is_self_hosted(host: &str, prefix: &str) -> bool {
    host.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty())
}
