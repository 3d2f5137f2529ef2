//! Git plumbing client backed by the `git` binary.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::process::{self, CancelToken};
use super::{GitClient, GitError, GitErrorKind, GitRef, ScratchDir, Tree};

/// Minimum git version with partial clone filters.
const MIN_GIT_VERSION: (u32, u32) = (2, 25);

/// Runs git plumbing subcommands and parses their output.
///
/// The runner is a plain value: [`GitRunner::with_work_dir`] returns a new
/// runner, so one base runner can hand out independently bound copies to
/// concurrent clones.
#[derive(Debug, Clone)]
pub struct GitRunner {
    git_binary: PathBuf,
    work_dir: Option<PathBuf>,
    temp_base: Option<PathBuf>,
    cancel: CancelToken,
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl GitRunner {
    pub fn new() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
            work_dir: None,
            temp_base: None,
            cancel: CancelToken::new(),
        }
    }

    /// Use a specific git executable instead of `git` from `PATH`.
    pub fn with_git_binary(mut self, git_binary: impl Into<PathBuf>) -> Self {
        self.git_binary = git_binary.into();
        self
    }

    /// Create temp dirs under `base` instead of the system temp dir.
    pub fn with_temp_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.temp_base = Some(base.into());
        self
    }

    /// Ensure git version is 2.25+ (required for `--filter=blob:none`).
    pub fn ensure_git_version(&self) -> Result<(), GitError> {
        let args = ["--version"];
        let output = self.output(None, &args).map_err(|e| spawn_error(&args, e))?;
        if !output.status.success() {
            return Err(GitError::from_stderr(
                GitErrorKind::CommandSpawn,
                &args,
                &output.stderr,
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout.split_whitespace().nth(2).ok_or_else(|| {
            GitError::new(
                GitErrorKind::CommandSpawn,
                format!("unexpected git version output: {}", stdout.trim()),
            )
        })?;
        let mut parts = version.split('.').map(|p| p.parse::<u32>().ok());
        let major = parts.next().flatten();
        let minor = parts.next().flatten();
        match (major, minor) {
            (Some(major), Some(minor)) if (major, minor) >= MIN_GIT_VERSION => Ok(()),
            (Some(_), Some(_)) => Err(GitError::new(
                GitErrorKind::CommandSpawn,
                format!(
                    "git {}.{}+ is required, found {}",
                    MIN_GIT_VERSION.0, MIN_GIT_VERSION.1, version
                ),
            )),
            _ => Err(GitError::new(
                GitErrorKind::CommandSpawn,
                format!("invalid git version: {}", version),
            )),
        }
    }

    /// Plain, non-bare clone with a checked-out worktree at `target`.
    pub fn clone_checkout(
        &self,
        remote_url: &str,
        depth: u32,
        branch: Option<&str>,
        target: &Path,
    ) -> Result<(), GitError> {
        let target = target.to_str().ok_or_else(|| {
            GitError::new(
                GitErrorKind::GitClone,
                format!("target path is not valid UTF-8: {}", target.display()),
            )
        })?;
        let depth = depth.to_string();
        let mut args = vec!["clone", "--quiet"];
        if depth != "0" {
            args.extend(["--depth", depth.as_str()]);
        }
        if let Some(branch) = branch {
            args.extend(["--branch", branch]);
        }
        args.extend(["--", remote_url, target]);

        tracing::debug!(remote = remote_url, target, "cloning worktree");
        self.run_checked(None, &args, GitErrorKind::GitClone)?;
        Ok(())
    }

    /// Resolve `rev` to an object id inside the bound work dir.
    pub fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        self.requires_work_dir()?;
        let stdout = self.run_checked(
            self.work_dir(),
            &["rev-parse", "--verify", "--end-of-options", rev],
            GitErrorKind::ReadTree,
        )?;
        let id = String::from_utf8_lossy(&stdout).trim().to_string();
        if !super::is_object_id(&id) {
            return Err(GitError::new(
                GitErrorKind::ReadTree,
                format!("rev-parse {} returned {:?}", rev, id),
            ));
        }
        Ok(id)
    }

    pub fn create_temp_dir(&self) -> io::Result<ScratchDir> {
        ScratchDir::create(self.temp_base.as_deref())
    }

    fn command(&self, cwd: Option<&Path>, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.git_binary);
        cmd.args(args);
        // Fail instead of prompting for credentials.
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
            if let Some(ceiling) = ceiling_for(dir) {
                cmd.env("GIT_CEILING_DIRECTORIES", ceiling);
            }
        }
        cmd
    }

    fn output(&self, cwd: Option<&Path>, args: &[&str]) -> io::Result<Output> {
        process::run(&mut self.command(cwd, args), &self.cancel)
    }

    /// Run a command and map any failure to `kind`.
    fn run_checked(
        &self,
        cwd: Option<&Path>,
        args: &[&str],
        kind: GitErrorKind,
    ) -> Result<Vec<u8>, GitError> {
        let output = self.output(cwd, args).map_err(|e| {
            GitError::with_source(kind, format!("git {}", args.join(" ")), e)
        })?;
        if !output.status.success() {
            return Err(GitError::from_stderr(kind, args, &output.stderr));
        }
        Ok(output.stdout)
    }
}

impl GitClient for GitRunner {
    fn with_work_dir(&self, dir: &Path) -> Self {
        Self {
            work_dir: Some(dir.to_path_buf()),
            ..self.clone()
        }
    }

    fn with_cancel(&self, token: &CancelToken) -> Self {
        Self {
            cancel: token.clone(),
            ..self.clone()
        }
    }

    fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    fn ls_remote(&self, remote_url: &str, pattern: &str) -> Result<Vec<GitRef>, GitError> {
        let args = ["ls-remote", "--", remote_url, pattern];
        let output = self
            .output(None, &args)
            .map_err(|e| spawn_error(&args, e))?;
        if !output.status.success() {
            return Err(GitError::from_stderr(
                GitErrorKind::CommandSpawn,
                &args,
                &output.stderr,
            ));
        }

        let refs: Vec<GitRef> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(GitRef::parse_line)
            .collect();
        if refs.is_empty() {
            return Err(GitError::new(
                GitErrorKind::NoMatchingReference,
                format!("no reference matching {:?} on {}", pattern, remote_url),
            ));
        }
        tracing::debug!(remote = remote_url, pattern, count = refs.len(), "listed remote refs");
        Ok(refs)
    }

    fn clone_repo(
        &self,
        remote_url: &str,
        shallow: bool,
        depth: u32,
        branch: Option<&str>,
    ) -> Result<(), GitError> {
        self.requires_work_dir()?;
        let depth = depth.to_string();
        let mut args = vec!["clone", "--bare", "--quiet", "--filter=blob:none"];
        if shallow && depth != "0" {
            args.extend(["--depth", depth.as_str()]);
        }
        if let Some(branch) = branch {
            args.extend(["--branch", branch]);
        }
        args.extend(["--", remote_url, "."]);

        tracing::debug!(remote = remote_url, ?branch, shallow, "cloning bare repository");
        self.run_checked(self.work_dir(), &args, GitErrorKind::GitClone)?;
        Ok(())
    }

    fn ls_tree(&self, reference: &str, path: &str) -> Result<Tree, GitError> {
        self.requires_work_dir()?;
        let mut args = vec!["ls-tree", "-r", "-t", "-z", reference];
        if !path.is_empty() && path != "." {
            args.extend(["--", path]);
        }
        let stdout = self.run_checked(self.work_dir(), &args, GitErrorKind::ReadTree)?;
        Tree::parse(&stdout).ok_or_else(|| {
            GitError::new(
                GitErrorKind::ReadTree,
                format!("unparseable output from git {}", args.join(" ")),
            )
        })
    }

    fn cat_file(&self, hash: &str) -> Result<Vec<u8>, GitError> {
        self.requires_work_dir()?;
        // In a blob-filtered clone each miss is one lazy promisor fetch.
        self.run_checked(
            self.work_dir(),
            &["cat-file", "blob", hash],
            GitErrorKind::ReadTree,
        )
    }
}

fn spawn_error(args: &[&str], err: io::Error) -> GitError {
    GitError::with_source(
        GitErrorKind::CommandSpawn,
        format!("git {}", args.join(" ")),
        err,
    )
}

/// Stop repository discovery at the parent of `dir`.
fn ceiling_for(dir: &Path) -> Option<OsString> {
    let dir = std::path::absolute(dir).ok()?;
    dir.parent().map(|p| p.as_os_str().to_os_string())
}

/// Derive a repository name from a URL, scp-style SSH path or local path.
///
/// Strips query strings, trailing slashes and a trailing `.git`, then
/// returns the last path segment.
pub fn get_repo_name(repo: &str) -> String {
    let repo = repo.split(['?', '#']).next().unwrap_or_default();
    let repo = repo.trim_end_matches(['/', '\\']);
    let last = repo.rsplit(['/', '\\', ':']).next().unwrap_or_default();
    last.strip_suffix(".git").unwrap_or(last).to_string()
}
