use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

const GIT_ENV_OVERRIDES: [&str; 4] = [
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_COMMON_DIR",
];

pub fn git_command() -> Command {
    let mut cmd = Command::new("git");
    for key in GIT_ENV_OVERRIDES {
        cmd.env_remove(key);
    }
    cmd
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = git_command()
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn file_url(path: &Path) -> String {
    url::Url::from_directory_path(path)
        .expect("repo root should convert to file URL")
        .to_string()
}

/// A module catalog committed on `main` and tagged `v1.0.0`.
///
/// Layout:
/// - `README.md`
/// - `modules/vpc/main.tf`
/// - `modules/vpc/hook.sh` (executable)
/// - `modules/dns/README.md` (same bytes as the root README)
/// - `vpc -> modules/vpc` (unix only)
pub struct Catalog {
    pub temp: TempDir,
    pub root: PathBuf,
    pub url: String,
}

impl Catalog {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().join("catalog");
        fs::create_dir_all(root.join("modules/vpc")).unwrap();
        fs::create_dir_all(root.join("modules/dns")).unwrap();

        git(&root, &["init", "--quiet"]);
        git(&root, &["checkout", "--quiet", "-b", "main"]);
        git(&root, &["config", "user.email", "test@example.com"]);
        git(&root, &["config", "user.name", "Test User"]);
        git(&root, &["config", "commit.gpgsign", "false"]);
        git(&root, &["config", "tag.gpgsign", "false"]);
        // Allow promisor fetches of missing blobs from file:// remotes.
        git(&root, &["config", "uploadpack.allowFilter", "true"]);
        git(&root, &["config", "uploadpack.allowAnySHA1InWant", "true"]);

        fs::write(root.join("README.md"), "# Catalog\n").unwrap();
        fs::write(root.join("modules/dns/README.md"), "# Catalog\n").unwrap();
        fs::write(
            root.join("modules/vpc/main.tf"),
            "variable \"cidr\" {\n  type = string\n}\n",
        )
        .unwrap();
        fs::write(root.join("modules/vpc/hook.sh"), "#!/bin/sh\necho ok\n").unwrap();
        set_executable(&root.join("modules/vpc/hook.sh"));
        #[cfg(unix)]
        std::os::unix::fs::symlink("modules/vpc", root.join("vpc")).unwrap();

        git(&root, &["add", "-A"]);
        git(&root, &["commit", "--quiet", "-m", "initial catalog"]);
        git(&root, &["tag", "v1.0.0"]);

        let url = file_url(&root);
        Self { temp, root, url }
    }

    pub fn head(&self) -> String {
        git(&self.root, &["rev-parse", "HEAD"])
    }

    /// Commit a change on a new branch and return to `main`.
    pub fn add_branch(&self, branch: &str, file: &str, contents: &str) -> String {
        git(&self.root, &["checkout", "--quiet", "-b", branch]);
        fs::write(self.root.join(file), contents).unwrap();
        git(&self.root, &["add", "-A"]);
        git(&self.root, &["commit", "--quiet", "-m", "branch change"]);
        let head = self.head();
        git(&self.root, &["checkout", "--quiet", "main"]);
        head
    }

    /// Tag `HEAD` of `main` with an annotated tag and return the commit.
    pub fn annotated_tag(&self, name: &str) -> String {
        git(&self.root, &["tag", "-a", name, "-m", "release"]);
        self.head()
    }

    /// Commit `contents` at `rel` on `main` and return the new head.
    pub fn commit_file(&self, rel: &Path, contents: &[u8]) -> String {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        git(&self.root, &["add", "-A"]);
        git(&self.root, &["commit", "--quiet", "-m", "add file"]);
        self.head()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) {}
