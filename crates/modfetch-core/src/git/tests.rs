//! Tests for the git module.

use super::*;

mod repo_name_tests {
    use super::*;

    #[test]
    fn strips_git_suffix_from_url() {
        assert_eq!(get_repo_name("https://github.com/user/repo.git"), "repo");
    }

    #[test]
    fn url_without_suffix() {
        assert_eq!(get_repo_name("https://github.com/user/repo"), "repo");
    }

    #[test]
    fn filesystem_path() {
        assert_eq!(get_repo_name("/path/to/repo.git"), "repo");
        assert_eq!(get_repo_name("relative/dir/modules/"), "modules");
    }

    #[test]
    fn scp_style_ssh() {
        assert_eq!(get_repo_name("git@github.com:org/infra-modules.git"), "infra-modules");
        assert_eq!(get_repo_name("git@example.com:catalog.git"), "catalog");
    }

    #[test]
    fn query_is_ignored() {
        assert_eq!(
            get_repo_name("https://github.com/org/modules.git?ref=v1.2.0"),
            "modules"
        );
    }
}

mod git_runner_tests {
    use super::*;
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn run_git(repo: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(repo)
            .status()
            .expect("Failed to invoke git");
        assert!(status.success(), "git command failed: {:?}", args);
    }

    fn init_test_repo(repo: &Path) {
        std::fs::create_dir_all(repo.join("modules/vpc")).expect("Failed to create repo dir");
        run_git(repo, &["init"]);
        run_git(repo, &["checkout", "-b", "main"]);
        run_git(repo, &["config", "user.email", "test@example.com"]);
        run_git(repo, &["config", "user.name", "Test User"]);
        run_git(repo, &["config", "commit.gpgsign", "false"]);
        run_git(repo, &["config", "uploadpack.allowFilter", "true"]);

        std::fs::write(repo.join("README.md"), "# Catalog\n").expect("Failed to write README");
        std::fs::write(
            repo.join("modules/vpc/main.tf"),
            "resource \"null_resource\" \"vpc\" {}\n",
        )
        .expect("Failed to write main.tf");

        run_git(repo, &["add", "."]);
        run_git(repo, &["commit", "-m", "init"]);
    }

    fn git_rev_parse(repo: &Path, rev: &str) -> String {
        let output = Command::new("git")
            .args(["rev-parse", rev])
            .current_dir(repo)
            .output()
            .expect("Failed to run git rev-parse");
        assert!(output.status.success(), "git rev-parse failed");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn file_url(path: &Path) -> String {
        url::Url::from_directory_path(path)
            .expect("repo root should convert to file URL")
            .to_string()
    }

    fn fixture() -> (TempDir, String) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let repo_root = temp.path().join("repo");
        init_test_repo(&repo_root);
        let url = file_url(&repo_root);
        (temp, url)
    }

    fn cloned(url: &str) -> (TempDir, GitRunner) {
        let clone_dir = TempDir::new().expect("Failed to create temp dir");
        let runner = GitRunner::new().with_work_dir(clone_dir.path());
        runner.clone_repo(url, true, 1, Some("main")).unwrap();
        (clone_dir, runner)
    }

    #[test]
    fn ensure_git_version_succeeds() {
        let result = GitRunner::new().ensure_git_version();
        assert!(result.is_ok(), "Git version check should succeed: {:?}", result);
    }

    #[test]
    fn missing_git_binary_is_spawn_error() {
        let runner = GitRunner::new().with_git_binary("/nonexistent/bin/git");
        let err = runner.ls_remote("https://example.com/repo.git", "HEAD").unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::CommandSpawn);
    }

    #[test]
    fn ls_remote_resolves_head() {
        let (temp, url) = fixture();
        let expected = git_rev_parse(&temp.path().join("repo"), "HEAD");

        let refs = GitRunner::new().ls_remote(&url, "HEAD").unwrap();
        assert!(!refs.is_empty());
        assert_eq!(refs[0].name, "HEAD");
        assert_eq!(refs[0].hash, expected);
        assert!(is_object_id(&refs[0].hash));
    }

    #[test]
    fn ls_remote_invalid_repository() {
        let temp = TempDir::new().unwrap();
        let missing = file_url(&temp.path().join("missing"));
        let err = GitRunner::new().ls_remote(&missing, "HEAD").unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::CommandSpawn);
    }

    #[test]
    fn ls_remote_nonexistent_reference() {
        let (_temp, url) = fixture();
        let err = GitRunner::new()
            .ls_remote(&url, "nonexistent-branch")
            .unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::NoMatchingReference);
    }

    #[test]
    fn ls_remote_observes_cancellation() {
        let (_temp, url) = fixture();
        let token = CancelToken::new();
        token.cancel();
        let err = GitRunner::new()
            .with_cancel(&token)
            .ls_remote(&url, "HEAD")
            .unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::CommandSpawn);
        assert!(err.is_cancelled());
    }

    #[test]
    fn shallow_clone_creates_bare_repo() {
        let (_temp, url) = fixture();
        let (clone_dir, _runner) = cloned(&url);
        assert!(clone_dir.path().join("HEAD").exists());
        assert!(clone_dir.path().join("config").exists());
    }

    #[test]
    fn clone_without_workdir_fails() {
        let (_temp, url) = fixture();
        let err = GitRunner::new()
            .clone_repo(&url, true, 1, Some("main"))
            .unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::NoWorkDir);
    }

    #[test]
    fn clone_invalid_repository() {
        let temp = TempDir::new().unwrap();
        let clone_dir = temp.path().join("clone");
        std::fs::create_dir_all(&clone_dir).unwrap();
        let runner = GitRunner::new().with_work_dir(&clone_dir);
        let err = runner
            .clone_repo(&file_url(&temp.path().join("fake")), false, 1, None)
            .unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::GitClone);
    }

    #[test]
    fn ls_tree_lists_blobs_and_trees() {
        let (_temp, url) = fixture();
        let (_clone_dir, runner) = cloned(&url);

        let tree = runner.ls_tree("HEAD", ".").unwrap();
        let readme = tree
            .entries()
            .iter()
            .find(|e| e.path == "README.md")
            .expect("README.md should exist in the repository");
        assert_eq!(readme.kind, EntryKind::Blob);
        assert_eq!(readme.mode, "100644");
        assert!(is_object_id(&readme.hash));

        let kinds: Vec<_> = tree
            .entries()
            .iter()
            .map(|e| (e.path.as_str(), e.kind))
            .collect();
        assert!(kinds.contains(&("modules", EntryKind::Tree)));
        assert!(kinds.contains(&("modules/vpc", EntryKind::Tree)));
        assert!(kinds.contains(&("modules/vpc/main.tf", EntryKind::Blob)));
    }

    #[test]
    fn ls_tree_restricted_to_path() {
        let (_temp, url) = fixture();
        let (_clone_dir, runner) = cloned(&url);

        let tree = runner.ls_tree("HEAD", "modules").unwrap();
        assert!(!tree.is_empty());
        assert!(tree.entries().iter().all(|e| e.path.starts_with("modules")));
    }

    #[test]
    fn ls_tree_without_workdir_fails() {
        let err = GitRunner::new().ls_tree("HEAD", ".").unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::NoWorkDir);
    }

    #[test]
    fn ls_tree_invalid_reference() {
        let (_temp, url) = fixture();
        let (_clone_dir, runner) = cloned(&url);
        let err = runner.ls_tree("nonexistent", ".").unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::ReadTree);
    }

    #[test]
    fn ls_tree_in_non_repository() {
        let dir = TempDir::new().unwrap();
        let err = GitRunner::new()
            .with_work_dir(dir.path())
            .ls_tree("HEAD", ".")
            .unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::ReadTree);
    }

    #[test]
    fn ls_tree_in_empty_repository() {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "--bare"]);
        let err = GitRunner::new()
            .with_work_dir(dir.path())
            .ls_tree("HEAD", ".")
            .unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::ReadTree);
    }

    #[test]
    fn cat_file_returns_blob_bytes() {
        let (_temp, url) = fixture();
        let (_clone_dir, runner) = cloned(&url);

        let tree = runner.ls_tree("HEAD", ".").unwrap();
        let readme = tree.blobs().find(|e| e.path == "README.md").unwrap();
        let content = runner.cat_file(&readme.hash).unwrap();
        assert_eq!(content, b"# Catalog\n");
    }

    #[test]
    fn cat_file_unknown_object() {
        let (_temp, url) = fixture();
        let (_clone_dir, runner) = cloned(&url);
        let err = runner.cat_file(&"0".repeat(40)).unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::ReadTree);
    }

    #[test]
    fn clone_checkout_creates_worktree() {
        let (temp, url) = fixture();
        let target = temp.path().join("checkout");
        GitRunner::new().clone_checkout(&url, 1, None, &target).unwrap();
        assert!(target.join(".git").join("HEAD").exists());
        assert!(target.join("modules/vpc/main.tf").exists());
    }

    #[test]
    fn rev_parse_resolves_checkout_head() {
        let (temp, url) = fixture();
        let target = temp.path().join("checkout");
        let runner = GitRunner::new();
        runner.clone_checkout(&url, 0, Some("main"), &target).unwrap();

        let head = runner.with_work_dir(&target).rev_parse("HEAD").unwrap();
        assert_eq!(head, git_rev_parse(&temp.path().join("repo"), "HEAD"));

        let err = runner.with_work_dir(&target).rev_parse("no-such-rev").unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::ReadTree);
    }

    #[test]
    fn requires_work_dir_guard() {
        let dir = TempDir::new().unwrap();
        assert!(GitRunner::new().with_work_dir(dir.path()).requires_work_dir().is_ok());

        let err = GitRunner::new().requires_work_dir().unwrap_err();
        assert_eq!(err.kind(), GitErrorKind::NoWorkDir);
    }

    #[test]
    fn with_work_dir_leaves_receiver_unbound() {
        let base = GitRunner::new();
        let a = base.with_work_dir(Path::new("/tmp/a"));
        let b = base.with_work_dir(Path::new("/tmp/b"));
        assert!(base.work_dir().is_none());
        assert_eq!(a.work_dir(), Some(Path::new("/tmp/a")));
        assert_eq!(b.work_dir(), Some(Path::new("/tmp/b")));
    }

    #[test]
    fn create_temp_dir_is_empty() {
        let mut dir = GitRunner::new().create_temp_dir().unwrap();
        assert!(dir.path().is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        dir.cleanup().unwrap();
        dir.cleanup().unwrap();
    }
}
