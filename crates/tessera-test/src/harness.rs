//! Test harness helpers.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Write `content` to `name` inside `dir`, creating parent directories.
///
/// # Panics
///
/// Panics if the file cannot be created or written.
#[must_use]
pub fn test_file_in_dir(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write file");
    path
}

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging with default filter (warn level).
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}

/// Run `git` in `dir` with a fixed committer, returning whether it succeeded.
#[must_use]
pub fn run_git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(["-c", "user.name=Tessera Test", "-c", "user.email=test@tessera.invalid"])
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Turn `dir` into a git work tree with one commit holding `files`.
///
/// Returns `false` when `git` is not installed, so callers can skip.
///
/// # Panics
///
/// Panics if `git` is installed but the commit fails.
#[must_use]
pub fn init_git_repo(dir: &Path, files: &[(&str, &[u8])]) -> bool {
    if !run_git(dir, &["init", "-q"]) {
        return false;
    }
    for (name, content) in files {
        let _ = test_file_in_dir(dir, name, content);
        assert!(run_git(dir, &["add", name]), "git add {name} failed");
    }
    assert!(
        run_git(dir, &["commit", "-q", "--allow-empty", "-m", "initial"]),
        "git commit failed"
    );
    true
}

/// A temporary directory with input and output areas.
#[derive(Debug)]
pub struct TestContext {
    /// Root temporary directory.
    pub dir: TempDir,
}

impl TestContext {
    /// Create a new test context.
    #[must_use]
    pub fn new() -> Self {
        Self { dir: test_dir() }
    }

    /// Root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a file in the test directory.
    #[must_use]
    pub fn create_file(&self, name: &str, content: &[u8]) -> PathBuf {
        test_file_in_dir(self.dir.path(), name, content)
    }

    /// Where a sealed package should be written.
    #[must_use]
    pub fn package_path(&self) -> PathBuf {
        self.dir.path().join("session.tessera.zip")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
