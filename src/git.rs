//! Version-control adapter: branch and merge primitives over the git
//! subprocess.
//!
//! Every call captures exit code, stdout, and stderr. Non-zero exits
//! are logged as warnings by default; only the inability to determine
//! the current branch at startup is fatal. Everything else proceeds on
//! a best-effort basis, preserving work for human inspection rather
//! than aborting.

use std::path::PathBuf;
use std::process::Command;

use tracing::warn;

use crate::error::{ForemanError, Result};

/// Maximum characters in a branch slug.
const SLUG_MAX_CHARS: usize = 30;

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Git operations scoped to one project.
#[derive(Debug, Clone)]
pub struct Git {
    project_root: PathBuf,
}

impl Git {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Run git, warning on non-zero exit.
    fn run(&self, args: &[&str]) -> Result<GitOutput> {
        let output = self.run_quiet(args)?;
        if !output.success() && !output.stderr.is_empty() {
            warn!("Git warning: {}", output.stderr.trim());
        }
        Ok(output)
    }

    /// Run git without logging failures; callers handle the result.
    fn run_quiet(&self, args: &[&str]) -> Result<GitOutput> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.project_root)
            .output()
            .map_err(|e| ForemanError::git(args.join(" "), e.to_string()))?;
        Ok(GitOutput {
            code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Check if the project root is inside a git repository.
    pub fn is_repo(&self) -> bool {
        self.run_quiet(&["rev-parse", "--git-dir"])
            .map(|o| o.success())
            .unwrap_or(false)
    }

    /// Current branch name. Fatal when it cannot be determined: the
    /// loop cannot pick a base branch to merge into.
    pub fn current_branch(&self) -> Result<String> {
        let output = self.run_quiet(&["branch", "--show-current"])?;
        if !output.success() || output.stdout.is_empty() {
            return Err(ForemanError::NoBranch {
                message: if output.stderr.is_empty() {
                    "no branch checked out".to_string()
                } else {
                    output.stderr
                },
            });
        }
        Ok(output.stdout)
    }

    /// Check if an `origin` remote exists.
    pub fn has_remote(&self) -> bool {
        self.run_quiet(&["remote", "get-url", "origin"])
            .map(|o| o.success())
            .unwrap_or(false)
    }

    pub fn checkout(&self, branch: &str) -> Result<GitOutput> {
        self.run(&["checkout", branch])
    }

    /// Create and check out the task branch; if it already exists,
    /// just check it out. Idempotent across crash-restarts.
    pub fn create_or_resume_branch(&self, task_id: &str, title: &str) -> Result<String> {
        let branch = branch_name(task_id, title);
        let created = self.run_quiet(&["checkout", "-b", &branch])?;
        if !created.success() {
            self.checkout(&branch)?;
        }
        Ok(branch)
    }

    /// Whether the index holds staged changes.
    pub fn staged_changes(&self) -> Result<bool> {
        Ok(!self.run_quiet(&["diff", "--cached", "--quiet"])?.success())
    }

    /// Squash-merge a completed task branch into the base branch and
    /// return the short commit hash. The task branch is deleted locally
    /// and, when a remote exists, remotely; deletion failures are
    /// logged, not fatal.
    pub fn squash_merge(
        &self,
        branch: &str,
        task_id: &str,
        title: &str,
        base_branch: &str,
    ) -> Result<String> {
        self.checkout(base_branch)?;
        self.run(&["merge", "--squash", branch])?;

        let message = format!("[{task_id}] {title}\n\nCompletes: {task_id}");
        self.run(&["commit", "-m", &message])?;

        let hash = self.run(&["rev-parse", "--short", "HEAD"])?.stdout;
        self.delete_branch(branch);
        Ok(hash)
    }

    /// Merge whatever a split task staged before decomposing, with a
    /// synthetic message, then drop the branch; the children are worked
    /// independently on their own branches.
    pub fn merge_split_branch(&self, branch: &str, task_id: &str, base_branch: &str) -> Result<()> {
        self.checkout(base_branch)?;
        self.run(&["merge", "--squash", branch])?;
        if self.staged_changes()? {
            let message = format!("[{task_id}] Split into subtasks");
            self.run(&["commit", "-m", &message])?;
        }
        self.delete_branch(branch);
        Ok(())
    }

    /// Leave an incomplete task branch intact for human inspection and
    /// return to the base branch.
    pub fn preserve_branch(&self, base_branch: &str) -> Result<()> {
        self.checkout(base_branch)?;
        Ok(())
    }

    /// Delete a task branch locally and remotely, best-effort.
    pub fn delete_branch(&self, branch: &str) {
        match self.run_quiet(&["branch", "-D", branch]) {
            Ok(out) if !out.success() && !out.stderr.contains("cannot delete branch") => {
                warn!("Failed to delete local branch {branch}: {}", out.stderr);
            }
            Err(e) => warn!("Failed to delete local branch {branch}: {e}"),
            _ => {}
        }

        if self.has_remote() {
            match self.run_quiet(&["push", "origin", "--delete", branch]) {
                Ok(out) if !out.success() && !out.stderr.contains("remote ref does not exist") => {
                    warn!("Failed to delete remote branch {branch}: {}", out.stderr);
                }
                Err(e) => warn!("Failed to delete remote branch {branch}: {e}"),
                _ => {}
            }
        }
    }
}

/// Deterministic branch name from the task id and title.
pub fn branch_name(task_id: &str, title: &str) -> String {
    format!("task/{task_id}-{}", slugify(title))
}

/// Branch-safe slug: lowercased, spaces to hyphens, everything but
/// alphanumerics and hyphens stripped, truncated.
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .take(SLUG_MAX_CHARS)
        .collect()
}
