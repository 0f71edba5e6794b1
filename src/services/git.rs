//! Git service for repository, branch and worktree operations.
//!
//! Shells out to the `git` CLI. All operations are blocking.

use crate::error::{GitError, GitResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Git operations against one repository
pub struct GitService {
    repo_path: PathBuf,
}

impl GitService {
    /// Open a repository; fails when `repo_path` has no `.git` entry
    pub fn open(repo_path: &Path) -> GitResult<Self> {
        // `.git` is a directory in a clone and a file in a worktree
        if !Self::is_repository(repo_path) {
            return Err(GitError::NotARepository(repo_path.to_path_buf()));
        }

        Ok(Self {
            repo_path: repo_path.to_path_buf(),
        })
    }

    /// Check whether a directory is the root of a git checkout
    pub fn is_repository(path: &Path) -> bool {
        path.join(".git").exists()
    }

    /// Get the repository path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn git(&self, args: &[&str]) -> GitResult<Output> {
        run_git(&self.repo_path, args)
    }

    /// Get the checked-out branch
    pub fn current_branch(&self) -> GitResult<String> {
        let output = checked(self.git(&["rev-parse", "--abbrev-ref", "HEAD"])?)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Check if a branch exists (local or remote)
    pub fn branch_exists(&self, branch: &str) -> GitResult<bool> {
        if self.local_branch_exists(branch)? {
            return Ok(true);
        }

        // Check remote branch
        let output = self.git(&[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/remotes/origin/{}", branch),
        ])?;

        Ok(output.status.success())
    }

    /// Check if a local branch exists
    pub fn local_branch_exists(&self, branch: &str) -> GitResult<bool> {
        let output = self.git(&[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/heads/{}", branch),
        ])?;
        Ok(output.status.success())
    }

    /// Commit a local branch points at
    pub fn branch_head(&self, branch: &str) -> GitResult<String> {
        let output = self.git(&[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/heads/{}", branch),
        ])?;
        if !output.status.success() {
            return Err(GitError::BranchNotFound(branch.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Create a new branch
    pub fn create_branch(&self, branch: &str, start_point: Option<&str>) -> GitResult<()> {
        let mut args = vec!["branch", branch];
        if let Some(start) = start_point {
            args.push(start);
        }

        checked(self.git(&args)?)?;
        Ok(())
    }

    /// Delete a local branch, merged or not
    pub fn delete_branch(&self, branch: &str) -> GitResult<()> {
        checked(self.git(&["branch", "-D", branch])?)?;
        Ok(())
    }

    /// Check out an existing local branch into a new worktree at `path`.
    ///
    /// The worktree is removed again when the returned guard is dropped;
    /// commits made in it stay on the branch.
    pub fn create_worktree(&self, branch: &str, path: &Path) -> GitResult<Worktree<'_>> {
        if !self.local_branch_exists(branch)? {
            return Err(GitError::BranchNotFound(branch.to_string()));
        }
        if path.exists() {
            return Err(GitError::PathExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GitError::Operation(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        checked(self.git(&["worktree", "add", path_str(path)?, branch])?)?;
        tracing::debug!(branch, path = %path.display(), "Worktree created");

        Ok(Worktree {
            git: self,
            path: path.to_path_buf(),
        })
    }

    /// Delete a worktree, discarding uncommitted changes in it
    pub fn delete_worktree(&self, path: &Path) -> GitResult<()> {
        checked(self.git(&["worktree", "remove", "--force", path_str(path)?])?)?;
        Ok(())
    }
}

/// A linked worktree that lives as long as this guard
pub struct Worktree<'a> {
    git: &'a GitService,
    path: PathBuf,
}

impl Worktree<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage everything in the worktree and commit it; returns the new
    /// commit id
    pub fn commit_all(&self, message: &str) -> GitResult<String> {
        checked(run_git(&self.path, &["add", "--all"])?)?;
        checked(run_git(
            &self.path,
            &["commit", "--quiet", "--allow-empty", "-m", message],
        )?)?;
        let output = checked(run_git(&self.path, &["rev-parse", "HEAD"])?)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Drop for Worktree<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.git.delete_worktree(&self.path) {
            tracing::warn!("Failed to remove worktree {}: {}", self.path.display(), e);
        }
    }
}

fn run_git(dir: &Path, args: &[&str]) -> GitResult<Output> {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| {
            GitError::Operation(format!("Failed to run git {}: {}", args.join(" "), e))
        })
}

/// Turn a non-zero exit into `GitError::Operation` carrying stderr
fn checked(output: Output) -> GitResult<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(GitError::Operation(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

fn path_str(path: &Path) -> GitResult<&str> {
    path.to_str()
        .ok_or_else(|| GitError::Operation(format!("Non UTF-8 path: {}", path.display())))
}
