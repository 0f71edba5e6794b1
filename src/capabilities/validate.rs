//! Validation by running lint / build / test commands against the change set.

use super::Validator;
use crate::config::CommandSpec;
use crate::domain::{BranchName, ChangeSet, ValidationOutcome};
use crate::error::{StepError, StepResult};
use crate::services::{GitService, ProcessService};
use std::path::PathBuf;

/// Lines of command output quoted in a failure reason
const TAIL_LINES: usize = 20;

/// Checks a change set on its target branch without touching the user's
/// checkout.
///
/// The target branch is created from the base branch when missing and
/// checked out into a scratch worktree under `worktree_dir`. The change set
/// is written there and each configured command runs in order, stopping at
/// the first failure. A passing change set is committed to the branch; a
/// failing one leaves no trace (a branch created for the run is deleted).
#[derive(Debug, Clone)]
pub struct CommandValidator {
    commands: Vec<CommandSpec>,
    process: ProcessService,
    worktree_dir: PathBuf,
}

impl CommandValidator {
    pub fn new(
        commands: Vec<CommandSpec>,
        process: ProcessService,
        worktree_dir: PathBuf,
    ) -> Self {
        Self {
            commands,
            process,
            worktree_dir,
        }
    }

    fn check_on_branch(
        &self,
        git: &GitService,
        change_set: &ChangeSet,
        branch: &BranchName,
    ) -> StepResult<ValidationOutcome> {
        let timestamp = chrono::Local::now().format("%Y%m%dT%H%M%S%.3f");
        let path = self.worktree_dir.join(format!(
            "{}-{}",
            branch.as_str().replace('/', "-"),
            timestamp
        ));
        let worktree = git.create_worktree(branch.as_str(), &path).map_err(unavailable)?;

        change_set.apply_to(worktree.path()).map_err(|e| {
            StepError::ValidationUnavailable(format!("could not write change set: {}", e))
        })?;

        for command in &self.commands {
            let output = self
                .process
                .run("validate", command, worktree.path(), None)
                .map_err(unavailable)?;

            if !output.success() {
                tracing::info!(command = %command.display(), "Validation check failed");
                return Ok(ValidationOutcome::Fail {
                    reason: format!(
                        "`{}` exited with {:?}\n{}",
                        command.display(),
                        output.exit_code,
                        output.tail(TAIL_LINES)
                    ),
                });
            }
        }

        let message = if change_set.summary.trim().is_empty() {
            format!("Update {}", branch)
        } else {
            change_set.summary.clone()
        };
        let commit = worktree.commit_all(&message).map_err(unavailable)?;
        tracing::info!(%branch, %commit, "Validated change set committed");

        Ok(ValidationOutcome::Pass)
    }
}

impl Validator for CommandValidator {
    fn validate(&self, change_set: &ChangeSet) -> StepResult<ValidationOutcome> {
        if self.commands.is_empty() {
            return Err(StepError::ValidationUnavailable(
                "no validation commands configured".to_string(),
            ));
        }
        let branch = change_set.branch.as_ref().ok_or_else(|| {
            StepError::ValidationUnavailable("change set has no target branch".to_string())
        })?;
        let git = GitService::open(&change_set.repo_root).map_err(unavailable)?;

        let created = !git.local_branch_exists(branch.as_str()).map_err(unavailable)?;
        if created {
            let base = &change_set.base_branch;
            let start = if git.local_branch_exists(base).map_err(unavailable)? {
                base.clone()
            } else {
                format!("origin/{}", base)
            };
            git.create_branch(branch.as_str(), Some(start.as_str()))
                .map_err(unavailable)?;
            tracing::debug!(%branch, %start, "Target branch created");
        }

        let outcome = self.check_on_branch(&git, change_set, branch);

        if created && !matches!(outcome, Ok(ValidationOutcome::Pass)) {
            if let Err(e) = git.delete_branch(branch.as_str()) {
                tracing::warn!("Failed to delete branch {}: {}", branch, e);
            }
        }
        outcome
    }
}

fn unavailable(err: impl std::fmt::Display) -> StepError {
    StepError::ValidationUnavailable(err.to_string())
}
