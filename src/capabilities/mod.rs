//! The four external capabilities a workflow run depends on.
//!
//! Each capability is a single-method trait so the engine never deals with
//! endpoint names or transports. Closures implement the traits directly,
//! which keeps test doubles short.

mod context;
mod generate;
mod update;
mod validate;

pub use context::RepoContextReader;
pub use generate::{CommandGenerator, McpGenerator};
pub use update::McpUpdater;
pub use validate::CommandValidator;

use crate::domain::{
    BranchName, ChangeSet, ContextBlob, TaskContext, UpdateReceipt, ValidationOutcome,
};
use crate::error::StepResult;

/// Gathers repository and feature context (read-only).
///
/// Fails with `ContextUnavailable` when the repository root or the feature
/// description cannot be read.
pub trait ContextSource: Send + Sync {
    fn read_context(&self, task: &TaskContext) -> StepResult<ContextBlob>;
}

/// Produces a proposed change set from assembled context.
///
/// Fails with `Generation` on invocation failure or unparseable output.
pub trait Generator: Send + Sync {
    fn generate(&self, context: &ContextBlob) -> StepResult<ChangeSet>;
}

/// Checks a change set (lint, build, test).
///
/// A failing check is `Ok(ValidationOutcome::Fail)`; `Err` means the checks
/// could not run at all.
pub trait Validator: Send + Sync {
    fn validate(&self, change_set: &ChangeSet) -> StepResult<ValidationOutcome>;
}

/// Reflects a validated change set in the PR / issue / project tracker.
pub trait Updater: Send + Sync {
    fn apply_update(&self, change_set: &ChangeSet, branch: &BranchName)
        -> StepResult<UpdateReceipt>;
}

impl<F> ContextSource for F
where
    F: Fn(&TaskContext) -> StepResult<ContextBlob> + Send + Sync,
{
    fn read_context(&self, task: &TaskContext) -> StepResult<ContextBlob> {
        self(task)
    }
}

impl<F> Generator for F
where
    F: Fn(&ContextBlob) -> StepResult<ChangeSet> + Send + Sync,
{
    fn generate(&self, context: &ContextBlob) -> StepResult<ChangeSet> {
        self(context)
    }
}

impl<F> Validator for F
where
    F: Fn(&ChangeSet) -> StepResult<ValidationOutcome> + Send + Sync,
{
    fn validate(&self, change_set: &ChangeSet) -> StepResult<ValidationOutcome> {
        self(change_set)
    }
}

impl<F> Updater for F
where
    F: Fn(&ChangeSet, &BranchName) -> StepResult<UpdateReceipt> + Send + Sync,
{
    fn apply_update(
        &self,
        change_set: &ChangeSet,
        branch: &BranchName,
    ) -> StepResult<UpdateReceipt> {
        self(change_set, branch)
    }
}
