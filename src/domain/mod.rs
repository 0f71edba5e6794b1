//! Domain entities for the orchestrator.
//!
//! This module contains the core business entities:
//! - Task: The feature a run works on
//! - ChangeSet: Data flowing between workflow steps
//! - Workflow: Run state machine and result

mod change_set;
mod task;
mod workflow;

pub use change_set::{ChangeSet, ContextBlob, FileChange, UpdateReceipt, ValidationOutcome};
pub use task::{BranchName, FeatureSlug, TaskContext, DEFAULT_BASE_BRANCH};
pub use workflow::{FailureKind, RunState, StepFailure, WorkflowResult, WorkflowStep};
