//! Workflow run state machine and result types.

use super::{BranchName, ChangeSet, FeatureSlug, UpdateReceipt};
use crate::error::StepError;
use serde::{Deserialize, Serialize};

/// A step of the generate → validate → update pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStep {
    AssembleContext,
    Generate,
    Validate,
    Update,
}

impl WorkflowStep {
    /// Steps in execution order
    pub const ALL: [WorkflowStep; 4] = [
        Self::AssembleContext,
        Self::Generate,
        Self::Validate,
        Self::Update,
    ];

    /// Name reported in results
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssembleContext => "assemble-context",
            Self::Generate => "generate",
            Self::Validate => "validate",
            Self::Update => "update",
        }
    }

    /// State the run is in while this step executes
    pub fn state(&self) -> RunState {
        match self {
            Self::AssembleContext => RunState::AssemblingContext,
            Self::Generate => RunState::Generating,
            Self::Validate => RunState::Validating,
            Self::Update => RunState::Updating,
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Pending,
    AssemblingContext,
    Generating,
    Validating,
    Updating,
    Completed,
    Failed,
}

impl RunState {
    /// Check if the run has finished (completed or failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal transitions: forward one step, or to `Failed` from any
    /// non-terminal state
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, AssemblingContext)
            | (AssemblingContext, Generating)
            | (Generating, Validating)
            | (Validating, Updating)
            | (Updating, Completed) => true,
            _ => false,
        }
    }
}

/// Category of a run failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ContextUnavailable,
    GenerationError,
    ValidationFailed,
    ValidationUnavailable,
    UpdateError,
    Cancelled,
    DeadlineExceeded,
}

impl From<&StepError> for FailureKind {
    fn from(error: &StepError) -> Self {
        match error {
            StepError::ContextUnavailable(_) => Self::ContextUnavailable,
            StepError::Generation(_) => Self::GenerationError,
            StepError::ValidationUnavailable(_) => Self::ValidationUnavailable,
            StepError::Update(_) => Self::UpdateError,
            StepError::Cancelled => Self::Cancelled,
            StepError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Why and where a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Step that failed, or that would have run next when the run was stopped
    pub step: WorkflowStep,
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn from_error(step: WorkflowStep, error: &StepError) -> Self {
        Self {
            step,
            kind: error.into(),
            message: error.to_string(),
        }
    }

    pub fn validation_failed(reason: String) -> Self {
        Self {
            step: WorkflowStep::Validate,
            kind: FailureKind::ValidationFailed,
            message: reason,
        }
    }
}

/// Structured summary of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub ok: bool,
    pub feature: FeatureSlug,
    pub branch: BranchName,
    /// Steps that completed, in execution order
    pub steps: Vec<WorkflowStep>,
    /// Terminal state of the run
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    /// Generated change set, kept even when a later step fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_set: Option<ChangeSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateReceipt>,
}

impl WorkflowResult {
    /// Names of the completed steps
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(WorkflowStep::name).collect()
    }
}
