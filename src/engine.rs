//! Workflow engine: runs assemble-context → generate → validate → update
//! against one task and reports how far it got.

use crate::capabilities::{ContextSource, Generator, Updater, Validator};
use crate::domain::{
    BranchName, ChangeSet, FeatureSlug, RunState, StepFailure, TaskContext, UpdateReceipt,
    ValidationOutcome, WorkflowResult, WorkflowStep,
};
use crate::error::{StepError, StepResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Default prefix for target branches
pub const DEFAULT_BRANCH_PREFIX: &str = "feat/";

/// Cancellation and deadline for one run, checked before every step
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Token that cancels this run when triggered
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn check(&self) -> StepResult<()> {
        if self.cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StepError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Per-run bookkeeping; never outlives `run_with`
struct Run {
    feature: FeatureSlug,
    branch: BranchName,
    state: RunState,
    steps: Vec<WorkflowStep>,
    change_set: Option<ChangeSet>,
    update: Option<UpdateReceipt>,
    failure: Option<StepFailure>,
}

impl Run {
    fn new(feature: FeatureSlug, branch: BranchName) -> Self {
        Self {
            feature,
            branch,
            state: RunState::Pending,
            steps: Vec::new(),
            change_set: None,
            update: None,
            failure: None,
        }
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "Run state transition");
        self.state = next;
    }

    /// Check the run control, then enter the step's state
    fn begin(&mut self, step: WorkflowStep, control: &RunControl) -> Result<(), StepFailure> {
        control
            .check()
            .map_err(|e| StepFailure::from_error(step, &e))?;
        self.transition(step.state());
        Ok(())
    }

    fn complete_step(&mut self, step: WorkflowStep) {
        tracing::info!(step = step.name(), "Step completed");
        self.steps.push(step);
    }

    fn finish(mut self, outcome: Result<(), StepFailure>) -> WorkflowResult {
        match outcome {
            Ok(()) => self.transition(RunState::Completed),
            Err(failure) => {
                tracing::warn!(
                    step = failure.step.name(),
                    kind = ?failure.kind,
                    "Run failed: {}",
                    failure.message
                );
                self.transition(RunState::Failed);
                self.failure = Some(failure);
            }
        }

        WorkflowResult {
            ok: self.state == RunState::Completed,
            feature: self.feature,
            branch: self.branch,
            steps: self.steps,
            state: self.state,
            failure: self.failure,
            change_set: self.change_set,
            update: self.update,
        }
    }
}

/// Executes the fixed step pipeline through four capabilities.
///
/// Holds no per-run state, so one engine can serve any number of
/// sequential or concurrent runs.
pub struct WorkflowEngine {
    context: Box<dyn ContextSource>,
    generator: Box<dyn Generator>,
    validator: Box<dyn Validator>,
    updater: Box<dyn Updater>,
    branch_prefix: String,
}

impl WorkflowEngine {
    pub fn new(
        context: impl ContextSource + 'static,
        generator: impl Generator + 'static,
        validator: impl Validator + 'static,
        updater: impl Updater + 'static,
    ) -> Self {
        Self {
            context: Box::new(context),
            generator: Box::new(generator),
            validator: Box::new(validator),
            updater: Box::new(updater),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
        }
    }

    /// Override the target branch prefix
    pub fn with_branch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.branch_prefix = prefix.into();
        self
    }

    pub fn branch_prefix(&self) -> &str {
        &self.branch_prefix
    }

    /// Target branch for a task
    pub fn branch_for(&self, task: &TaskContext) -> BranchName {
        BranchName::for_feature(&self.branch_prefix, task.feature_slug())
    }

    /// Run the pipeline with no cancellation or deadline
    pub fn run(&self, task: &TaskContext) -> WorkflowResult {
        self.run_with(task, &RunControl::default())
    }

    /// Run the pipeline. Always returns a result; failures are reported in
    /// it, never retried.
    pub fn run_with(&self, task: &TaskContext, control: &RunControl) -> WorkflowResult {
        let branch = self.branch_for(task);
        let span = tracing::info_span!(
            "workflow",
            feature = %task.feature_slug(),
            branch = %branch
        );
        let _guard = span.enter();

        let mut run = Run::new(task.feature_slug().clone(), branch);
        let outcome = self.execute(task, control, &mut run);
        run.finish(outcome)
    }

    fn execute(
        &self,
        task: &TaskContext,
        control: &RunControl,
        run: &mut Run,
    ) -> Result<(), StepFailure> {
        let step = WorkflowStep::AssembleContext;
        run.begin(step, control)?;
        let context = self
            .context
            .read_context(task)
            .map_err(|e| StepFailure::from_error(step, &e))?;
        run.complete_step(step);

        let step = WorkflowStep::Generate;
        run.begin(step, control)?;
        let change_set = self
            .generator
            .generate(&context)
            .map_err(|e| StepFailure::from_error(step, &e))?
            .on_branch(run.branch.clone());
        tracing::info!(files = change_set.files.len(), "Change set generated");
        run.change_set = Some(change_set.clone());
        run.complete_step(step);

        let step = WorkflowStep::Validate;
        run.begin(step, control)?;
        let outcome = self
            .validator
            .validate(&change_set)
            .map_err(|e| StepFailure::from_error(step, &e))?;
        if let ValidationOutcome::Fail { reason } = outcome {
            return Err(StepFailure::validation_failed(reason));
        }
        run.complete_step(step);

        let step = WorkflowStep::Update;
        run.begin(step, control)?;
        let receipt = self
            .updater
            .apply_update(&change_set, &run.branch)
            .map_err(|e| StepFailure::from_error(step, &e))?;
        run.update = Some(receipt);
        run.complete_step(step);

        Ok(())
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("branch_prefix", &self.branch_prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContextBlob, FailureKind, FileChange};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn task(slug: &str) -> TaskContext {
        TaskContext::new("/repo", format!("# {}\n", slug), slug).unwrap()
    }

    fn read_ok(task: &TaskContext) -> StepResult<ContextBlob> {
        Ok(ContextBlob {
            repo_root: task.repo_root().to_path_buf(),
            base_branch: task.base_branch().to_string(),
            current_branch: None,
            feature_md: task.feature_md().to_string(),
            feature_title: None,
            feature_sections: Vec::new(),
            hosting: None,
        })
    }

    fn generate_ok(context: &ContextBlob) -> StepResult<ChangeSet> {
        // Echo the feature into the change set so runs can be told apart
        Ok(ChangeSet::for_context(
            context,
            context.feature_md.trim().to_string(),
            vec![FileChange {
                path: PathBuf::from("FEATURE.md"),
                contents: context.feature_md.clone(),
            }],
        ))
    }

    fn validate_pass(change_set: &ChangeSet) -> StepResult<ValidationOutcome> {
        assert!(change_set.branch.is_some(), "validated without a target branch");
        Ok(ValidationOutcome::Pass)
    }

    fn validate_fail(_: &ChangeSet) -> StepResult<ValidationOutcome> {
        Ok(ValidationOutcome::Fail {
            reason: "2 tests failed".to_string(),
        })
    }

    fn update_ok(change_set: &ChangeSet, branch: &BranchName) -> StepResult<UpdateReceipt> {
        Ok(UpdateReceipt {
            message: format!("{} <- {}", branch, change_set.summary),
        })
    }

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(read_ok, generate_ok, validate_pass, update_ok)
    }

    #[test]
    fn test_all_steps_succeed() {
        let result = engine().run(&task("login"));

        assert!(result.ok);
        assert_eq!(result.state, RunState::Completed);
        assert_eq!(
            result.step_names(),
            ["assemble-context", "generate", "validate", "update"]
        );
        assert_eq!(result.feature.as_str(), "login");
        assert_eq!(result.branch.as_str(), "feat/login");
        assert_eq!(result.failure, None);
        assert_eq!(
            result.change_set.unwrap().branch.unwrap().as_str(),
            "feat/login"
        );
        assert_eq!(
            result.update.unwrap().message,
            "feat/login <- # login"
        );
    }

    #[test]
    fn test_validation_failure_stops_before_update() {
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = updates.clone();
        let engine = WorkflowEngine::new(
            read_ok,
            generate_ok,
            validate_fail,
            move |c: &ChangeSet, b: &BranchName| {
                counter.fetch_add(1, Ordering::SeqCst);
                update_ok(c, b)
            },
        );

        let result = engine.run(&task("login"));

        assert!(!result.ok);
        assert_eq!(result.state, RunState::Failed);
        assert_eq!(result.step_names(), ["assemble-context", "generate"]);
        let failure = result.failure.unwrap();
        assert_eq!(failure.step, WorkflowStep::Validate);
        assert_eq!(failure.kind, FailureKind::ValidationFailed);
        assert_eq!(failure.message, "2 tests failed");
        assert!(result.change_set.is_some());
        assert_eq!(updates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_context_failure_runs_nothing() {
        let engine = WorkflowEngine::new(
            |_: &TaskContext| -> StepResult<ContextBlob> {
                Err(StepError::ContextUnavailable("no repo".to_string()))
            },
            generate_ok,
            validate_pass,
            update_ok,
        );

        let result = engine.run(&task("login"));

        assert!(!result.ok);
        assert!(result.steps.is_empty());
        assert_eq!(result.branch.as_str(), "feat/login");
        assert_eq!(
            result.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::ContextUnavailable)
        );
        assert!(result.change_set.is_none());
    }

    #[test]
    fn test_generation_failure() {
        let engine = WorkflowEngine::new(
            read_ok,
            |_: &ContextBlob| -> StepResult<ChangeSet> {
                Err(StepError::Generation("unparseable output".to_string()))
            },
            validate_pass,
            update_ok,
        );

        let result = engine.run(&task("login"));

        assert_eq!(result.step_names(), ["assemble-context"]);
        let failure = result.failure.unwrap();
        assert_eq!(failure.step, WorkflowStep::Generate);
        assert_eq!(failure.kind, FailureKind::GenerationError);
    }

    #[test]
    fn test_validation_unavailable() {
        let engine = WorkflowEngine::new(
            read_ok,
            generate_ok,
            |_: &ChangeSet| -> StepResult<ValidationOutcome> {
                Err(StepError::ValidationUnavailable("cargo not found".to_string()))
            },
            update_ok,
        );

        let result = engine.run(&task("login"));

        assert_eq!(result.step_names(), ["assemble-context", "generate"]);
        assert_eq!(
            result.failure.map(|f| f.kind),
            Some(FailureKind::ValidationUnavailable)
        );
    }

    #[test]
    fn test_update_failure_keeps_change_set() {
        let engine = WorkflowEngine::new(
            read_ok,
            generate_ok,
            validate_pass,
            |_: &ChangeSet, _: &BranchName| -> StepResult<UpdateReceipt> {
                Err(StepError::Update("PR is locked".to_string()))
            },
        );

        let result = engine.run(&task("login"));

        assert!(!result.ok);
        assert_eq!(
            result.step_names(),
            ["assemble-context", "generate", "validate"]
        );
        assert_eq!(result.failure.unwrap().kind, FailureKind::UpdateError);
        assert_eq!(result.change_set.unwrap().summary, "# login");
        assert!(result.update.is_none());
    }

    #[test]
    fn test_cancelled_before_start() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let engine = WorkflowEngine::new(
            move |t: &TaskContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                read_ok(t)
            },
            generate_ok,
            validate_pass,
            update_ok,
        );
        let control = RunControl::new();
        control.cancellation_token().cancel();

        let result = engine.run_with(&task("login"), &control);

        assert!(!result.ok);
        assert!(result.steps.is_empty());
        let failure = result.failure.unwrap();
        assert_eq!(failure.step, WorkflowStep::AssembleContext);
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_between_steps() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let engine = WorkflowEngine::new(
            move |t: &TaskContext| {
                trigger.cancel();
                read_ok(t)
            },
            generate_ok,
            validate_pass,
            update_ok,
        );
        let control = RunControl::new().with_cancellation(token);

        let result = engine.run_with(&task("login"), &control);

        assert_eq!(result.step_names(), ["assemble-context"]);
        let failure = result.failure.unwrap();
        assert_eq!(failure.step, WorkflowStep::Generate);
        assert_eq!(failure.kind, FailureKind::Cancelled);
    }

    #[test]
    fn test_deadline_exceeded() {
        let control = RunControl::new().with_deadline(Instant::now());

        let result = engine().run_with(&task("login"), &control);

        assert!(result.steps.is_empty());
        assert_eq!(
            result.failure.map(|f| f.kind),
            Some(FailureKind::DeadlineExceeded)
        );
    }

    #[test]
    fn test_generous_timeout_completes() {
        let control = RunControl::new().with_timeout(Duration::from_secs(3600));
        assert!(engine().run_with(&task("login"), &control).ok);
    }

    #[test]
    fn test_branch_prefix_override() {
        let engine = engine().with_branch_prefix("feature/");
        let result = engine.run(&task("search"));
        assert_eq!(result.branch.as_str(), "feature/search");
        assert_eq!(engine.branch_prefix(), "feature/");
    }

    #[test]
    fn test_sequential_runs_are_independent() {
        let engine = WorkflowEngine::new(
            read_ok,
            generate_ok,
            |c: &ChangeSet| {
                if c.summary.contains("broken") {
                    validate_fail(c)
                } else {
                    validate_pass(c)
                }
            },
            update_ok,
        );

        let first = engine.run(&task("broken-build"));
        let second = engine.run(&task("search"));

        assert!(!first.ok);
        assert_eq!(first.branch.as_str(), "feat/broken-build");
        assert!(second.ok);
        assert_eq!(second.branch.as_str(), "feat/search");
        assert_eq!(second.steps.len(), 4);
        assert_eq!(second.change_set.unwrap().summary, "# search");
    }

    #[test]
    fn test_concurrent_runs_share_engine() {
        let engine = engine();
        let slugs = ["alpha", "beta", "gamma", "delta"];

        let results: Vec<WorkflowResult> = std::thread::scope(|scope| {
            let handles: Vec<_> = slugs
                .iter()
                .map(|slug| {
                    let engine = &engine;
                    scope.spawn(move || engine.run(&task(slug)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (slug, result) in slugs.iter().zip(results) {
            assert!(result.ok);
            assert_eq!(result.feature.as_str(), *slug);
            assert_eq!(result.branch.as_str(), format!("feat/{}", slug));
            assert_eq!(result.update.unwrap().message, format!("feat/{} <- # {}", slug, slug));
        }
    }

    #[test]
    fn test_failed_result_json_shape() {
        let engine = WorkflowEngine::new(
            |_: &TaskContext| -> StepResult<ContextBlob> {
                Err(StepError::ContextUnavailable("no repo".to_string()))
            },
            generate_ok,
            validate_pass,
            update_ok,
        );

        let json = serde_json::to_string(&engine.run(&task("login"))).unwrap();
        insta::assert_snapshot!(json, @r###"{"ok":false,"feature":"login","branch":"feat/login","steps":[],"state":"failed","failure":{"step":"assemble-context","kind":"context-unavailable","message":"context unavailable: no repo"}}"###);
    }

    #[test]
    fn test_completed_steps_json() {
        let result = engine().run(&task("login"));
        let json = serde_json::to_string(&result.steps).unwrap();
        insta::assert_snapshot!(json, @r###"["assemble-context","generate","validate","update"]"###);
    }
}
