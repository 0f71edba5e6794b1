//! Orchestrator: wires configuration, endpoints and capabilities into an
//! engine.

use crate::capabilities::{
    CommandGenerator, CommandValidator, McpGenerator, McpUpdater, RepoContextReader,
};
use crate::config::{CommandSpec, GeneratorBackend, OrchestratorConfig};
use crate::domain::{TaskContext, WorkflowResult};
use crate::engine::{RunControl, WorkflowEngine};
use crate::error::{ConfigError, Result};
use crate::services::{EndpointHandle, EndpointRegistry, ProcessService};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Fully wired orchestrator for one project
#[derive(Debug)]
pub struct Orchestrator {
    /// Project root the configuration was loaded for
    pub project_root: PathBuf,
    /// Loaded configuration
    pub config: OrchestratorConfig,
    registry: Arc<EndpointRegistry>,
    engine: WorkflowEngine,
}

impl Orchestrator {
    /// Load layered configuration for `project_root` and build
    pub fn load(project_root: &Path) -> Result<Self> {
        let config = OrchestratorConfig::load(Some(project_root))?;
        Self::new(project_root.to_path_buf(), config)
    }

    /// Build from an already loaded configuration.
    ///
    /// Every capability binding is resolved here, so a binding to an
    /// unconfigured endpoint fails now rather than mid-run.
    pub fn new(project_root: PathBuf, config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(EndpointRegistry::from_config(&config.endpoints));
        let process = ProcessService::new(config.log_directory(&project_root));
        let capabilities = &config.capabilities;

        let mut context = RepoContextReader::new();
        if let Some(hosting) = &capabilities.context.hosting {
            let endpoint = resolve(&registry, "context", &hosting.endpoint)?;
            context = context.with_hosting(endpoint, hosting.tool.clone());
        }

        let validator = CommandValidator::new(
            capabilities.validate.commands.clone(),
            process.clone(),
            config.worktree_directory(&project_root),
        );

        let update_endpoint = resolve(&registry, "update", &capabilities.update.endpoint)?;
        let updater = McpUpdater::new(update_endpoint, capabilities.update.tool.clone());

        let engine = match &capabilities.generate {
            GeneratorBackend::Command { program, args } => {
                let command = CommandSpec {
                    program: program.clone(),
                    args: args.clone(),
                };
                WorkflowEngine::new(
                    context,
                    CommandGenerator::new(command, process),
                    validator,
                    updater,
                )
            }
            GeneratorBackend::Mcp { endpoint, tool } => {
                let endpoint = resolve(&registry, "generate", endpoint)?;
                WorkflowEngine::new(
                    context,
                    McpGenerator::new(endpoint, tool.clone()),
                    validator,
                    updater,
                )
            }
        }
        .with_branch_prefix(config.workflow.branch_prefix.clone());

        tracing::info!(
            endpoints = ?registry.names(),
            branch_prefix = %config.workflow.branch_prefix,
            "Orchestrator ready"
        );

        Ok(Self {
            project_root,
            config,
            registry,
            engine,
        })
    }

    /// Shared endpoint registry
    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Build a task, defaulting the base branch from configuration
    pub fn task(
        &self,
        repo_root: impl Into<PathBuf>,
        feature_md: impl Into<String>,
        feature_slug: &str,
        base_branch: Option<&str>,
    ) -> Result<TaskContext> {
        let base = base_branch.unwrap_or(&self.config.workflow.base_branch);
        Ok(TaskContext::new(repo_root, feature_md, feature_slug)?.with_base_branch(base)?)
    }

    pub fn run(&self, task: &TaskContext, control: &RunControl) -> WorkflowResult {
        self.engine.run_with(task, control)
    }
}

fn resolve(
    registry: &EndpointRegistry,
    capability: &'static str,
    endpoint: &str,
) -> std::result::Result<Arc<EndpointHandle>, ConfigError> {
    registry
        .lookup(endpoint)
        .ok_or_else(|| ConfigError::UnknownEndpoint {
            capability,
            endpoint: endpoint.to_string(),
        })
}
